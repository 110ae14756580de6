//! The steady-state control loop.
//!
//! ```text
//! setup:  layout ─▶ backlight ─▶ server ─▶ link ─▶ camera ─▶ "Waiting for data..."
//! loop:   feed watchdog ─▶ ping deadline ─▶ link up? ─▶ connected? ─▶ read line
//!           ─▶ interpret ─▶ redraw / re-arm ping / backlight / identify
//! ```
//!
//! Every failure inside an iteration becomes a [`Fault`] and is handled by
//! [`Fault::recovery`]; only a [`Recovery::Reset`] leaves the loop. The first
//! iteration that does not end the loop marks the boot as successful.

use alloc::format;
use alloc::string::String;
use core::convert::Infallible;
use core::fmt::Debug;
use core::net::Ipv4Addr;

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use log::{debug, error, info, trace, warn};

use crate::boot::BootSuccess;
use crate::config::{
    BoardModel, ConfigStore, KeyValueStorage, ServerAddress, StorageError, WifiCredentials, keys,
};
use crate::constants::{
    DEFAULT_BACKLIGHT_PCT, DEFAULT_CAMERA, IDENTIFY_DURATION, INFO_NOTICE_DURATION,
    LINK_FAILURE_HOLDOFF, LINK_JOIN_TIMEOUT, LINK_POLL_INTERVAL, PING_BACKOFF,
    RECONNECT_BACKOFF, WATCHDOG_FEED_SLICE,
};
use crate::error::{FatalError, Fault, Recovery};
use crate::identity::DeviceIdentity;
use crate::net::{LinkError, NetworkLink, NetworkSession, TransportError};
use crate::platform::{
    Clock, Peripherals, Platform, Severity, StatusLed, TallyDisplay, Watchdog, led_color,
};
use crate::protocol::{Dispatch, ProtocolInterpreter};
use crate::tally::TallyState;

/// State owned by the loop. Each field has a single writer.
pub struct RuntimeContext<S: KeyValueStorage> {
    pub config: ConfigStore<S>,
    pub tally: TallyState,
    pub identity: DeviceIdentity,
    pub boot_success: BootSuccess,
}

fn log_display_error<E: Debug>(result: Result<(), E>) {
    if let Err(e) = result {
        warn!("Display update failed: {:?}", e);
    }
}

impl<P: Platform> Peripherals<P> {
    /// Sleep for `duration`, feeding the watchdog at least once a second.
    pub fn pause(&mut self, duration: Duration) {
        let mut remaining = duration;
        while remaining.as_ticks() > 0 {
            let slice = remaining.min(WATCHDOG_FEED_SLICE);
            self.watchdog.feed();
            self.delay.delay_ms(slice.as_millis() as u32);
            remaining = remaining - slice;
        }
        self.watchdog.feed();
    }

    pub fn notice(&mut self, message: &str, severity: Severity) {
        match severity {
            Severity::Error => error!("{}", message),
            Severity::Warning => warn!("{}", message),
            Severity::Info | Severity::Ok => info!("{}", message),
        }
        log_display_error(self.display.show_notice(message, severity));
    }

    /// Join the network and wait for the link to come up.
    fn bring_up_link(&mut self, credentials: &WifiCredentials) -> Result<Option<Ipv4Addr>, LinkError> {
        self.notice(
            &format!("WIFI Connecting...\nSSID:{}", credentials.ssid),
            Severity::Info,
        );
        self.link.join(credentials)?;

        let started = self.clock.now();
        while !self.link.is_up() {
            if self.clock.now() - started >= LINK_JOIN_TIMEOUT {
                return Err(LinkError::Timeout);
            }
            self.watchdog.feed();
            self.delay.delay_ms(LINK_POLL_INTERVAL.as_millis() as u32);
        }
        Ok(self.link.ip_address())
    }
}

/// Read the stored Wi-Fi credentials, telling missing from unusable.
fn load_credentials<S: KeyValueStorage>(
    config: &mut ConfigStore<S>,
) -> Result<WifiCredentials, LinkError> {
    match config.load::<WifiCredentials>(keys::WIFI) {
        Ok(credentials) => Ok(credentials),
        Err(StorageError::NotFound) => Err(LinkError::NoCredentials),
        Err(e) => {
            warn!("Stored Wi-Fi credentials unusable: {}", e);
            Err(LinkError::InvalidCredentials)
        }
    }
}

/// The tally client: setup once, then [`TallyRuntime::run`] forever.
pub struct TallyRuntime<P: Platform> {
    context: RuntimeContext<P::Storage>,
    session: NetworkSession<P::Connector>,
    interpreter: ProtocolInterpreter,
    io: Peripherals<P>,
    credentials: WifiCredentials,
}

impl<P: Platform> TallyRuntime<P> {
    /// Bring the device from power-on to the point where the loop can run.
    ///
    /// Fails only when the network link cannot be brought up; the failure
    /// has already been shown on screen.
    pub fn setup(
        mut config: ConfigStore<P::Storage>,
        connector: P::Connector,
        mut io: Peripherals<P>,
    ) -> Result<Self, FatalError> {
        io.watchdog.feed();

        let model = config.get(keys::MODEL, BoardModel::default());
        info!("Board model: {}", model.label());
        log_display_error(io.display.set_layout(model.layout()));

        let backlight = config
            .get(keys::BACKLIGHT, i64::from(DEFAULT_BACKLIGHT_PCT))
            .clamp(0, 100) as u8;
        info!("Backlight: {}%", backlight);
        log_display_error(io.display.set_backlight(backlight));

        let server = config.get(keys::SERVER, ServerAddress::default());
        info!("Server: {}", server);

        let credentials = match load_credentials(&mut config) {
            Ok(credentials) => credentials,
            Err(e) => {
                io.notice(&format!("{}", e), Severity::Error);
                io.pause(LINK_FAILURE_HOLDOFF);
                return Err(FatalError::Link(e));
            }
        };

        match io.bring_up_link(&credentials) {
            Ok(ip) => {
                let ip = match ip {
                    Some(ip) => format!("{}", ip),
                    None => String::from("no address"),
                };
                io.notice(&format!("WIFI Connected!\n{}", ip), Severity::Ok);
                io.pause(INFO_NOTICE_DURATION);
            }
            Err(e) => {
                io.notice(&format!("{}", e), Severity::Error);
                io.pause(LINK_FAILURE_HOLDOFF);
                return Err(FatalError::Link(e));
            }
        }

        let identity = DeviceIdentity::new(io.link.mac_address());
        info!("Device MAC: {}", identity.mac);

        let tally = TallyState::load(&mut config);

        let mut runtime = Self {
            context: RuntimeContext {
                config,
                tally,
                identity,
                boot_success: BootSuccess::new(),
            },
            session: NetworkSession::new(connector, server),
            interpreter: ProtocolInterpreter::new(identity),
            io,
            credentials,
        };

        if runtime.context.tally.assignment().is_none() {
            runtime.assign_default_camera();
        }
        runtime.render();
        runtime.io.notice("Waiting for data...", Severity::Info);

        Ok(runtime)
    }

    pub fn context(&self) -> &RuntimeContext<P::Storage> {
        &self.context
    }

    pub fn session(&self) -> &NetworkSession<P::Connector> {
        &self.session
    }

    pub fn peripherals(&self) -> &Peripherals<P> {
        &self.io
    }

    /// Run the loop until an unrecoverable error.
    pub fn run(&mut self) -> Result<Infallible, FatalError> {
        loop {
            self.iterate()?;
        }
    }

    /// One loop iteration, faults included.
    pub fn iterate(&mut self) -> Result<(), FatalError> {
        if let Err(fault) = self.step() {
            self.handle_fault(fault)?;
        }

        if !self.context.boot_success.is_recorded() {
            if let Err(e) = self.context.boot_success.record(&mut self.context.config) {
                error!("Could not record boot success: {}", e);
            }
        }
        Ok(())
    }

    /// Render a fatal error before the process ends.
    pub fn show_fatal(&mut self, fatal: &FatalError) {
        self.io.notice(&format!("{}", fatal), Severity::Error);
    }

    fn step(&mut self) -> Result<(), Fault> {
        self.io.watchdog.feed();
        trace!("Watchdog fed");

        self.session.check_ping(self.io.clock.now())?;
        self.ensure_link()?;

        if self.session.ensure_connected(&self.io.clock)? {
            log_display_error(self.io.display.clear_notice());
        }

        let line = self.session.poll_line()?;
        let dispatch = self.interpreter.interpret(
            &line,
            &mut self.context.tally,
            &mut self.context.config,
        )?;
        self.apply(dispatch);
        Ok(())
    }

    /// Rejoin the network if the link dropped.
    fn ensure_link(&mut self) -> Result<(), LinkError> {
        if self.io.link.is_up() {
            return Ok(());
        }
        warn!("Network link down, rejoining");
        self.session.disconnect();
        let ip = self.io.bring_up_link(&self.credentials)?;
        info!("Network link back up ({:?})", ip);
        Ok(())
    }

    fn apply(&mut self, dispatch: Dispatch) {
        for fault in &dispatch.faults {
            warn!("Message partially applied: {}", fault);
        }

        if dispatch.ping {
            debug!("Ping");
            self.session.arm_ping(self.io.clock.now());
        }

        if dispatch.needs_assignment {
            self.assign_default_camera();
        }

        if dispatch.tally_changed {
            self.render();
        }

        if let Some(pct) = dispatch.backlight {
            info!("Backlight: {}%", pct);
            log_display_error(self.io.display.set_backlight(pct));
        }

        if dispatch.identify {
            self.identify();
        }
    }

    fn handle_fault(&mut self, fault: Fault) -> Result<(), FatalError> {
        match fault.recovery() {
            Recovery::Continue => Ok(()),
            Recovery::Reconnect => {
                self.session.disconnect();
                self.io.notice(&format!("{}", fault), Severity::Error);
                let backoff = match fault {
                    Fault::Transport(TransportError::PingExceeded) => PING_BACKOFF,
                    _ => RECONNECT_BACKOFF,
                };
                self.io.pause(backoff);
                Ok(())
            }
            Recovery::Drop => {
                warn!("Dropped line: {}", fault);
                Ok(())
            }
            Recovery::UseDefault => {
                warn!("{}, keeping current value", fault);
                Ok(())
            }
            Recovery::Reset => {
                error!("Unrecoverable: {}", fault);
                Err(FatalError::from(fault))
            }
        }
    }

    /// Push the current indication to the display and LED.
    fn render(&mut self) {
        let tally = &self.context.tally;
        let indication = tally.indication();
        debug!("Indication: {}", indication.label());
        log_display_error(self.io.display.set_state(indication, tally.assignment()));
        self.io.led.set_color(led_color(indication));
    }

    /// First-run policy: tell the user, then take the default camera.
    fn assign_default_camera(&mut self) {
        self.io.notice(
            &format!("No camera assigned\nUsing camera {}", DEFAULT_CAMERA),
            Severity::Warning,
        );
        self.io.pause(INFO_NOTICE_DURATION);

        if let Err(e) = self
            .context
            .tally
            .set_assignment(i64::from(DEFAULT_CAMERA), &mut self.context.config)
        {
            warn!("{}", Fault::from(e));
        }
        log_display_error(self.io.display.clear_notice());
        self.render();
    }

    /// Show MAC and IP for a while, then return to the indication.
    fn identify(&mut self) {
        info!("Identify requested");
        let mac = self.context.identity.mac;
        let ip = self.io.link.ip_address();
        log_display_error(self.io.display.show_identity(mac, ip));
        self.io.pause(IDENTIFY_DURATION);
        self.render();
    }
}

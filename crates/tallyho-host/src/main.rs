//! TallyHo tally client for desktops and single-board computers.
//!
//! Runs the device runtime against the host TCP stack. Device settings live
//! in one file per key under `TALLYHO_CONFIG_DIR`; see [`settings`] for the
//! process environment.
//!
//! # Exit status
//!
//! | Code | Meaning                                         |
//! |------|-------------------------------------------------|
//! | 1    | Fatal error (no network details, link failure)  |
//! | 2    | Recovery mode after repeated failed starts      |
//!
//! [`settings`]: tallyho_host::settings

use std::process::ExitCode;

use embassy_time::Instant;
use log::{error, info, warn};

use tallyho_core::boot::{BootDecision, check_boot};
use tallyho_core::config::{ConfigStore, keys};
use tallyho_core::display::GraphicsDisplay;
use tallyho_core::platform::{Clock, Peripherals};
use tallyho_core::runtime::TallyRuntime;
use tallyho_host::panel::SnapshotPanel;
use tallyho_host::platform::{
    HostClock, HostDelay, HostLink, HostPlatform, HostWatchdog, LogBacklight, LogLed,
};
use tallyho_host::settings::Settings;
use tallyho_host::storage::FileStorage;
use tallyho_host::transport::TcpConnector;

/// Exit status for recovery mode.
const RECOVERY_EXIT: u8 = 2;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    std::panic::set_hook(Box::new(|panic| error!("{}", panic)));

    // -----------------------------------------------------------------------
    // Process settings
    // -----------------------------------------------------------------------

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Config directory: {}", settings.config_dir.display());

    let mut config = ConfigStore::new(FileStorage::new(&settings.config_dir));

    // -----------------------------------------------------------------------
    // Boot check
    // -----------------------------------------------------------------------

    if check_boot(&mut config) == BootDecision::Recovery {
        error!("Failure to start several times, entering recovery mode");
        error!(
            "Fix the settings in {} and start again",
            config.storage().dir().display()
        );
        return ExitCode::from(RECOVERY_EXIT);
    }

    if let Some(server) = &settings.server {
        info!("Server override: {}", server);
        if let Err(e) = config.set(keys::SERVER, server) {
            warn!("Could not persist server override: {}", e);
        }
    }

    // -----------------------------------------------------------------------
    // Peripherals
    // -----------------------------------------------------------------------

    let clock = HostClock::new();
    let started: Instant = clock.now();
    let io = Peripherals::<HostPlatform> {
        link: HostLink::new(settings.mac),
        display: GraphicsDisplay::new(SnapshotPanel::new(settings.snapshot.clone()), LogBacklight),
        led: LogLed::default(),
        watchdog: HostWatchdog::new(),
        clock,
        delay: HostDelay,
    };

    // -----------------------------------------------------------------------
    // Run
    // -----------------------------------------------------------------------

    let mut runtime = match TallyRuntime::setup(config, TcpConnector::default(), io) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Setup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Tally running after {} ms",
        runtime.peripherals().clock.now().duration_since(started).as_millis()
    );

    let Err(fatal) = runtime.run();
    runtime.show_fatal(&fatal);
    ExitCode::FAILURE
}

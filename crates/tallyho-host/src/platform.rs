//! Desktop implementations of the runtime collaborators.

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::thread;
use std::time::{Duration as StdDuration, Instant as StdInstant};

use embassy_time::Instant;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::RgbColor;
use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};
use tallyho_core::config::WifiCredentials;
use tallyho_core::constants::WATCHDOG_TIMEOUT;
use tallyho_core::display::{Backlight, GraphicsDisplay};
use tallyho_core::identity::MacAddress;
use tallyho_core::net::{LinkError, NetworkLink};
use tallyho_core::platform::{Clock, Platform, StatusLed, Watchdog};

use crate::panel::SnapshotPanel;
use crate::storage::FileStorage;
use crate::transport::TcpConnector;

/// Monotonic clock counted from process start.
pub struct HostClock {
    origin: StdInstant,
}

impl HostClock {
    pub fn new() -> Self {
        Self {
            origin: StdInstant::now(),
        }
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for HostClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.origin.elapsed().as_micros() as u64)
    }
}

pub struct HostDelay;

impl DelayNs for HostDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(StdDuration::from_nanos(u64::from(ns)));
    }
}

/// Stands in for the hardware watchdog: reports feeds that came too late.
pub struct HostWatchdog {
    last_feed: StdInstant,
}

impl HostWatchdog {
    pub fn new() -> Self {
        Self {
            last_feed: StdInstant::now(),
        }
    }
}

impl Default for HostWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog for HostWatchdog {
    fn feed(&mut self) {
        let gap = self.last_feed.elapsed();
        if gap.as_millis() > u128::from(WATCHDOG_TIMEOUT.as_millis()) {
            warn!("Watchdog fed late: {} ms since last feed", gap.as_millis());
        }
        self.last_feed = StdInstant::now();
    }
}

/// The host's own network connection standing in for Wi-Fi.
///
/// Joining only records the SSID; the address is the one the host would
/// use to reach the outside world.
pub struct HostLink {
    mac: MacAddress,
    up: bool,
}

impl HostLink {
    pub fn new(mac: MacAddress) -> Self {
        Self { mac, up: false }
    }
}

/// Local address of the default route. No packet is sent.
fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

impl NetworkLink for HostLink {
    fn join(&mut self, credentials: &WifiCredentials) -> Result<(), LinkError> {
        info!("Joining network {:?} (host network)", credentials.ssid);
        self.up = true;
        Ok(())
    }

    fn is_up(&mut self) -> bool {
        self.up
    }

    fn mac_address(&self) -> MacAddress {
        self.mac
    }

    fn ip_address(&self) -> Option<Ipv4Addr> {
        if self.up { local_ipv4() } else { None }
    }
}

/// Status LED reported through the log.
#[derive(Default)]
pub struct LogLed {
    color: Option<Rgb888>,
}

impl StatusLed for LogLed {
    fn set_color(&mut self, color: Option<Rgb888>) {
        if self.color == color {
            return;
        }
        self.color = color;
        match color {
            Some(c) => info!("LED #{:02X}{:02X}{:02X}", c.r(), c.g(), c.b()),
            None => info!("LED off"),
        }
    }
}

pub struct LogBacklight;

impl Backlight for LogBacklight {
    type Error = Infallible;

    fn set_level(&mut self, pct: u8) -> Result<(), Self::Error> {
        debug!("Backlight level {}%", pct);
        Ok(())
    }
}

pub type HostDisplay = GraphicsDisplay<SnapshotPanel, LogBacklight>;

pub struct HostPlatform;

impl Platform for HostPlatform {
    type Storage = FileStorage;
    type Connector = TcpConnector;
    type Link = HostLink;
    type Display = HostDisplay;
    type Led = LogLed;
    type Watchdog = HostWatchdog;
    type Clock = HostClock;
    type Delay = HostDelay;
}

//! Collaborators the runtime drives.
//!
//! A [`Platform`] names one concrete type per collaborator. The firmware and
//! the host runner each provide their own set; the tests provide mocks.

use core::fmt::Debug;
use core::net::Ipv4Addr;

use embassy_time::Instant;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_hal::delay::DelayNs;

use crate::config::KeyValueStorage;
use crate::display::IndicatorLayout;
use crate::identity::MacAddress;
use crate::net::{Connector, NetworkLink};
use crate::tally::{CameraNumber, TallyIndication};

/// Hardware watchdog. Must be fed well within [`WATCHDOG_TIMEOUT`].
///
/// [`WATCHDOG_TIMEOUT`]: crate::constants::WATCHDOG_TIMEOUT
pub trait Watchdog {
    fn feed(&mut self);
}

/// Monotonic time source.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Optional RGB status LED. `None` turns it off.
pub trait StatusLed {
    fn set_color(&mut self, color: Option<Rgb888>);
}

/// How a full-screen notice is coloured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Ok,
    Warning,
    Error,
}

/// The tally display.
///
/// Errors are reported to the runtime, which logs them and carries on; a
/// broken screen must never stop the tally from tracking the switcher.
pub trait TallyDisplay {
    type Error: Debug;

    /// Select the indicator style; called once at setup.
    fn set_layout(&mut self, layout: IndicatorLayout) -> Result<(), Self::Error>;

    /// Show the indication for the assigned camera. While a notice is up the
    /// new state is remembered and shown once the notice is cleared.
    fn set_state(
        &mut self,
        indication: TallyIndication,
        camera: Option<CameraNumber>,
    ) -> Result<(), Self::Error>;

    /// Replace the screen with a message.
    fn show_notice(&mut self, message: &str, severity: Severity) -> Result<(), Self::Error>;

    /// Drop the notice and return to the indication.
    fn clear_notice(&mut self) -> Result<(), Self::Error>;

    /// Flash the device identity (identify request).
    fn show_identity(&mut self, mac: MacAddress, ip: Option<Ipv4Addr>) -> Result<(), Self::Error>;

    /// Backlight level in percent, `0..=100`.
    fn set_backlight(&mut self, pct: u8) -> Result<(), Self::Error>;
}

/// LED colour for an indication.
pub fn led_color(indication: TallyIndication) -> Option<Rgb888> {
    match indication {
        TallyIndication::Live => Some(Rgb888::new(0xFF, 0x00, 0x00)),
        TallyIndication::Preview => Some(Rgb888::new(0x00, 0x77, 0x00)),
        TallyIndication::Standby => None,
        TallyIndication::Unassigned => Some(Rgb888::new(0xFF, 0x66, 0x00)),
    }
}

/// The set of concrete collaborator types for one target.
pub trait Platform {
    type Storage: KeyValueStorage;
    type Connector: Connector;
    type Link: NetworkLink;
    type Display: TallyDisplay;
    type Led: StatusLed;
    type Watchdog: Watchdog;
    type Clock: Clock;
    type Delay: DelayNs;
}

/// Devices handed to the runtime at setup.
pub struct Peripherals<P: Platform> {
    pub link: P::Link,
    pub display: P::Display,
    pub led: P::Led,
    pub watchdog: P::Watchdog,
    pub clock: P::Clock,
    pub delay: P::Delay,
}

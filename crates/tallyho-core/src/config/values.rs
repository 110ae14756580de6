//! Typed values that live in the configuration store.

use alloc::format;
use alloc::string::{String, ToString};
use core::fmt;

use crate::constants::{DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT};
use crate::display::IndicatorLayout;

/// A value that can be persisted as a plain-text string.
///
/// Decoding is total: anything that does not parse yields `None`, and the
/// caller falls back to its default.
pub trait ConfigValue: Sized {
    fn decode(raw: &str) -> Option<Self>;
    fn encode(&self) -> String;
}

macro_rules! integer_config_value {
    ($($ty:ty),*) => {
        $(
            impl ConfigValue for $ty {
                fn decode(raw: &str) -> Option<Self> {
                    raw.trim().parse().ok()
                }

                fn encode(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

integer_config_value!(i32, i64, u8, u16, u32);

/// Strip the line break a hand-edited file usually ends with.
fn strip_line_break(raw: &str) -> &str {
    raw.trim_end_matches(['\r', '\n'])
}

impl ConfigValue for String {
    fn decode(raw: &str) -> Option<Self> {
        Some(strip_line_break(raw).to_string())
    }

    fn encode(&self) -> String {
        self.clone()
    }
}

/// Wi-Fi network credentials, stored as `ssid,password`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

impl ConfigValue for WifiCredentials {
    /// Split at the first comma; the password may itself contain commas.
    fn decode(raw: &str) -> Option<Self> {
        let (ssid, password) = strip_line_break(raw).split_once(',')?;
        if ssid.is_empty() {
            return None;
        }
        Some(Self {
            ssid: ssid.to_string(),
            password: password.to_string(),
        })
    }

    fn encode(&self) -> String {
        format!("{},{}", self.ssid, self.password)
    }
}

/// Board/hardware variant. Selects the indicator layout once at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoardModel {
    /// Round 240×240 panel; ring indicator around the edge.
    #[default]
    Round,
    /// Rectangular panel; bar indicator.
    Square,
}

impl BoardModel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Round => "round",
            Self::Square => "square",
        }
    }

    pub const fn layout(self) -> IndicatorLayout {
        match self {
            Self::Round => IndicatorLayout::Ring,
            Self::Square => IndicatorLayout::Bar,
        }
    }
}

impl ConfigValue for BoardModel {
    fn decode(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("round") {
            Some(Self::Round)
        } else if raw.eq_ignore_ascii_case("square") {
            Some(Self::Square)
        } else {
            None
        }
    }

    fn encode(&self) -> String {
        self.label().to_string()
    }
}

/// Address of the switcher-feed server, stored as `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl ConfigValue for ServerAddress {
    fn decode(raw: &str) -> Option<Self> {
        let (host, port) = raw.trim().rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        Some(Self::new(host, port.parse().ok()?))
    }

    fn encode(&self) -> String {
        self.to_string()
    }
}

//! Process settings for the desktop runner.
//!
//! Read from the environment (and a `.env` file, if present):
//!
//! | Variable             | Default             | Meaning                              |
//! |----------------------|---------------------|--------------------------------------|
//! | `TALLYHO_CONFIG_DIR` | `config`            | Directory holding one file per key   |
//! | `TALLYHO_MAC`        | `02:00:00:00:00:01` | Identity reported to the server      |
//! | `TALLYHO_SERVER`     | stored value        | `host:port`, persisted when given    |
//! | `TALLYHO_SNAPSHOT`   | unset               | PNG file rewritten on every redraw   |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;

use tallyho_core::config::{ConfigValue, ServerAddress};
use tallyho_core::identity::MacAddress;
use thiserror_no_std::Error;

pub const CONFIG_DIR_VAR: &str = "TALLYHO_CONFIG_DIR";
pub const MAC_VAR: &str = "TALLYHO_MAC";
pub const SERVER_VAR: &str = "TALLYHO_SERVER";
pub const SNAPSHOT_VAR: &str = "TALLYHO_SNAPSHOT";

const DEFAULT_CONFIG_DIR: &str = "config";

/// Locally administered address used when none is configured.
const DEFAULT_MAC: MacAddress = MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("TALLYHO_MAC is not a MAC address: {0:?}")]
    InvalidMac(String),
    #[error("TALLYHO_SERVER is not host:port: {0:?}")]
    InvalidServer(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub config_dir: PathBuf,
    pub mac: MacAddress,
    /// Server override; replaces the stored address when set.
    pub server: Option<ServerAddress>,
    pub snapshot: Option<PathBuf>,
}

impl Settings {
    /// Load `.env` (if any), then read the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mac = match var(MAC_VAR) {
            Some(raw) => raw.parse::<MacAddress>().map_err(|_| SettingsError::InvalidMac(raw))?,
            None => DEFAULT_MAC,
        };

        let server = match var(SERVER_VAR) {
            Some(raw) => match ServerAddress::decode(&raw) {
                Some(server) => Some(server),
                None => return Err(SettingsError::InvalidServer(raw)),
            },
            None => None,
        };

        Ok(Self {
            config_dir: var(CONFIG_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR)),
            mac,
            server,
            snapshot: var(SNAPSHOT_VAR).map(PathBuf::from),
        })
    }
}

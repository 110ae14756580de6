//! Typed configuration store on top of a raw key/string backend.
//!
//! Every persisted setting is a flat key holding a plain-text value. Reads
//! never fail past this boundary: a missing, unreadable or corrupt value is
//! replaced by the caller's default.

mod storage;
mod values;

pub use storage::*;
pub use values::*;

use log::{debug, warn};

use crate::error::error_text;

/// Keys of the persisted settings.
pub mod keys {
    /// Boot counter, see [`crate::boot`].
    pub const BOOT_COUNTER: &str = "unsuccessful_boots";
    /// Board/hardware variant.
    pub const MODEL: &str = "model";
    /// Backlight percentage.
    pub const BACKLIGHT: &str = "backlight";
    /// Wi-Fi credentials, `ssid,password`.
    pub const WIFI: &str = "wifi";
    /// Assigned camera number.
    pub const CAMERA: &str = "camera";
    /// Switcher-feed server, `host:port`.
    pub const SERVER: &str = "server";
}

/// Typed view over a [`KeyValueStorage`] backend.
pub struct ConfigStore<S: KeyValueStorage> {
    storage: S,
}

impl<S: KeyValueStorage> ConfigStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Read and decode `key`, reporting why no value is available.
    pub fn load<T: ConfigValue>(&mut self, key: &str) -> Result<T, StorageError> {
        let raw = self.storage.read(key)?;
        T::decode(&raw).ok_or_else(|| StorageError::Decode(error_text(key)))
    }

    /// Read and decode `key`, falling back to `default` on any error.
    pub fn get<T: ConfigValue>(&mut self, key: &str, default: T) -> T {
        match self.load(key) {
            Ok(value) => value,
            Err(StorageError::NotFound) => {
                debug!("Config `{}` not set, using default", key);
                default
            }
            Err(e) => {
                warn!("Config `{}` unusable ({}), using default", key, e);
                default
            }
        }
    }

    /// Encode and persist `value` under `key`.
    pub fn set<T: ConfigValue>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        let encoded = value.encode();
        debug!("Config `{}` <- {:?}", key, encoded.as_str());
        self.storage.write(key, &encoded)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_inner(self) -> S {
        self.storage
    }
}

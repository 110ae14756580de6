//! Raw key/string persistence backends.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};

use thiserror_no_std::Error;

use crate::error::ErrorText;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("key not set")]
    NotFound,
    #[error("storage I/O failed: {0}")]
    Io(ErrorText),
    #[error("stored value for `{0}` could not be decoded")]
    Decode(ErrorText),
}

/// A durable key → string mapping.
///
/// Implementations store one value per key. There is no enumeration or
/// deletion, and writes are not required to be atomic: a reader may see a
/// truncated value after an interrupted write, which [`ConfigStore`]
/// treats as undecodable.
///
/// [`ConfigStore`]: super::ConfigStore
pub trait KeyValueStorage {
    /// Read the raw value stored under `key`.
    ///
    /// Returns [`StorageError::NotFound`] when the key has never been set.
    fn read(&mut self, key: &str) -> Result<String, StorageError>;

    /// Replace the value stored under `key`.
    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Volatile in-RAM storage.
///
/// Used by tests and by platforms without a writable filesystem; values are
/// lost on reset.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    values: BTreeMap<String, String>,
    read_only: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject all writes with an I/O error, like a worn-out or locked flash.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Seed a raw value, bypassing encoding.
    pub fn insert_raw(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    /// The raw value currently stored under `key`.
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl KeyValueStorage for MemoryStorage {
    fn read(&mut self, key: &str) -> Result<String, StorageError> {
        self.values.get(key).cloned().ok_or(StorageError::NotFound)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::Io(crate::error::error_text("storage is read-only")));
        }
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

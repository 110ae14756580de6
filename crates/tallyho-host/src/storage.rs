//! File-per-key configuration storage.
//!
//! Each key is a plain-text file in one directory, so settings can be
//! inspected and edited by hand:
//!
//! ```text
//! config/
//! ├── camera      "3"
//! ├── wifi        "Studio,secret"
//! └── server      "10.0.0.5:8000"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use tallyho_core::config::{KeyValueStorage, StorageError};
use tallyho_core::error::error_text;

pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

fn io_error(e: &io::Error) -> StorageError {
    StorageError::Io(error_text(&e.to_string()))
}

impl KeyValueStorage for FileStorage {
    fn read(&mut self, key: &str) -> Result<String, StorageError> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(value),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(e) => Err(io_error(&e)),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|e| io_error(&e))?;
        let path = self.path(key);
        debug!("Writing {}", path.display());
        fs::write(path, value).map_err(|e| io_error(&e))
    }
}

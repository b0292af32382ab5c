//! JSON file state storage.
//!
//! Each record is a human-readable JSON file in the state directory
//! (see [`crate::paths::state_dir`]), rewritten wholesale on every update.
//! The typed helpers here implement the load → mutate → save cycle used by
//! every state machine in the crate.

use crate::error::Result;
use crate::traits::{StateKey, StateStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

/// State store backed by one JSON file per record.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    /// Directory holding the record files.
    dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at the given directory.
    ///
    /// The directory is created lazily on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the file path backing a record.
    #[must_use]
    pub fn path_for(&self, key: StateKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl StateStore for JsonFileStore {
    fn read(&self, key: StateKey) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn write(&self, key: StateKey, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), contents)?;
        Ok(())
    }

    fn remove(&self, key: StateKey) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Load and decode a record.
///
/// A missing, unreadable or malformed record all come back as `None`: the
/// caller starts from a fresh structure rather than failing the hook.
pub fn load_record<T: DeserializeOwned>(store: &dyn StateStore, key: StateKey) -> Option<T> {
    let contents = store.read(key).ok()??;
    serde_json::from_str(&contents).ok()
}

/// Encode and write a record as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the record cannot be serialized or written.
pub fn save_record<T: Serialize>(store: &dyn StateStore, key: StateKey, record: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    store.write(key, &json)
}

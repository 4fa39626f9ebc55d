//! Durable client-side key-value storage.
//!
//! The gate keeps two pieces of state across sessions: the rate-limit window
//! and the conversion history. Both sit behind [`KeyValueStore`] so window
//! logic can be exercised against [`MemoryStore`] while production uses
//! [`FileStore`].
//!
//! Writes are plain read-modify-write with no cross-process locking. Two
//! processes sharing a state directory can race on the same key.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors raised by a [`KeyValueStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("storage IO error for key {key} at {path}: {source}")]
    Io {
        /// Key being accessed.
        key: String,
        /// Backing file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The stored value could not be (de)serialized.
    #[error("malformed value for key {key}: {source}")]
    Malformed {
        /// Key being accessed.
        key: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// Key contains characters that cannot be mapped to a file name.
    #[error("invalid storage key: {key}")]
    InvalidKey {
        /// Offending key.
        key: String,
    },

    /// The in-memory lock was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    Poisoned,
}

impl StorageError {
    /// Creates an IO error.
    pub fn io(key: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            path: path.into(),
            source,
        }
    }

    /// Creates a malformed-value error.
    pub fn malformed(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Malformed {
            key: key.into(),
            source,
        }
    }
}

/// String-valued key-value storage.
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Returns the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Reads and deserializes a JSON value.
///
/// # Errors
///
/// Returns [`StorageError::Malformed`] if the stored value is not valid JSON
/// for `T`, or any backend error from the store.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| StorageError::malformed(key, e))
}

/// Serializes and stores a JSON value.
///
/// # Errors
///
/// Returns [`StorageError`] on serialization or backend failure.
pub fn save_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|e| StorageError::malformed(key, e))?;
    store.set(key, &raw)
}

/// In-memory store. Each instance is fully isolated.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = self.map.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.map.lock().map_err(|_| StorageError::Poisoned)?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut map = self.map.lock().map_err(|_| StorageError::Poisoned)?;
        map.remove(key);
        Ok(())
    }
}

/// File-backed store: one `<key>.json` file per key inside a state directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be created.
    #[instrument(skip(dir), fields(dir = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StorageError::io("<root>", &dir, e))?;
        debug!("opened file store");
        Ok(Self { dir })
    }

    /// Returns the state directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(key, path, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        // Write-then-rename so a crash never leaves a half-written value.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| StorageError::io(key, &tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| StorageError::io(key, &path, e))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(key, path, e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        count: u32,
    }

    #[test]
    fn test_memory_store_set_get_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_memory_stores_are_isolated() {
        let a = MemoryStore::new();
        let b = MemoryStore::new();
        a.set("k", "1").unwrap();
        assert_eq!(b.get("k").unwrap(), None);
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let first = FileStore::open(dir.path()).unwrap();
        save_json(&first, "gate.window", &Sample { count: 2 }).unwrap();

        let second = FileStore::open(dir.path()).unwrap();
        let loaded: Option<Sample> = load_json(&second, "gate.window").unwrap();
        assert_eq!(loaded, Some(Sample { count: 2 }));
        assert!(dir.path().join("gate.window.json").exists());
    }

    #[test]
    fn test_file_store_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get("absent").unwrap(), None);
        store.delete("absent").unwrap();
    }

    #[test]
    fn test_file_store_rejects_path_traversal_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for key in ["../escape", "a/b", "", ".hidden"] {
            assert!(
                matches!(store.set(key, "x"), Err(StorageError::InvalidKey { .. })),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_load_json_reports_malformed_value() {
        let store = MemoryStore::new();
        store.set("k", "{not json").unwrap();
        let result: Result<Option<Sample>, _> = load_json(&store, "k");
        assert!(matches!(result, Err(StorageError::Malformed { .. })));
    }
}

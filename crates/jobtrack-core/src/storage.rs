//! Durable key-value capability used to persist the task collection
//!
//! The store only needs string values under a single fixed key, so the
//! interface is deliberately narrow. Implementations:
//! - [`MemoryStorage`]: process-local map, optional byte quota
//! - [`FileStorage`]: one file per key inside a directory
//! - [`NullStorage`]: capability absent; reads return nothing, writes fail

use crate::error::StorageError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Durable string storage keyed by name.
pub trait DurableStorage: Send + Sync {
    /// Read the value stored under `key`. Returns `None` if the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// In-process storage backed by a map
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    /// Create empty storage without a quota
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage that rejects values larger than `quota_bytes`
    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Seed a raw value, bypassing the quota
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.lock().insert(key.into(), value.into());
    }

    /// Raw value currently stored under `key`
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota_bytes {
            if value.len() > quota {
                return Err(StorageError::QuotaExceeded(key.to_string()));
            }
        }
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Storage that keeps each key in its own file under a directory
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir` as the storage root. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage root
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds `key`
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }
}

impl DurableStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StorageError::InvalidEncoding(key.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", sanitize_key(key)));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Storage for environments without a durable capability
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStorage;

impl DurableStorage for NullStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    fn set(&self, key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable(format!(
            "no durable storage configured (key {key})"
        )))
    }
}

/// Map a key onto a safe file stem.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert!(storage.get("k").unwrap().is_none());

        storage.set("k", "v1").unwrap();
        storage.set("k", "v2").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn memory_storage_enforces_quota() {
        let storage = MemoryStorage::with_quota(4);
        assert!(storage.set("k", "1234").is_ok());

        let err = storage.set("k", "12345").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded(ref key) if key == "k"));
        assert_eq!(storage.raw("k").as_deref(), Some("1234"));
    }

    #[test]
    fn file_storage_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("state"));
        assert!(storage.get("background-tasks").unwrap().is_none());
    }

    #[test]
    fn file_storage_persists_between_instances() {
        let dir = tempfile::tempdir().unwrap();

        FileStorage::new(dir.path()).set("background-tasks", "[1]").unwrap();

        let reopened = FileStorage::new(dir.path());
        assert_eq!(
            reopened.get("background-tasks").unwrap().as_deref(),
            Some("[1]")
        );
        assert!(!dir.path().join(".background-tasks.json.tmp").exists());
    }

    #[test]
    fn file_storage_sanitizes_keys() {
        let storage = FileStorage::new("/tmp/jobtrack");
        assert_eq!(
            storage.path_for("a/b:c"),
            PathBuf::from("/tmp/jobtrack/a_b_c.json")
        );
    }

    #[test]
    fn file_storage_rejects_non_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        fs::write(storage.path_for("k"), [0xff, 0xfe]).unwrap();

        assert!(matches!(
            storage.get("k"),
            Err(StorageError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn null_storage_reads_nothing_and_refuses_writes() {
        let storage = NullStorage;
        assert!(storage.get("k").unwrap().is_none());
        assert!(matches!(
            storage.set("k", "v"),
            Err(StorageError::Unavailable(_))
        ));
    }
}

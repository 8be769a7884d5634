//! Durable local storage for the offline queue and fallback snapshots.
//!
//! The client persists three values: the offline operation queue and one
//! full catalogue snapshot per collection. Writes are whole-value
//! overwrites, so implementations only need a string key/value interface.

use crate::{ClientError, Result};
use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Storage key for the offline operation queue.
pub const QUEUE_KEY: &str = "offlineOperations";

/// Storage key for the book catalogue fallback snapshot.
pub const BOOKS_KEY: &str = "myBookTrackerBooks";

/// Storage key for the category catalogue fallback snapshot.
pub const CATEGORIES_KEY: &str = "myBookTrackerCategories";

/// Synchronous key/value persistence.
///
/// One client instance owns one storage; concurrent writers are out of
/// scope. Calls are quick local IO and are made from async context
/// without spawning.
pub trait LocalStorage: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete the value stored under `key`. Removing an absent key is
    /// not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Volatile in-memory storage for tests and throwaway clients.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

/// File-backed storage: one file per key under a root directory.
///
/// Writes go to a temporary file first and are moved into place with a
/// rename, so a crash mid-write never leaves a half-written value.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open storage rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| storage_error(&root, e))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl LocalStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(&path, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = self.root.join(format!("{key}.json.tmp"));
        fs::write(&tmp, value).map_err(|e| storage_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| storage_error(&path, e))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(&path, e)),
        }
    }
}

fn storage_error(path: &Path, err: std::io::Error) -> ClientError {
    ClientError::Storage(format!("{}: {err}", path.display()))
}

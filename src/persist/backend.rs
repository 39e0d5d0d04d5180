//! Storage backends

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::{debug, warn};

use super::Storage;
use crate::{Result, TapedeckError};

/// One JSON document per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `dir`
    ///
    /// # Errors
    ///
    /// Returns error if `dir` is not an existing directory
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(TapedeckError::ConfigError(format!(
                "Storage directory does not exist: {}",
                dir.display()
            )));
        }
        Ok(Self { dir })
    }

    /// Directory holding the documents
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document stored under `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");

        // Write beside the target, then swap in one rename
        let written = write_and_rename(&tmp_path, &path, value);
        if let Err(e) = written {
            if let Err(cleanup) = std::fs::remove_file(&tmp_path) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", tmp_path.display(), cleanup);
                }
            }
            return Err(e.into());
        }

        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }
}

fn write_and_rename(tmp_path: &Path, path: &Path, value: &str) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(tmp_path)?;
    file.write_all(value.as_bytes())?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(tmp_path, path)
}

/// In-process storage with an optional hard capacity
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
    capacity: Option<usize>,
}

impl MemoryStorage {
    /// Unbounded storage
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage rejecting any document larger than `capacity` bytes
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: Some(capacity),
        }
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Some(limit) = self.capacity {
            if value.len() > limit {
                return Err(TapedeckError::StorageFull {
                    size: value.len(),
                    limit,
                });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_storage_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        assert!(storage.get("state").unwrap().is_none());
        storage.set("state", "{\"a\":1}").unwrap();
        storage.set("state", "{\"a\":2}").unwrap();

        assert_eq!(storage.get("state").unwrap().as_deref(), Some("{\"a\":2}"));
        assert!(!storage.path_for("state").with_extension("json.tmp").exists());
    }

    #[test]
    fn test_failed_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        // A non-empty directory where the document belongs makes the rename fail
        let target = storage.path_for("state");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("occupied"), "x").unwrap();

        assert!(storage.set("state", "{\"a\":1}").is_err());
        assert!(!target.with_extension("json.tmp").exists());
        assert!(target.is_dir());
    }

    #[test]
    fn test_file_storage_encodes_keys() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        storage.set("../escape/key", "x").unwrap();

        let path = storage.path_for("../escape/key");
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(storage.get("../escape/key").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_file_storage_requires_directory() {
        assert!(FileStorage::new("/definitely/not/here").is_err());
    }

    #[test]
    fn test_memory_storage_capacity() {
        let storage = MemoryStorage::with_capacity(4);

        storage.set("k", "1234").unwrap();
        let err = storage.set("k", "12345").unwrap_err();

        assert!(matches!(err, TapedeckError::StorageFull { size: 5, limit: 4 }));
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("1234"));
        assert_eq!(storage.len(), 1);
    }
}

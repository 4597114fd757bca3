//! The key-value port every piece of persisted state goes through.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::page::PageId;

pub const PAGE_KEY_PREFIX: &str = "csrd_page_";
pub const EDITOR_MODE_KEY: &str = "csrd_editor_mode";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a valid storage file: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Synchronous string store. Each call is atomic on its own; nothing
/// coordinates between callers.
pub trait Storage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Vec<String>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// A JSON object on disk, rewritten through a temporary file on every
/// mutation.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|source| StorageError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        tracing::debug!(path = %path.display(), keys = entries.len(), "opened storage");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        let io_err = |source: io::Error| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            StorageError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        tracing::trace!(path = %self.path.display(), keys = self.entries.len(), "storage flushed");
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

pub fn page_key(id: &PageId) -> String {
    format!("{PAGE_KEY_PREFIX}{}", id.as_str())
}

/// Saved override bodies, one per page identifier. Newest save wins.
pub struct PersistedPages;

impl PersistedPages {
    pub fn get(storage: &dyn Storage, id: &PageId) -> Option<String> {
        storage.get(&page_key(id))
    }

    pub fn put(storage: &mut dyn Storage, id: &PageId, body: &str) -> Result<(), StorageError> {
        storage.set(&page_key(id), body)
    }

    /// Removes every saved body and returns how many were dropped.
    pub fn discard_all(storage: &mut dyn Storage) -> Result<usize, StorageError> {
        let keys: Vec<String> = storage
            .keys()
            .into_iter()
            .filter(|key| key.starts_with(PAGE_KEY_PREFIX))
            .collect();
        for key in &keys {
            storage.remove(key)?;
        }
        Ok(keys.len())
    }
}

pub fn editor_mode_enabled(storage: &dyn Storage) -> bool {
    storage.get(EDITOR_MODE_KEY).as_deref() == Some("true")
}

pub fn set_editor_mode(storage: &mut dyn Storage, enabled: bool) -> Result<(), StorageError> {
    storage.set(EDITOR_MODE_KEY, if enabled { "true" } else { "false" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_round_trip() {
        let mut storage = MemoryStorage::new();
        storage.set("a", "1").unwrap();
        storage.set("a", "2").unwrap();
        assert_eq!(storage.get("a").as_deref(), Some("2"));
        storage.remove("a").unwrap();
        assert!(storage.get("a").is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn discard_all_only_touches_page_bodies() {
        let mut storage = MemoryStorage::new();
        PersistedPages::put(&mut storage, &PageId::new("a.html"), "<p>a</p>").unwrap();
        PersistedPages::put(&mut storage, &PageId::new("b.html"), "<p>b</p>").unwrap();
        set_editor_mode(&mut storage, true).unwrap();

        assert_eq!(PersistedPages::discard_all(&mut storage).unwrap(), 2);
        assert!(PersistedPages::get(&storage, &PageId::new("a.html")).is_none());
        assert!(editor_mode_enabled(&storage));
    }

    #[test]
    fn file_storage_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("storage.json");

        let mut storage = FileStorage::open(&path).unwrap();
        assert!(storage.keys().is_empty());
        storage.set("csrd_page_home.html", "<p>saved</p>").unwrap();
        storage.set(EDITOR_MODE_KEY, "true").unwrap();
        drop(storage);

        let mut reopened = FileStorage::open(&path).unwrap();
        assert_eq!(
            reopened.get("csrd_page_home.html").as_deref(),
            Some("<p>saved</p>")
        );
        reopened.remove(EDITOR_MODE_KEY).unwrap();
        drop(reopened);

        let again = FileStorage::open(&path).unwrap();
        assert_eq!(again.keys(), vec!["csrd_page_home.html".to_string()]);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileStorage::open(&path),
            Err(StorageError::Corrupt { .. })
        ));
    }
}

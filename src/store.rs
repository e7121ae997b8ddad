//! File-backed cache store.
//!
//! The whole store lives in one JSON file, `<cache_dir>/response-cache.json`.
//! Every load reads the full file and every save rewrites it, so the cost of
//! a cached call grows with the total cache size. There is no incremental
//! update format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::cache::{CacheEntry, Fingerprint};
use crate::error::{CacheError, Result};

pub const CACHE_FILE_NAME: &str = "response-cache.json";

/// In-memory view of the persisted cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStore {
    entries: HashMap<Fingerprint, CacheEntry>,
}

impl CacheStore {
    pub fn get(&self, key: &Fingerprint) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Refresh the access time of `key` and return its payload.
    pub fn touch(&mut self, key: &Fingerprint, now: DateTime<Utc>) -> Option<&str> {
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed = now;
        Some(entry.payload.as_str())
    }

    // replaces any existing entry as a whole
    pub fn insert(&mut self, key: Fingerprint, payload: String, now: DateTime<Utc>) {
        self.entries.insert(key, CacheEntry::new(payload, now));
    }

    pub fn remove(&mut self, key: &Fingerprint) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.entries.contains_key(key)
    }

    // sum of payload lengths in bytes
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(CacheEntry::size).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Fingerprint, &CacheEntry)> {
        self.entries.iter()
    }
}

/// Handle on the backing file. Cheap to clone; holds only the path.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    path: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(CACHE_FILE_NAME);
        Self { dir, path }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> Result<bool> {
        tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| CacheError::persistence(&self.path, e))
    }

    // sibling file a save is staged in before the rename
    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.tmp", CACHE_FILE_NAME))
    }

    /// Read the persisted store. A missing file is a cold start, not an error.
    pub async fn load(&self) -> Result<CacheStore> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No cache file, starting empty");
                return Ok(CacheStore::default());
            }
            Err(e) => return Err(CacheError::persistence(&self.path, e)),
        };

        serde_json::from_slice(&data).map_err(|source| CacheError::CorruptPersistedState {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the persisted store with `store`, creating the directory if needed.
    ///
    /// The new content is written to a temp file and renamed over the old one,
    /// so a concurrent reader sees either the previous store or the new one.
    pub async fn save(&self, store: &CacheStore) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::persistence(&self.dir, e))?;

        let data = serde_json::to_vec_pretty(store).map_err(CacheError::Serialization)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, data)
            .await
            .map_err(|e| CacheError::persistence(&temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| CacheError::persistence(&self.path, e))
    }

    /// Remove the cache file, then its directory if nothing else lives there.
    ///
    /// Never recursive: other files in a user-chosen cache dir are left alone.
    pub async fn clear(&self) -> Result<()> {
        for file in [self.path.clone(), self.temp_path()] {
            match tokio::fs::remove_file(&file).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::persistence(file, e)),
            }
        }

        match tokio::fs::remove_dir(&self.dir).await {
            Ok(()) => {}
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::DirectoryNotEmpty) => {
                tracing::debug!(dir = %self.dir.display(), "Cache dir kept: {}", e);
            }
            Err(e) => return Err(CacheError::persistence(&self.dir, e)),
        }

        tracing::info!(path = %self.path.display(), "Cache cleared");
        Ok(())
    }
}

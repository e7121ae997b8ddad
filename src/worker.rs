use chrono::Utc;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};

use crate::cache::Fingerprint;
use crate::error::Result;
use crate::eviction::evict;
use crate::metrics::{CACHE_BYTES, CACHE_EVICTIONS, CACHE_HITS, CACHE_MISSES};
use crate::store::{CacheStore, FileStore};

lazy_static! {
    // one running worker per cache file in this process
    static ref WORKERS: Mutex<HashMap<PathBuf, mpsc::Sender<StoreCommand>>> =
        Mutex::new(HashMap::new());
}

// Commands for the store worker, each with a one-time reply channel
pub enum StoreCommand {
    Lookup {
        key: Fingerprint,
        reply: oneshot::Sender<Result<Option<String>>>,
    },
    Insert {
        key: Fingerprint,
        payload: String,
        limit: u64,
        reply: oneshot::Sender<Result<Vec<Fingerprint>>>,
    },
    Stats {
        reply: oneshot::Sender<Result<CacheStats>>,
    },
    Clear {
        reply: oneshot::Sender<Result<()>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

/// Sender for the worker that owns `files`, spawning one if none is running.
///
/// Workers are registered by absolute cache file path, so every client in the
/// process that points at the same file queues through the same writer. A
/// worker whose runtime has shut down is replaced on the next call. Must be
/// called inside a tokio runtime.
pub fn worker_for(files: &FileStore) -> mpsc::Sender<StoreCommand> {
    let key = registry_key(files.path());
    let mut workers = WORKERS.lock().unwrap_or_else(PoisonError::into_inner);
    workers.retain(|_, tx| !tx.is_closed());

    if let Some(tx) = workers.get(&key) {
        return tx.clone();
    }

    let (tx, rx) = mpsc::channel::<StoreCommand>(100);
    tokio::spawn(store_worker(rx, files.clone()));
    workers.insert(key, tx.clone());
    tx
}

// lexical only: the cache dir may not exist yet
fn registry_key(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Owns every read-modify-write of the cache file.
///
/// Commands are handled one at a time, so two callers can never load the same
/// snapshot and overwrite each other's insert. The store is reloaded from disk
/// for every command; nothing is kept in memory between them.
pub async fn store_worker(mut rx: mpsc::Receiver<StoreCommand>, files: FileStore) {
    tracing::debug!(path = %files.path().display(), "Store worker started");

    while let Some(command) = rx.recv().await {
        match command {
            StoreCommand::Lookup { key, reply } => {
                let _ = reply.send(lookup(&files, &key).await);
            }
            StoreCommand::Insert {
                key,
                payload,
                limit,
                reply,
            } => {
                let _ = reply.send(insert(&files, key, payload, limit).await);
            }
            StoreCommand::Stats { reply } => {
                let result = load_store(&files).await.map(|store| CacheStats {
                    entries: store.len(),
                    total_bytes: store.total_size(),
                });
                let _ = reply.send(result);
            }
            StoreCommand::Clear { reply } => {
                let result = files.clear().await;
                if result.is_ok() {
                    CACHE_BYTES.set(0.0);
                }
                let _ = reply.send(result);
            }
        }
    }

    tracing::debug!("Store worker stopped");
}

// load and publish the current size
async fn load_store(files: &FileStore) -> Result<CacheStore> {
    let store = files.load().await?;
    CACHE_BYTES.set(store.total_size() as f64);
    Ok(store)
}

async fn lookup(files: &FileStore, key: &Fingerprint) -> Result<Option<String>> {
    let mut store = load_store(files).await?;

    let payload = match store.touch(key, Utc::now()) {
        Some(payload) => payload.to_string(),
        None => {
            CACHE_MISSES.inc();
            tracing::debug!(key = %key.short(), "Cache MISS");
            return Ok(None);
        }
    };

    files.save(&store).await?;
    CACHE_HITS.inc();
    tracing::debug!(key = %key.short(), "Cache HIT");
    Ok(Some(payload))
}

async fn insert(
    files: &FileStore,
    key: Fingerprint,
    payload: String,
    limit: u64,
) -> Result<Vec<Fingerprint>> {
    // reload so inserts that landed while the remote call ran are kept
    let mut store = load_store(files).await?;
    store.insert(key, payload, Utc::now());

    let evicted = evict(&mut store, limit);
    files.save(&store).await?;

    CACHE_EVICTIONS.inc_by(evicted.len() as f64);
    CACHE_BYTES.set(store.total_size() as f64);
    Ok(evicted)
}

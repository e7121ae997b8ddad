use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::cache::fingerprint;
use crate::client::RemoteCall;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::metrics::{REMOTE_ERRORS, REMOTE_LATENCY, REQUEST_TOTAL};
use crate::models::ChatRequest;
use crate::store::FileStore;
use crate::worker::{CacheStats, StoreCommand, worker_for};

// An answer plus where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub cached: bool,
}

/// Cache-aware front for a [`RemoteCall`].
///
/// There is one store worker per cache file in the process. Clones, and
/// separately constructed clients whose `cache_dir` resolves to the same
/// absolute path, all queue through that worker, so their inserts never
/// overwrite each other. Other processes sharing the directory are not
/// coordinated: the file is replaced atomically, but the last writer wins.
///
/// The remote call itself runs on the caller's task; only the short
/// load/mutate/save cycles go through the worker.
pub struct CachingClient<R> {
    remote: Arc<R>,
    config: CacheConfig,
    files: FileStore,
    store_tx: mpsc::Sender<StoreCommand>,
}

impl<R> Clone for CachingClient<R> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            config: self.config.clone(),
            files: self.files.clone(),
            store_tx: self.store_tx.clone(),
        }
    }
}

impl<R: RemoteCall> CachingClient<R> {
    /// Must be called inside a tokio runtime; joins or spawns the store worker.
    pub fn new(remote: R, config: CacheConfig) -> Self {
        let files = FileStore::new(&config.cache_dir);
        let store_tx = worker_for(&files);

        tracing::info!(
            enabled = config.enabled,
            size_limit = config.size_limit,
            path = %files.path().display(),
            "Response cache initialized"
        );

        Self {
            remote: Arc::new(remote),
            config,
            files,
            store_tx,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    pub async fn get_response(&self, request: &ChatRequest) -> Result<Completion> {
        self.respond(request, None).await
    }

    /// Like [`get_response`](Self::get_response), but gives up with
    /// [`CacheError::Cancelled`] if `cancel` fires during the remote call.
    pub async fn get_response_with_cancel(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        self.respond(request, Some(cancel)).await
    }

    /// Ask the remote twice, bypassing the cache, and report whether both
    /// answers match. A `false` means caching this configuration changes results.
    pub async fn check_determinism(&self, request: &ChatRequest) -> Result<bool> {
        let first = self.call_remote(request, None).await?;
        let second = self.call_remote(request, None).await?;
        Ok(first == second)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        self.ask(|reply| StoreCommand::Stats { reply }).await
    }

    /// Destroy the cache file, and its directory if nothing else is in it.
    pub async fn clear(&self) -> Result<()> {
        self.ask(|reply| StoreCommand::Clear { reply }).await
    }

    async fn respond(
        &self,
        request: &ChatRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Completion> {
        REQUEST_TOTAL.inc();

        if !self.config.enabled {
            let content = self.call_remote(request, cancel).await?;
            return Ok(Completion {
                content,
                cached: false,
            });
        }

        let key = fingerprint(request)?;

        let hit = self
            .ask(|reply| StoreCommand::Lookup {
                key: key.clone(),
                reply,
            })
            .await?;
        if let Some(content) = hit {
            return Ok(Completion {
                content,
                cached: true,
            });
        }

        // nothing is written unless the call succeeds
        let content = self.call_remote(request, cancel).await?;

        let evicted = self
            .ask(|reply| StoreCommand::Insert {
                key,
                payload: content.clone(),
                limit: self.config.size_limit,
                reply,
            })
            .await?;
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "Evicted entries to stay under size limit");
        }

        Ok(Completion {
            content,
            cached: false,
        })
    }

    async fn call_remote(
        &self,
        request: &ChatRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<String> {
        let start_time = Instant::now();

        let call = async {
            match self.config.request_timeout {
                Some(limit) => tokio::time::timeout(limit, self.remote.call(request))
                    .await
                    .map_err(|_| CacheError::Timeout(limit))
                    .and_then(|result| result.map_err(CacheError::from)),
                None => self.remote.call(request).await.map_err(CacheError::from),
            }
        };

        let result = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(CacheError::Cancelled),
                result = call => result,
            },
            None => call.await,
        };

        REMOTE_LATENCY.observe(start_time.elapsed().as_secs_f64());
        if let Err(e) = &result {
            REMOTE_ERRORS.inc();
            tracing::warn!(model = %request.model, "Remote call failed: {}", e);
        }
        result
    }

    async fn ask<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> StoreCommand,
    ) -> Result<T> {
        let (reply, response_rx) = oneshot::channel();
        self.store_tx
            .send(command(reply))
            .await
            .map_err(|_| CacheError::WorkerUnavailable)?;
        response_rx
            .await
            .map_err(|_| CacheError::WorkerUnavailable)?
    }
}

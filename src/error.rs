use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CacheError>;

// Everything the cache layer can fail with
#[derive(Debug, Error)]
pub enum CacheError {
    /// The request could not be encoded canonically. Never retried.
    #[error("request serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The cache file exists but is not a valid store. Only `clear()` recovers from this.
    #[error("corrupt cache file {}: {source}", path.display())]
    CorruptPersistedState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache I/O error on {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("remote call cancelled")]
    Cancelled,

    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("cache store worker is not running")]
    WorkerUnavailable,
}

// Errors produced by a remote capability, passed through untouched
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid remote response: {0}")]
    InvalidResponse(String),
}

impl CacheError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Persistence {
            path: path.into(),
            source,
        }
    }
}

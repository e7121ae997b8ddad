//! Deterministic, size-bounded response cache for chat completions.
//!
//! Requests are fingerprinted with SHA-256 over a canonical JSON form and
//! stored in a single JSON file. When the cached payload grows past the
//! configured byte limit, the least recently used entries are evicted.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod eviction;
pub mod fetcher;
pub mod metrics;
pub mod models;
pub mod store;
pub mod worker;

pub use cache::{CacheEntry, Fingerprint, canonical_bytes, fingerprint};
pub use client::{OllamaClient, RemoteCall};
pub use config::{Args, CacheConfig};
pub use error::{CacheError, RemoteError, Result};
pub use eviction::evict;
pub use fetcher::{CachingClient, Completion};
pub use models::{ChatMessage, ChatRequest};
pub use store::{CacheStore, FileStore};
pub use worker::CacheStats;

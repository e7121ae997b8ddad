use lazy_static::lazy_static;
use prometheus::{
    Counter, Encoder, Gauge, Histogram, TextEncoder, register_counter, register_gauge,
    register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("completion_requests_total", "Total number of requests").unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("completion_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("completion_cache_misses_total", "Total cache misses").unwrap();
    pub static ref CACHE_EVICTIONS: Counter =
        register_counter!("completion_cache_evictions_total", "Total entries evicted").unwrap();
    pub static ref REMOTE_ERRORS: Counter =
        register_counter!("completion_remote_errors_total", "Failed or aborted remote calls").unwrap();
    pub static ref REMOTE_LATENCY: Histogram = register_histogram!(
        "completion_remote_latency_seconds",
        "Remote call latency in seconds"
    )
    .unwrap();
    pub static ref CACHE_BYTES: Gauge =
        register_gauge!("completion_cache_bytes", "Total payload bytes currently cached").unwrap();
}

// Prometheus text exposition of everything registered
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

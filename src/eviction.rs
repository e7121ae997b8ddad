use crate::cache::Fingerprint;
use crate::store::CacheStore;

/// Evict least recently used entries until the store fits in `limit` bytes.
///
/// Entries go oldest `last_accessed` first, ties broken by key. The newest
/// entry gets no protection, but a single remaining entry is kept even when
/// it alone is over the limit. Returns the evicted keys in eviction order.
pub fn evict(store: &mut CacheStore, limit: u64) -> Vec<Fingerprint> {
    let mut size = store.total_size();
    if size <= limit {
        return Vec::new();
    }

    let mut ranked: Vec<_> = store
        .entries()
        .map(|(key, entry)| (entry.last_accessed, key.clone()))
        .collect();
    ranked.sort();

    let mut evicted = Vec::new();
    for (_, key) in ranked {
        if size <= limit || store.len() <= 1 {
            break;
        }
        if let Some(entry) = store.remove(&key) {
            size -= entry.size();
            tracing::debug!(key = %key.short(), bytes = entry.size(), "Evicting LRU cache entry");
            evicted.push(key);
        }
    }
    evicted
}

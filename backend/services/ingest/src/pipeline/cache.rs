use std::hash::Hash;
use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::Expiry;

#[derive(Clone)]
struct Entry<V> {
    value: V,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with. Overwrites restart
/// the clock.
struct PerEntryTtl;

impl<K, V> Expiry<K, Entry<V>> for PerEntryTtl {
    fn expire_after_create(&self, _key: &K, entry: &Entry<V>, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &K,
        entry: &Entry<V>,
        _updated_at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-memory TTL cache for enrichment lookups.
///
/// Read-through is the caller's job: `get`, and on a miss fetch and `set`.
/// An expired entry reads as a miss; moka evicts it during housekeeping.
/// Misses are never cached.
pub struct EnrichmentCache<K, V> {
    cache: Cache<K, Entry<V>>,
    default_ttl: Duration,
}

impl<K, V> EnrichmentCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(default_ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache, default_ttl }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.cache.get(key).await.map(|entry| entry.value)
    }

    pub async fn set(&self, key: K, value: V, ttl: Duration) {
        self.cache.insert(key, Entry { value, ttl }).await;
    }

    /// `set` with the cache's default TTL.
    pub async fn insert(&self, key: K, value: V) {
        self.set(key, value, self.default_ttl).await;
    }

    /// Live entries after pending evictions have run.
    #[cfg(test)]
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

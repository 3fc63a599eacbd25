//! In-memory cache backend (default, thread-safe, async).
//!
//! Uses DashMap for concurrent access with per-key sharding.

use super::{CacheBackend, CacheRecord};
use crate::error::Result;
use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe async in-memory cache backend.
///
/// Clones share the same map. Records are kept verbatim; stale records stay
/// until the cache reads them and purges them.
///
/// # Example
///
/// ```no_run
/// use flight_cache::backend::{CacheBackend, CacheRecord, InMemoryBackend};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = InMemoryBackend::new();
///
///     backend.set("key1", CacheRecord::new(b"value".to_vec())).await?;
///     let record = backend.get("key1").await?;
///     assert!(record.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, CacheRecord>>,
}

impl InMemoryBackend {
    /// Create a new in-memory cache backend.
    pub fn new() -> Self {
        InMemoryBackend {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Get the current number of records, stale ones included.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Whether a record is physically present under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    /// Get memory statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            total_entries: self.store.len(),
            ..CacheStats::default()
        };
        for record in self.store.iter() {
            stats.total_bytes += record.value.len();
            if record.is_sliding() {
                stats.sliding_entries += 1;
            }
        }
        stats
    }

    /// Print cache statistics to debug log.
    pub fn log_stats(&self) {
        let stats = self.stats();
        debug!(
            "Cache Stats: {} entries ({} sliding), {} bytes",
            stats.total_entries, stats.sliding_entries, stats.total_bytes
        );
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>> {
        let record = self.store.get(key).map(|entry| entry.value().clone());
        debug!(
            "✓ InMemory GET {} -> {}",
            key,
            if record.is_some() { "HIT" } else { "MISS" }
        );
        Ok(record)
    }

    async fn set(&self, key: &str, record: CacheRecord) -> Result<()> {
        match record.expires_at {
            Some(at) => debug!("✓ InMemory SET {} (expires: {})", key, at),
            None => debug!("✓ InMemory SET {}", key),
        }
        self.store.insert(key.to_string(), record);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(key);
        debug!("✓ InMemory DELETE {}", key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.store.contains_key(key))
    }

    async fn clear_all(&self) -> Result<()> {
        self.log_stats();
        self.store.clear();
        warn!("⚠ InMemory CLEAR_ALL executed - all cache cleared!");
        Ok(())
    }
}

/// Cache statistics.
#[derive(Clone, Debug, Default)]
pub struct CacheStats {
    pub total_entries: usize,
    pub sliding_entries: usize,
    pub total_bytes: usize,
}

//! Metrics hooks for cache operations.
//!
//! Implement [`CacheMetrics`] to feed your monitoring system:
//!
//! ```ignore
//! use flight_cache::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_load(&self, _key: &str, duration: Duration) {
//!         // histogram!("cache_load_seconds").record(duration);
//!     }
//! }
//!
//! let cache = SingleFlightCache::new(backend).with_metrics(Box::new(PrometheusMetrics));
//! ```
//!
//! Methods left unimplemented log through the `log` crate. The cache uses
//! [`NoOpMetrics`] unless told otherwise.
//!
//! | Hook | Fired when |
//! |------|------------|
//! | `record_hit` | a fresh value was read without taking the key lock |
//! | `record_miss` | the fast path found nothing usable |
//! | `record_coalesced` | a waiter found the value another caller had just loaded |
//! | `record_load` | the loader ran (success or not) |
//! | `record_error` | an operation returned an error |

use std::time::Duration;

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    fn record_coalesced(&self, key: &str) {
        debug!("Cache COALESCED: {}", key);
    }

    fn record_load(&self, key: &str, duration: Duration) {
        debug!("Cache LOAD: {} took {:?}", key, duration);
    }

    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_coalesced(&self, _key: &str) {}
    fn record_load(&self, _key: &str, _duration: Duration) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

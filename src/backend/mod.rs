//! Cache backend implementations.
//!
//! A backend stores [`CacheRecord`]s by key and nothing more. Expiry is
//! evaluated lazily by the cache when a record is read, so backends keep
//! records verbatim.

use crate::clock::add_saturating;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod inmemory;
pub mod null;
#[cfg(feature = "redis")]
pub mod redis;

pub use inmemory::InMemoryBackend;
pub use null::NullBackend;
#[cfg(feature = "redis")]
pub use redis::{PoolStats, RedisBackend, RedisConfig};

/// One stored value with its expiration settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Encoded value (see `crate::serialization`)
    pub value: Vec<u8>,
    /// Absolute deadline; the record is stale once `now >= expires_at`
    pub expires_at: Option<DateTime<Utc>>,
    /// Sliding window; `expires_at` moves to `now + sliding` on every fresh
    /// read or write
    pub sliding: Option<Duration>,
}

impl CacheRecord {
    /// Record without expiration.
    pub fn new(value: Vec<u8>) -> Self {
        CacheRecord {
            value,
            expires_at: None,
            sliding: None,
        }
    }

    /// Build a record as written at `now`.
    ///
    /// A sliding window takes precedence over `expires_at`.
    pub fn written_at(
        value: Vec<u8>,
        expires_at: Option<DateTime<Utc>>,
        sliding: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = match sliding {
            Some(window) => Some(add_saturating(now, window)),
            None => expires_at,
        };
        CacheRecord {
            value,
            expires_at,
            sliding,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub fn is_sliding(&self) -> bool {
        self.sliding.is_some()
    }

    /// Move a sliding record's deadline to `now + sliding`.
    pub fn slide(&mut self, now: DateTime<Utc>) {
        if let Some(window) = self.sliding {
            self.expires_at = Some(add_saturating(now, window));
        }
    }
}

/// Trait for cache backend implementations.
///
/// All methods take `&self`; implementations use interior mutability or
/// external storage and must be safe under concurrent access.
#[allow(async_fn_in_trait)]
pub trait CacheBackend: Send + Sync + Clone {
    /// Retrieve the record stored under `key`.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs (connection lost, etc.)
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>>;

    /// Store `record` under `key`, replacing any previous record.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn set(&self, key: &str, record: CacheRecord) -> Result<()>;

    /// Remove the record under `key`.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every record.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn clear_all(&self) -> Result<()>;

    /// Check if a record exists, regardless of its expiry.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Health check - verify backend is accessible.
    ///
    /// # Errors
    /// Returns `Err` if backend is not accessible
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

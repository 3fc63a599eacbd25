//! Backend that stores nothing.

use super::{CacheBackend, CacheRecord};
use crate::error::Result;

/// A backend on which every read misses and every write is discarded.
///
/// Plugging it into a cache turns caching off while keeping single-flight
/// coalescing of concurrent loads.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        NullBackend
    }
}

impl CacheBackend for NullBackend {
    async fn get(&self, _key: &str) -> Result<Option<CacheRecord>> {
        Ok(None)
    }

    async fn set(&self, key: &str, _record: CacheRecord) -> Result<()> {
        trace!("Null SET {} discarded", key);
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        Ok(())
    }
}

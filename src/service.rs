//! High-level cache service for applications.
//!
//! Provides a convenient wrapper around [`SingleFlightCache`] with Arc for
//! easy sharing, plus the by-type surface keyed through [`CacheKeyBuilder`].

use crate::backend::CacheBackend;
use crate::cache::SingleFlightCache;
use crate::entity::CacheEntity;
use crate::error::Result;
use crate::key::CacheKeyBuilder;
use crate::policy::DurationPolicy;
use crate::settings::{DefaultSettings, SettingsProvider};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shareable handle to a [`SingleFlightCache`].
///
/// Cloning is an `Arc` increment; every clone coalesces through the same
/// lock registry.
///
/// # Example
///
/// ```no_run
/// use flight_cache::{CacheEntity, CacheService, DurationPolicy};
/// use flight_cache::backend::InMemoryBackend;
/// use flight_cache::settings::CacheExpiration;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// impl CacheEntity for User {
///     fn cache_prefix() -> &'static str {
///         "User"
///     }
/// }
///
/// # async fn example() -> flight_cache::Result<()> {
/// let cache = CacheService::new(InMemoryBackend::new());
///
/// // Stored under "User_7"
/// let user = cache
///     .get_or_set_by_type(
///         7,
///         || async { Ok(Some(User { id: 7, name: "Ada".into() })) },
///         CacheExpiration::Short.into(),
///     )
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct CacheService<B: CacheBackend, S: SettingsProvider = DefaultSettings> {
    cache: Arc<SingleFlightCache<B, S>>,
}

impl<B: CacheBackend> CacheService<B, DefaultSettings> {
    /// Create a new cache service with the given backend.
    pub fn new(backend: B) -> Self {
        Self::from_cache(SingleFlightCache::new(backend))
    }
}

impl<B: CacheBackend, S: SettingsProvider> CacheService<B, S> {
    /// Wrap an already configured cache.
    pub fn from_cache(cache: SingleFlightCache<B, S>) -> Self {
        CacheService {
            cache: Arc::new(cache),
        }
    }

    /// Get a reference to the underlying cache.
    pub fn cache(&self) -> &SingleFlightCache<B, S> {
        &self.cache
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.cache.get(key).await
    }

    /// See [`SingleFlightCache::get_or_set`].
    ///
    /// # Errors
    ///
    /// Same as [`SingleFlightCache::get_or_set`].
    pub async fn get_or_set<T, F, Fut>(
        &self,
        key: &str,
        loader: F,
        policy: DurationPolicy<T>,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        self.cache.get_or_set(key, loader, policy).await
    }

    pub async fn get_or_set_with_cancel<T, F, Fut>(
        &self,
        key: &str,
        loader: F,
        policy: DurationPolicy<T>,
        cancel: &CancellationToken,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        self.cache
            .get_or_set_with_cancel(key, loader, policy, cancel)
            .await
    }

    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        policy: DurationPolicy<T>,
    ) -> Result<()> {
        self.cache.set(key, value, policy).await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.cache.remove(key).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.cache.clear().await
    }

    pub fn dispose(&self) {
        self.cache.dispose();
    }

    /// Read the `T` stored under `id`.
    pub async fn get_by_type<T: CacheEntity>(&self, id: impl Display) -> Result<Option<T>> {
        self.cache.get(&CacheKeyBuilder::by_type::<T>(&id)).await
    }

    /// Coalesced get-or-populate of the `T` stored under `id`.
    ///
    /// # Errors
    ///
    /// Same as [`SingleFlightCache::get_or_set`].
    pub async fn get_or_set_by_type<T, F, Fut>(
        &self,
        id: impl Display,
        loader: F,
        policy: DurationPolicy<T>,
    ) -> Result<Option<T>>
    where
        T: CacheEntity,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let key = CacheKeyBuilder::by_type::<T>(&id);
        self.cache.get_or_set(&key, loader, policy).await
    }

    pub async fn set_by_type<T: CacheEntity>(
        &self,
        id: impl Display,
        value: &T,
        policy: DurationPolicy<T>,
    ) -> Result<()> {
        let key = CacheKeyBuilder::by_type::<T>(&id);
        self.cache.set(&key, value, policy).await
    }

    pub async fn remove_by_type<T: CacheEntity>(&self, id: impl Display) -> Result<()> {
        self.cache.remove(&CacheKeyBuilder::by_type::<T>(&id)).await
    }
}

impl<B: CacheBackend, S: SettingsProvider> Clone for CacheService<B, S> {
    fn clone(&self) -> Self {
        CacheService {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<B: CacheBackend, S: SettingsProvider> From<SingleFlightCache<B, S>> for CacheService<B, S> {
    fn from(cache: SingleFlightCache<B, S>) -> Self {
        Self::from_cache(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use serde::Deserialize;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct TestEntity {
        id: u32,
        value: String,
    }

    impl CacheEntity for TestEntity {
        fn cache_prefix() -> &'static str {
            "TestEntity"
        }
    }

    fn entity(id: u32) -> TestEntity {
        TestEntity {
            id,
            value: format!("value_{}", id),
        }
    }

    #[test]
    fn test_cache_service_clone() {
        let service1 = CacheService::new(InMemoryBackend::new());
        let service2 = service1.clone();

        assert!(Arc::ptr_eq(&service1.cache, &service2.cache));
    }

    #[tokio::test]
    async fn test_by_type_uses_prefixed_key() {
        let service = CacheService::new(InMemoryBackend::new());

        service
            .set_by_type(1, &entity(1), DurationPolicy::None)
            .await
            .expect("Failed to set");

        assert!(service.cache().backend().contains_key("TestEntity_1"));
        let by_key: Option<TestEntity> = service.get("TestEntity_1").await.expect("Failed to get");
        assert_eq!(by_key, Some(entity(1)));

        let by_type = service
            .get_by_type::<TestEntity>(1)
            .await
            .expect("Failed to get");
        assert_eq!(by_type, Some(entity(1)));

        service
            .remove_by_type::<TestEntity>(1)
            .await
            .expect("Failed to remove");
        assert!(service.cache().backend().is_empty());
    }

    #[tokio::test]
    async fn test_get_or_set_by_type() {
        let service = CacheService::new(InMemoryBackend::new());

        let loaded = service
            .get_or_set_by_type(2, || async { Ok(Some(entity(2))) }, DurationPolicy::None)
            .await
            .expect("Failed to get_or_set");
        assert_eq!(loaded, Some(entity(2)));

        let cached = service
            .get_or_set_by_type(2, || async { Ok(Some(entity(99))) }, DurationPolicy::None)
            .await
            .expect("Failed to get_or_set");
        assert_eq!(cached, Some(entity(2)));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let service = CacheService::new(InMemoryBackend::new());
        let other = service.clone();

        service
            .set("shared", &5u8, DurationPolicy::None)
            .await
            .expect("Failed to set");
        let value: Option<u8> = other.get("shared").await.expect("Failed to get");
        assert_eq!(value, Some(5));

        other.clear().await.expect("Failed to clear");
        let value: Option<u8> = service.get("shared").await.expect("Failed to get");
        assert_eq!(value, None);
    }
}

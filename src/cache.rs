//! Single-flight cache - coalesced get-or-populate over a backend.
//!
//! Reads are lock-free. Only a miss takes the per-key lock from the
//! [`LockRegistry`], re-reads under it, and runs the loader if the value is
//! still absent. Concurrent callers for the same key queue on that lock and
//! pick up the freshly written value instead of loading it again.

use crate::backend::{CacheBackend, CacheRecord};
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::lock::LockRegistry;
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::policy::DurationPolicy;
use crate::serialization::{deserialize_from_cache, serialize_for_cache};
use crate::settings::{DefaultSettings, SettingsProvider};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// What to do with a stored value that cannot be read as the requested type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TypeMismatchPolicy {
    /// Log a warning and treat the key as missing
    #[default]
    Miss,
    /// Fail with `Error::TypeMismatch`
    Error,
}

/// Behavioural options for [`SingleFlightCache`].
#[derive(Clone, Debug, Default)]
pub struct CacheOptions {
    pub type_mismatch: TypeMismatchPolicy,
}

impl CacheOptions {
    pub fn with_type_mismatch(mut self, policy: TypeMismatchPolicy) -> Self {
        self.type_mismatch = policy;
        self
    }
}

/// Outcome of one read against the backend.
enum Lookup<T> {
    Fresh(T),
    Expired,
    Missing,
}

/// Cache that populates each missing key at most once at a time.
///
/// # Example
///
/// ```no_run
/// use flight_cache::{DurationPolicy, SingleFlightCache};
/// use flight_cache::backend::InMemoryBackend;
/// use std::time::Duration;
///
/// # async fn example() -> flight_cache::Result<()> {
/// let cache = SingleFlightCache::new(InMemoryBackend::new());
///
/// let answer = cache
///     .get_or_set(
///         "answer",
///         || async { Ok(Some(42u32)) },
///         DurationPolicy::Sliding(Duration::from_secs(60)),
///     )
///     .await?;
/// assert_eq!(answer, Some(42));
/// # Ok(())
/// # }
/// ```
pub struct SingleFlightCache<B: CacheBackend, S: SettingsProvider = DefaultSettings> {
    backend: B,
    settings: S,
    clock: Arc<dyn Clock>,
    registry: LockRegistry,
    metrics: Box<dyn CacheMetrics>,
    options: CacheOptions,
}

impl<B: CacheBackend> SingleFlightCache<B, DefaultSettings> {
    /// Create a cache with intrinsic tier lengths and its own lock registry.
    pub fn new(backend: B) -> Self {
        Self::with_settings(backend, DefaultSettings)
    }
}

impl<B: CacheBackend, S: SettingsProvider> SingleFlightCache<B, S> {
    /// Create a cache resolving duration tiers through `settings`.
    pub fn with_settings(backend: B, settings: S) -> Self {
        SingleFlightCache {
            backend,
            settings,
            clock: Arc::new(SystemClock),
            registry: LockRegistry::new(),
            metrics: Box::new(NoOpMetrics),
            options: CacheOptions::default(),
        }
    }

    /// Use `registry` for key locks, e.g. one shared with other caches.
    pub fn with_registry(mut self, registry: LockRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    /// Read the value under `key`.
    ///
    /// A sliding record has its deadline pushed forward. An expired record is
    /// purged and reported as missing.
    ///
    /// # Errors
    ///
    /// - `Error::BackendError`: backend failure
    /// - `Error::TypeMismatch`: undecodable value under `TypeMismatchPolicy::Error`
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let timer = Instant::now();
        let result = self.get_inner(key).await;
        match &result {
            Ok(Some(_)) => self.metrics.record_hit(key, timer.elapsed()),
            Ok(None) => self.metrics.record_miss(key, timer.elapsed()),
            Err(e) => self.metrics.record_error(key, &e.to_string()),
        }
        result
    }

    async fn get_inner<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read(key).await? {
            Lookup::Fresh(value) => return Ok(Some(value)),
            Lookup::Missing => return Ok(None),
            Lookup::Expired => {}
        }

        // Purge under the key lock so a concurrent populator's value is
        // never deleted.
        let _token = match self.registry.acquire(key).await {
            Ok(token) => token,
            Err(Error::RegistryDisposed) => return Ok(None),
            Err(e) => return Err(e),
        };
        self.read_locked(key).await
    }

    /// Return the cached value, or load, cache and return it.
    ///
    /// Among concurrent callers for an uncached key exactly one runs
    /// `loader`; the others wait on the key lock and receive the value it
    /// produced. A loader result of `None` is returned but not cached.
    ///
    /// # Errors
    ///
    /// - the loader's own error, unchanged and not cached
    /// - `Error::BackendError`: backend failure
    /// - `Error::RegistryDisposed`: the lock registry was disposed
    /// - `Error::TypeMismatch`: undecodable value under `TypeMismatchPolicy::Error`
    /// - `Error::SerializationError`: the loaded value could not be encoded
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
        self.get_or_set_inner(key, loader, policy, None).await
    }

    /// [`get_or_set`](Self::get_or_set) that stops waiting for the key lock
    /// once `cancel` fires.
    ///
    /// Cancellation is only observed while queued behind another caller.
    ///
    /// # Errors
    ///
    /// Same as `get_or_set`, plus `Error::AcquisitionCanceled`.
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
        self.get_or_set_inner(key, loader, policy, Some(cancel))
            .await
    }

    async fn get_or_set_inner<T, F, Fut>(
        &self,
        key: &str,
        loader: F,
        policy: DurationPolicy<T>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let result = self.populate(key, loader, policy, cancel).await;
        if let Err(e) = &result {
            self.metrics.record_error(key, &e.to_string());
        }
        result
    }

    async fn populate<T, F, Fut>(
        &self,
        key: &str,
        loader: F,
        policy: DurationPolicy<T>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let timer = Instant::now();
        if let Lookup::Fresh(value) = self.read(key).await? {
            self.metrics.record_hit(key, timer.elapsed());
            return Ok(Some(value));
        }
        self.metrics.record_miss(key, timer.elapsed());

        // Held until return; dropping it hands the key to the next waiter.
        let _token = match cancel {
            Some(cancel) => self.registry.acquire_with_cancel(key, cancel).await?,
            None => self.registry.acquire(key).await?,
        };

        if let Some(value) = self.read_locked(key).await? {
            self.metrics.record_coalesced(key);
            return Ok(Some(value));
        }

        let started = Instant::now();
        let loaded = loader().await;
        self.metrics.record_load(key, started.elapsed());

        match loaded? {
            Some(value) => {
                self.write(key, &value, &policy).await?;
                debug!("✓ Loaded and cached {}", key);
                Ok(Some(value))
            }
            None => {
                debug!("Loader returned nothing for {}, not caching", key);
                Ok(None)
            }
        }
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// - `Error::SerializationError`: the value could not be encoded
    /// - `Error::BackendError`: backend failure
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        policy: DurationPolicy<T>,
    ) -> Result<()> {
        let result = self.write(key, value, &policy).await;
        if let Err(e) = &result {
            self.metrics.record_error(key, &e.to_string());
        }
        result
    }

    /// Delete the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the backend fails.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.backend.delete(key).await
    }

    /// Delete every value in the backend.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the backend fails.
    pub async fn clear(&self) -> Result<()> {
        self.backend.clear_all().await
    }

    /// Dispose the lock registry.
    ///
    /// Waiting and future populations fail with `Error::RegistryDisposed`;
    /// fresh values can still be read.
    pub fn dispose(&self) {
        self.registry.dispose();
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &LockRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Read and decode without purging.
    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Lookup<T>> {
        // Backends that store encoded records decode them in `get`.
        let mut record = match self.backend.get(key).await {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(Lookup::Missing),
            Err(e) if e.is_codec() => return self.type_mismatch(key, e).map(|_| Lookup::Missing),
            Err(e) => return Err(e),
        };

        let now = self.clock.now();
        if record.is_expired(now) {
            return Ok(Lookup::Expired);
        }

        let value = match deserialize_from_cache::<T>(&record.value) {
            Ok(value) => value,
            Err(e) if e.is_codec() => return self.type_mismatch(key, e).map(|_| Lookup::Missing),
            Err(e) => return Err(e),
        };

        if record.is_sliding() {
            record.slide(now);
            self.backend.set(key, record).await?;
            trace!("Slid {} forward", key);
        }
        Ok(Lookup::Fresh(value))
    }

    /// Read while holding the key lock, purging an expired record.
    async fn read_locked<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read(key).await? {
            Lookup::Fresh(value) => Ok(Some(value)),
            Lookup::Missing => Ok(None),
            Lookup::Expired => {
                self.backend.delete(key).await?;
                debug!("✗ {} expired, purged", key);
                Ok(None)
            }
        }
    }

    fn type_mismatch(&self, key: &str, cause: Error) -> Result<()> {
        match self.options.type_mismatch {
            TypeMismatchPolicy::Miss => {
                warn!(
                    "⚠ Value under {} does not decode as the requested type, treating as miss: {}",
                    key, cause
                );
                Ok(())
            }
            TypeMismatchPolicy::Error => Err(Error::TypeMismatch {
                key: key.to_string(),
                reason: cause.to_string(),
            }),
        }
    }

    async fn write<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        policy: &DurationPolicy<T>,
    ) -> Result<()> {
        let bytes = serialize_for_cache(value)?;
        let now = self.clock.now();
        let expiry = policy.resolve(value, &self.settings, now);
        let record = CacheRecord::written_at(bytes, expiry.expires_at, expiry.sliding, now);
        self.backend.set(key, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn cache_with_clock() -> (SingleFlightCache<InMemoryBackend>, ManualClock) {
        let clock = ManualClock::new();
        let cache =
            SingleFlightCache::new(InMemoryBackend::new()).with_clock(Arc::new(clock.clone()));
        (cache, clock)
    }

    #[tokio::test]
    async fn test_get_or_set_loads_once_then_hits() {
        let cache = SingleFlightCache::new(InMemoryBackend::new());
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_set(
                    "k",
                    || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(Some("v".to_string()))
                    },
                    DurationPolicy::None,
                )
                .await
                .expect("Failed to get_or_set");
            assert_eq!(value.as_deref(), Some("v"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.registry().active_keys(), 0);
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let cache = SingleFlightCache::new(InMemoryBackend::new());

        cache
            .set("k", &vec![1u8, 2, 3], DurationPolicy::None)
            .await
            .expect("Failed to set");
        let value: Option<Vec<u8>> = cache.get("k").await.expect("Failed to get");
        assert_eq!(value, Some(vec![1, 2, 3]));

        cache.remove("k").await.expect("Failed to remove");
        let value: Option<Vec<u8>> = cache.get("k").await.expect("Failed to get");
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_expired_get_purges() {
        let (cache, clock) = cache_with_clock();
        let at = crate::clock::add_saturating(clock.now(), Duration::from_secs(1));

        cache
            .set("k", &1u32, DurationPolicy::At(at))
            .await
            .expect("Failed to set");

        clock.advance(Duration::from_secs(1));
        let value: Option<u32> = cache.get("k").await.expect("Failed to get");
        assert_eq!(value, None);
        assert!(!cache.backend().contains_key("k"));
        assert_eq!(cache.registry().active_keys(), 0);
    }

    #[tokio::test]
    async fn test_expired_value_is_reloaded() {
        let (cache, clock) = cache_with_clock();
        let policy = DurationPolicy::Sliding(Duration::from_secs(10));

        let first = cache
            .get_or_set("k", || async { Ok(Some(1u32)) }, policy.clone())
            .await
            .expect("Failed to get_or_set");
        clock.advance(Duration::from_secs(10));
        let second = cache
            .get_or_set("k", || async { Ok(Some(2u32)) }, policy)
            .await
            .expect("Failed to get_or_set");

        assert_eq!(first, Some(1));
        assert_eq!(second, Some(2));
    }

    #[tokio::test]
    async fn test_loader_error_is_propagated() {
        let cache = SingleFlightCache::new(InMemoryBackend::new());

        let result = cache
            .get_or_set::<u32, _, _>(
                "k",
                || async { Err(Error::RepositoryError("db down".to_string())) },
                DurationPolicy::None,
            )
            .await;

        assert_eq!(result, Err(Error::RepositoryError("db down".to_string())));
        assert!(cache.backend().is_empty());
        assert!(!cache.registry().is_held("k"));
    }

    #[tokio::test]
    async fn test_type_mismatch_policies() {
        let backend = InMemoryBackend::new();
        let lenient = SingleFlightCache::new(backend.clone());
        let strict = SingleFlightCache::new(backend).with_options(
            CacheOptions::default().with_type_mismatch(TypeMismatchPolicy::Error),
        );

        lenient
            .set("k", &"text".to_string(), DurationPolicy::None)
            .await
            .expect("Failed to set");

        let value: Option<bool> = lenient.get("k").await.expect("Failed to get");
        assert_eq!(value, None);

        let result: Result<Option<bool>> = strict.get("k").await;
        assert!(matches!(result, Err(Error::TypeMismatch { ref key, .. }) if key == "k"));
    }

    #[tokio::test]
    async fn test_disposed_cache_still_serves_hits() {
        let cache = SingleFlightCache::new(InMemoryBackend::new());
        cache
            .set("hit", &1u32, DurationPolicy::None)
            .await
            .expect("Failed to set");
        cache.dispose();

        let hit = cache
            .get_or_set("hit", || async { Ok(Some(2u32)) }, DurationPolicy::None)
            .await;
        assert_eq!(hit, Ok(Some(1)));

        let miss = cache
            .get_or_set("miss", || async { Ok(Some(2u32)) }, DurationPolicy::None)
            .await;
        assert_eq!(miss, Err(Error::RegistryDisposed));
    }

    #[derive(Default)]
    struct CountingMetrics {
        hits: AtomicUsize,
        misses: AtomicUsize,
        loads: AtomicUsize,
        errors: AtomicUsize,
    }

    impl CacheMetrics for Arc<CountingMetrics> {
        fn record_hit(&self, _key: &str, _duration: Duration) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }

        fn record_miss(&self, _key: &str, _duration: Duration) {
            self.misses.fetch_add(1, Ordering::SeqCst);
        }

        fn record_load(&self, _key: &str, _duration: Duration) {
            self.loads.fetch_add(1, Ordering::SeqCst);
        }

        fn record_error(&self, _key: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_metrics_hooks_fire() {
        let metrics = Arc::new(CountingMetrics::default());
        let cache = SingleFlightCache::new(InMemoryBackend::new())
            .with_metrics(Box::new(metrics.clone()));

        for _ in 0..2 {
            cache
                .get_or_set("k", || async { Ok(Some(1u32)) }, DurationPolicy::None)
                .await
                .expect("Failed to get_or_set");
        }
        let failed = cache
            .get_or_set::<u32, _, _>(
                "bad",
                || async { Err(Error::from("boom")) },
                DurationPolicy::None,
            )
            .await;
        assert!(failed.is_err());

        assert_eq!(metrics.hits.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.misses.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.loads.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.errors.load(Ordering::SeqCst), 1);
    }
}

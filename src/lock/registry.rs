//! Keyed asynchronous mutual exclusion with pooled primitive reuse.

use super::pool::{LockPrimitive, ReusePool, DEFAULT_MAX_IDLE};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

/// Per-key lock state.
///
/// The primitive's single permit is the exclusive slot and its wait list is
/// the FIFO waiter queue. `ref_count` counts the holder plus every queued
/// waiter; the entry lives in the map exactly while it is non-zero.
#[derive(Debug)]
struct LockEntry {
    primitive: Arc<LockPrimitive>,
    ref_count: usize,
}

#[derive(Debug)]
struct RegistryState {
    entries: HashMap<String, LockEntry>,
    pool: ReusePool,
    disposed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<RegistryState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Critical sections never run user code; a poisoned guard still holds
        // consistent bookkeeping.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a new acquirer for `key` and try to grant it on the spot.
    fn register(&self, key: &str) -> Result<(Arc<LockPrimitive>, Option<OwnedSemaphorePermit>)> {
        let mut guard = self.lock();
        if guard.disposed {
            return Err(Error::RegistryDisposed);
        }

        let RegistryState { entries, pool, .. } = &mut *guard;
        let entry = entries.entry(key.to_string()).or_insert_with(|| LockEntry {
            primitive: pool.take(),
            ref_count: 0,
        });
        entry.ref_count += 1;

        let permit = entry.primitive.clone().try_acquire_owned().ok();
        Ok((entry.primitive.clone(), permit))
    }

    /// Drop one reference to `key`, releasing `permit` first if one is held.
    ///
    /// Returns the permit to the next FIFO waiter, or retires the entry when
    /// nobody is left.
    fn leave(&self, key: &str, primitive: &Arc<LockPrimitive>, permit: Option<OwnedSemaphorePermit>) {
        let mut guard = self.lock();
        drop(permit);

        let RegistryState { entries, pool, .. } = &mut *guard;
        let Some(entry) = entries.get_mut(key) else {
            // Registry was disposed while this reference was outstanding.
            return;
        };
        if !Arc::ptr_eq(&entry.primitive, primitive) {
            return;
        }

        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return;
        }

        if let Some(entry) = entries.remove(key) {
            // A canceled waiter's permit may still be in flight back to the
            // semaphore; such a primitive is dropped rather than pooled.
            let idle = entry.primitive.available_permits() == 1;
            if idle && pool.retire(entry.primitive) {
                debug!("Lock {} retired to pool ({} idle)", key, pool.len());
            } else {
                debug!("Lock {} released, primitive dropped", key);
            }
        }
    }
}

/// Keyed async lock registry.
///
/// Each key in use owns an exclusive primitive for as long as anyone holds or
/// waits for it. Fully released primitives go to a FIFO [`ReusePool`] and are
/// handed to the next new key, so two keys held at the same time never share
/// a primitive.
///
/// Cloning is cheap and every clone sees the same registry.
///
/// # Example
///
/// ```
/// use flight_cache::lock::LockRegistry;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> flight_cache::Result<()> {
/// let registry = LockRegistry::new();
///
/// let mut token = registry.acquire("user_1").await?;
/// assert!(registry.is_held("user_1"));
///
/// assert!(token.release());
/// assert!(!token.release()); // second release is ignored
/// assert_eq!(registry.active_keys(), 0);
/// assert_eq!(registry.idle_primitives(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LockRegistry {
    shared: Arc<Shared>,
}

impl LockRegistry {
    /// Create a registry with the default idle-pool cap.
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE)
    }

    /// Create a registry keeping at most `max_idle` retired primitives.
    pub fn with_max_idle(max_idle: usize) -> Self {
        debug!("Lock registry created, keeping up to {} idle primitives", max_idle);
        LockRegistry {
            shared: Arc::new(Shared {
                state: Mutex::new(RegistryState {
                    entries: HashMap::new(),
                    pool: ReusePool::new(max_idle),
                    disposed: false,
                }),
            }),
        }
    }

    /// Acquire exclusive access to `key`.
    ///
    /// Completes immediately when the key is free; otherwise waits behind
    /// earlier callers in arrival order. Dropping the returned future while it
    /// waits leaves the queue without consuming a grant.
    ///
    /// # Errors
    ///
    /// `Error::RegistryDisposed` if the registry is or becomes disposed.
    pub async fn acquire(&self, key: &str) -> Result<AcquireToken> {
        self.acquire_inner(key, None).await
    }

    /// Acquire exclusive access to `key`, giving up when `cancel` fires.
    ///
    /// Cancellation is only observed while queued. A free key is granted even
    /// if `cancel` has already fired.
    ///
    /// # Errors
    ///
    /// - `Error::AcquisitionCanceled` if `cancel` fired before the grant
    /// - `Error::RegistryDisposed` if the registry is or becomes disposed
    pub async fn acquire_with_cancel(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<AcquireToken> {
        self.acquire_inner(key, Some(cancel)).await
    }

    async fn acquire_inner(
        &self,
        key: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<AcquireToken> {
        let (primitive, permit) = self.shared.register(key)?;
        let mut pending = PendingAcquire {
            shared: &self.shared,
            key,
            primitive: &primitive,
            armed: true,
        };

        let permit = match permit {
            Some(permit) => permit,
            None => {
                debug!("Lock {} contended, waiting", key);
                let acquired = match cancel {
                    Some(cancel) => {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            result = primitive.clone().acquire_owned() => Some(result),
                        }
                    }
                    None => Some(primitive.clone().acquire_owned().await),
                };
                match acquired {
                    Some(Ok(permit)) => permit,
                    Some(Err(_)) => return Err(Error::RegistryDisposed),
                    None => {
                        debug!("Lock {} wait canceled", key);
                        return Err(Error::AcquisitionCanceled(key.to_string()));
                    }
                }
            }
        };

        pending.armed = false;
        debug!("Lock {} granted", key);
        Ok(AcquireToken {
            shared: self.shared.clone(),
            key: key.to_string(),
            primitive: primitive.clone(),
            permit: Some(permit),
        })
    }

    /// Dispose the registry.
    ///
    /// Pending acquisitions fail with `Error::RegistryDisposed`, all entries
    /// and idle primitives are dropped and no key is granted afterwards.
    /// Tokens still held can be released or dropped safely.
    pub fn dispose(&self) {
        let mut guard = self.shared.lock();
        if guard.disposed {
            return;
        }
        guard.disposed = true;

        let pending = guard.entries.len();
        for entry in guard.entries.values() {
            entry.primitive.close();
        }
        guard.entries.clear();
        guard.pool.clear();

        warn!("⚠ Lock registry disposed ({} keys in use)", pending);
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    /// Outstanding acquisitions for `key`: the holder plus queued waiters.
    pub fn ref_count(&self, key: &str) -> usize {
        self.shared
            .lock()
            .entries
            .get(key)
            .map_or(0, |entry| entry.ref_count)
    }

    /// Whether some caller currently holds `key`.
    pub fn is_held(&self, key: &str) -> bool {
        self.shared
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| entry.primitive.available_permits() == 0)
    }

    /// Number of keys with a holder or waiters.
    pub fn active_keys(&self) -> usize {
        self.shared.lock().entries.len()
    }

    /// Number of retired primitives waiting for reuse.
    pub fn idle_primitives(&self) -> usize {
        self.shared.lock().pool.len()
    }

    /// Cap on retired primitives kept for reuse.
    pub fn max_idle(&self) -> usize {
        self.shared.lock().pool.max_idle()
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Undoes a registration if the acquire future ends without a grant.
struct PendingAcquire<'a> {
    shared: &'a Shared,
    key: &'a str,
    primitive: &'a Arc<LockPrimitive>,
    armed: bool,
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.leave(self.key, self.primitive, None);
        }
    }
}

/// Exclusive right to one key, obtained from [`LockRegistry::acquire`].
///
/// Released explicitly with [`release`](AcquireToken::release) or when
/// dropped, so every exit path (errors, panics, cancellation of the owning
/// future) gives the key up exactly once.
#[derive(Debug)]
pub struct AcquireToken {
    shared: Arc<Shared>,
    key: String,
    primitive: Arc<LockPrimitive>,
    permit: Option<OwnedSemaphorePermit>,
}

impl AcquireToken {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The primitive backing this key while the token is held.
    pub fn primitive(&self) -> &Arc<LockPrimitive> {
        &self.primitive
    }

    pub fn is_held(&self) -> bool {
        self.permit.is_some()
    }

    /// Release the key.
    ///
    /// Returns `false` if the token was already released; the second call
    /// changes nothing.
    pub fn release(&mut self) -> bool {
        match self.permit.take() {
            Some(permit) => {
                self.shared.leave(&self.key, &self.primitive, Some(permit));
                debug!("Lock {} released", self.key);
                true
            }
            None => {
                debug!("Lock {} already released, ignoring", self.key);
                false
            }
        }
    }
}

impl Drop for AcquireToken {
    fn drop(&mut self) {
        if self.permit.is_some() {
            self.release();
        }
    }
}

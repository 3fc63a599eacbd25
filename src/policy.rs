//! Expiration policies attached to cache writes.

use crate::clock::add_saturating;
use crate::settings::{CacheExpiration, CacheSliding, DurationTier, SettingsProvider};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Limit on chained `Computed` policies before giving up on expiry.
const MAX_COMPUTED_DEPTH: usize = 8;

/// How long a written value stays valid.
///
/// # Example
///
/// ```rust
/// use flight_cache::policy::DurationPolicy;
/// use flight_cache::settings::CacheSliding;
/// use std::time::Duration;
///
/// let _forever: DurationPolicy<u32> = DurationPolicy::None;
/// let _sliding: DurationPolicy<u32> = DurationPolicy::Sliding(Duration::from_secs(30));
/// let _tiered: DurationPolicy<u32> = CacheSliding::Short.into();
///
/// // Decided from the loaded value
/// let threshold = 100;
/// let _computed: DurationPolicy<u32> = DurationPolicy::computed(move |n| {
///     if *n > threshold {
///         DurationPolicy::Sliding(Duration::from_secs(60))
///     } else {
///         DurationPolicy::None
///     }
/// });
/// ```
pub enum DurationPolicy<T> {
    /// Never expires
    None,
    /// Expires at a fixed instant
    At(DateTime<Utc>),
    /// Expires once unread for the given window
    Sliding(Duration),
    /// Absolute expiration, `now` plus the tier length
    Expiration(CacheExpiration),
    /// Sliding expiration with the tier length as window
    SlidingTier(CacheSliding),
    /// Chosen from the value once it is known
    Computed(ComputedPolicy<T>),
}

/// Callback deciding a policy from the loaded value.
pub type ComputedPolicy<T> = Arc<dyn Fn(&T) -> DurationPolicy<T> + Send + Sync>;

/// Deadline and sliding window for a record written now.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolvedExpiry {
    pub expires_at: Option<DateTime<Utc>>,
    pub sliding: Option<Duration>,
}

impl<T> DurationPolicy<T> {
    /// Policy decided by `decide` once the value is loaded.
    pub fn computed<F>(decide: F) -> Self
    where
        F: Fn(&T) -> DurationPolicy<T> + Send + Sync + 'static,
    {
        DurationPolicy::Computed(Arc::new(decide))
    }

    /// Resolve against the value about to be written.
    pub fn resolve<S>(&self, value: &T, settings: &S, now: DateTime<Utc>) -> ResolvedExpiry
    where
        S: SettingsProvider + ?Sized,
    {
        let mut next = match self {
            DurationPolicy::Computed(decide) => decide(value),
            fixed => return fixed.resolve_fixed(settings, now),
        };
        for _ in 1..MAX_COMPUTED_DEPTH {
            next = match &next {
                DurationPolicy::Computed(decide) => decide(value),
                fixed => return fixed.resolve_fixed(settings, now),
            };
        }

        warn!(
            "⚠ Computed duration policy nested deeper than {} levels, caching without expiry",
            MAX_COMPUTED_DEPTH
        );
        ResolvedExpiry::default()
    }

    fn resolve_fixed<S>(&self, settings: &S, now: DateTime<Utc>) -> ResolvedExpiry
    where
        S: SettingsProvider + ?Sized,
    {
        match self {
            DurationPolicy::None | DurationPolicy::Computed(_) => ResolvedExpiry::default(),
            DurationPolicy::At(at) => ResolvedExpiry {
                expires_at: Some(*at),
                sliding: None,
            },
            DurationPolicy::Sliding(window) => ResolvedExpiry {
                expires_at: Some(add_saturating(now, *window)),
                sliding: Some(*window),
            },
            DurationPolicy::Expiration(tier) => ResolvedExpiry {
                expires_at: Some(add_saturating(
                    now,
                    settings.resolve(DurationTier::Expiration(*tier)),
                )),
                sliding: None,
            },
            DurationPolicy::SlidingTier(tier) => {
                let window = settings.resolve(DurationTier::Sliding(*tier));
                ResolvedExpiry {
                    expires_at: Some(add_saturating(now, window)),
                    sliding: Some(window),
                }
            }
        }
    }
}

impl<T> Default for DurationPolicy<T> {
    fn default() -> Self {
        DurationPolicy::None
    }
}

// Manual impls: derives would demand `T: Clone`/`T: Debug`.
impl<T> Clone for DurationPolicy<T> {
    fn clone(&self) -> Self {
        match self {
            DurationPolicy::None => DurationPolicy::None,
            DurationPolicy::At(at) => DurationPolicy::At(*at),
            DurationPolicy::Sliding(window) => DurationPolicy::Sliding(*window),
            DurationPolicy::Expiration(tier) => DurationPolicy::Expiration(*tier),
            DurationPolicy::SlidingTier(tier) => DurationPolicy::SlidingTier(*tier),
            DurationPolicy::Computed(decide) => DurationPolicy::Computed(Arc::clone(decide)),
        }
    }
}

impl<T> fmt::Debug for DurationPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationPolicy::None => write!(f, "None"),
            DurationPolicy::At(at) => f.debug_tuple("At").field(at).finish(),
            DurationPolicy::Sliding(window) => f.debug_tuple("Sliding").field(window).finish(),
            DurationPolicy::Expiration(tier) => f.debug_tuple("Expiration").field(tier).finish(),
            DurationPolicy::SlidingTier(tier) => f.debug_tuple("SlidingTier").field(tier).finish(),
            DurationPolicy::Computed(_) => write!(f, "Computed(..)"),
        }
    }
}

impl<T> From<DateTime<Utc>> for DurationPolicy<T> {
    fn from(at: DateTime<Utc>) -> Self {
        DurationPolicy::At(at)
    }
}

impl<T> From<CacheExpiration> for DurationPolicy<T> {
    fn from(tier: CacheExpiration) -> Self {
        DurationPolicy::Expiration(tier)
    }
}

impl<T> From<CacheSliding> for DurationPolicy<T> {
    fn from(tier: CacheSliding) -> Self {
        DurationPolicy::SlidingTier(tier)
    }
}

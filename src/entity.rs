//! Trait for types cached under a per-type key namespace.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A value type addressed through the by-type cache surface.
///
/// The prefix namespaces keys so that ids of different types never collide:
/// the key for id `42` of the type below is `"employment_42"`.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use flight_cache::CacheEntity;
///
/// #[derive(Clone, Serialize, Deserialize)]
/// pub struct Employment {
///     pub id: u64,
///     pub employer_name: String,
/// }
///
/// impl CacheEntity for Employment {
///     fn cache_prefix() -> &'static str {
///         "employment"
///     }
/// }
/// ```
pub trait CacheEntity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type identifier used as the key prefix.
    fn cache_prefix() -> &'static str;
}

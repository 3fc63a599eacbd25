//! Cache key construction.

use crate::entity::CacheEntity;
use std::fmt::Display;

/// Separator between a key prefix and the id.
pub const KEY_SEPARATOR: &str = "_";

/// Builder for cache keys.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Key for `id` in the namespace of `T`: `"{prefix}_{id}"`.
    pub fn by_type<T: CacheEntity>(id: &dyn Display) -> String {
        Self::build_with_prefix(T::cache_prefix(), id)
    }

    /// Key for `id` under an explicit prefix.
    pub fn build_with_prefix(prefix: &str, id: &dyn Display) -> String {
        format!("{}{}{}", prefix, KEY_SEPARATOR, id)
    }
}

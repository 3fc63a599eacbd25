//! Versioned value codec for stored records.
//!
//! Every cached value is wrapped in an envelope before it reaches a backend:
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (varint) │POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "SFLC"              u32                postcard::to_allocvec(T)
//! ```
//!
//! A read that fails any of the checks below is what the cache calls a type
//! mismatch: the bytes exist but cannot be interpreted as the requested type.
//!
//! ```rust
//! use flight_cache::serialization::{deserialize_from_cache, serialize_for_cache};
//!
//! # fn main() -> flight_cache::Result<()> {
//! let bytes = serialize_for_cache(&vec![1u32, 2, 3])?;
//! let back: Vec<u32> = deserialize_from_cache(&bytes)?;
//! assert_eq!(back, vec![1, 2, 3]);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Magic header identifying values written by this crate.
pub const CACHE_MAGIC: [u8; 4] = *b"SFLC";

/// Current schema version.
///
/// Bump when stored shapes change incompatibly; older records then read as
/// type mismatches and get repopulated.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Envelope wrapped around every stored value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    pub magic: [u8; 4],
    pub version: u32,
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Encode a value for storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if Postcard serialization fails.
pub fn serialize_for_cache<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(&CacheEnvelope::new(value)).map_err(|e| {
        error!("Cache serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Decode a stored value, validating magic and version.
///
/// # Errors
///
/// - `Error::DeserializationError`: bytes are not an envelope of `T`
/// - `Error::InvalidCacheEntry`: bad magic header
/// - `Error::VersionMismatch`: written by another schema version
pub fn deserialize_from_cache<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    let envelope: CacheEnvelope<T> =
        postcard::from_bytes(bytes).map_err(|e| Error::DeserializationError(e.to_string()))?;

    if envelope.magic != CACHE_MAGIC {
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}

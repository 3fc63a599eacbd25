//! Error types for the cache framework.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the cache framework.
///
/// Every error is returned to the immediate caller. The cache never logs an
/// error and then swallows it, and a held key lock is released on every error
/// path.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A queued lock acquisition was canceled before it was granted.
    ///
    /// The waiter left the key's queue; no grant was consumed and the
    /// remaining waiters keep their order.
    AcquisitionCanceled(String),

    /// The lock registry has been disposed.
    ///
    /// Pending acquisitions fail with this error when disposal starts, and so
    /// does every acquisition issued afterwards.
    RegistryDisposed,

    /// A stored value could not be read back as the requested type.
    ///
    /// Only surfaced under `TypeMismatchPolicy::Error`. The default policy
    /// treats the value as a cache miss and repopulates it.
    TypeMismatch {
        /// Cache key holding the value
        key: String,
        /// Decoder message
        reason: String,
    },

    /// Serialization failed when converting a value to cache bytes.
    SerializationError(String),

    /// Deserialization failed when converting cache bytes to a value.
    ///
    /// **Recovery:** Cache entry should be evicted and recomputed.
    DeserializationError(String),

    /// Invalid cache entry: corrupted envelope or bad magic.
    InvalidCacheEntry(String),

    /// Schema version mismatch between code and cached data.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from cached entry)
        found: u32,
    },

    /// Backend storage error (Redis, etc).
    ///
    /// Propagated verbatim; the cache never retries store calls.
    BackendError(String),

    /// Data source error raised by a loader.
    RepositoryError(String),

    /// Configuration error, e.g. an invalid duration settings table.
    ConfigError(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Whether this error came out of the value codec.
    ///
    /// Codec failures on read are what the cache classifies as a type
    /// mismatch.
    pub fn is_codec(&self) -> bool {
        matches!(
            self,
            Error::DeserializationError(_)
                | Error::InvalidCacheEntry(_)
                | Error::VersionMismatch { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AcquisitionCanceled(key) => {
                write!(f, "Lock acquisition canceled for key {}", key)
            }
            Error::RegistryDisposed => write!(f, "Lock registry disposed"),
            Error::TypeMismatch { key, reason } => {
                write!(f, "Type mismatch for key {}: {}", key, reason)
            }
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::RepositoryError(msg) => write!(f, "Repository error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::BackendError(e.to_string())
        } else {
            Error::ConfigError(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::BackendError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::BackendError(format!("Redis error: {}", e))
    }
}

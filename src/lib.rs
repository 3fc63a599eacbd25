//! # flight-cache
//!
//! A caching facade that coalesces concurrent population of the same key.
//!
//! ## Features
//!
//! - **Single-flight:** N concurrent misses on a key run the loader once
//! - **Keyed locks:** per-key FIFO async locks; unrelated keys never block each other
//! - **Bounded lock reuse:** primitives of released keys are recycled, not leaked
//! - **Expiration:** absolute, sliding and tiered durations, evaluated lazily on read
//! - **Backend Agnostic:** in-memory, null and Redis backends, or your own
//!
//! ## Quick Start
//!
//! Use [`CacheService`] for easy sharing across tasks:
//!
//! ```no_run
//! use flight_cache::{CacheService, DurationPolicy};
//! use flight_cache::backend::InMemoryBackend;
//! use flight_cache::settings::CacheSliding;
//!
//! # async fn example() -> flight_cache::Result<()> {
//! let cache = CacheService::new(InMemoryBackend::new());
//!
//! let report = cache
//!     .get_or_set(
//!         "report_2024",
//!         || async { Ok(Some(build_report().await)) },
//!         CacheSliding::Medium.into(),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! # async fn build_report() -> String { String::new() }
//! ```
//!
//! ### Lower level
//!
//! [`SingleFlightCache`] is the owned cache; [`LockRegistry`] can be used on
//! its own as a keyed async mutex:
//!
//! ```no_run
//! use flight_cache::LockRegistry;
//!
//! # async fn example() -> flight_cache::Result<()> {
//! let locks = LockRegistry::new();
//! let token = locks.acquire("invoice_7").await?;
//! // ... exclusive section for "invoice_7" ...
//! drop(token);
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod cache;
pub mod clock;
pub mod entity;
pub mod error;
pub mod key;
pub mod lock;
pub mod observability;
pub mod policy;
pub mod serialization;
pub mod service;
pub mod settings;

// Re-exports for convenience
pub use backend::{CacheBackend, CacheRecord};
pub use cache::{CacheOptions, SingleFlightCache, TypeMismatchPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::CacheEntity;
pub use error::{Error, Result};
pub use lock::{AcquireToken, LockRegistry};
pub use policy::DurationPolicy;
pub use service::CacheService;
pub use settings::{CacheExpiration, CacheSliding, SettingsProvider};
pub use tokio_util::sync::CancellationToken;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

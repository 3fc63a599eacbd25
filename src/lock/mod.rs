//! Keyed async locking.
//!
//! [`LockRegistry`] gives each key in use its own exclusive primitive and
//! grants contending callers in FIFO order. Primitives of fully released keys
//! are recycled through a bounded FIFO [`ReusePool`].

pub mod pool;
pub mod registry;

pub use pool::{LockPrimitive, ReusePool, DEFAULT_MAX_IDLE};
pub use registry::{AcquireToken, LockRegistry};

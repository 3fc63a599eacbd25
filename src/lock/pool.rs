//! FIFO pool of idle lock primitives.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Default cap on idle primitives kept for reuse.
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// The primitive backing one key's exclusive section.
///
/// A single-permit semaphore: tokio queues waiters in FIFO order and removes
/// a dropped waiter without disturbing the others.
pub type LockPrimitive = Semaphore;

/// Idle primitives retired from fully released keys.
///
/// Oldest-retired is handed out first. Primitives retired while the pool is
/// full are dropped.
#[derive(Debug)]
pub struct ReusePool {
    idle: VecDeque<Arc<LockPrimitive>>,
    max_idle: usize,
}

impl ReusePool {
    pub fn new(max_idle: usize) -> Self {
        ReusePool {
            idle: VecDeque::new(),
            max_idle,
        }
    }

    /// Pop the oldest idle primitive, or allocate a fresh one.
    pub fn take(&mut self) -> Arc<LockPrimitive> {
        match self.idle.pop_front() {
            Some(primitive) => primitive,
            None => Arc::new(Semaphore::new(1)),
        }
    }

    /// Retire a primitive whose key has no remaining holders or waiters.
    ///
    /// Returns `false` when the pool is full and the primitive was dropped.
    pub fn retire(&mut self, primitive: Arc<LockPrimitive>) -> bool {
        // Closed primitives come from a disposed registry and never go back.
        if primitive.is_closed() || self.idle.len() >= self.max_idle {
            return false;
        }
        debug_assert_eq!(primitive.available_permits(), 1);
        self.idle.push_back(primitive);
        true
    }

    /// Drop every idle primitive.
    pub fn clear(&mut self) {
        self.idle.clear();
    }

    pub fn len(&self) -> usize {
        self.idle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idle.is_empty()
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle
    }
}

impl Default for ReusePool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE)
    }
}

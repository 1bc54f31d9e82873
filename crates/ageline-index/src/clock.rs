//! Logical clock used to stamp and age nodes.
//!
//! Ages are measured in caller-defined units (block heights, epochs, ...),
//! never wall-clock time, so eviction is deterministic under test.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of the current logical time. Expected to be non-decreasing.
pub trait LogicalClock {
    fn now(&self) -> u64;
}

impl<F> LogicalClock for F
where
    F: Fn() -> u64,
{
    fn now(&self) -> u64 {
        self()
    }
}

/// A clock the owner advances by hand. Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    height: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self { height: Arc::new(AtomicU64::new(start)) }
    }

    pub fn set(&self, value: u64) {
        self.height.store(value, Ordering::SeqCst);
    }

    /// Move forward by `delta`, returning the new reading.
    pub fn advance(&self, delta: u64) -> u64 {
        self.height.fetch_add(delta, Ordering::SeqCst) + delta
    }
}

impl LogicalClock for ManualClock {
    fn now(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }
}

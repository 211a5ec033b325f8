//! Shared counters incremented from many threads.
//!
//! [`AtomicCounter`] uses a single lock-free read-modify-write per increment
//! and never loses an update. [`RacyCounter`] splits the increment into a load
//! and a store, the same shape as `cnt++` on a plain integer, and loses
//! updates whenever two threads interleave between the two steps. It exists
//! to be measured against, never relied on.

use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

pub trait Counter: Sync {
    fn increment(&self);
    fn get(&self) -> u64;
}

// =============================================================================
// Atomic counter
// =============================================================================

#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: CachePadded<AtomicU64>,
}

impl AtomicCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` and returns the previous value.
    pub fn add(&self, n: u64) -> u64 {
        self.value.fetch_add(n, Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.value.swap(0, Ordering::AcqRel)
    }
}

impl Counter for AtomicCounter {
    fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }
}

// =============================================================================
// Racy counter (anti-pattern)
// =============================================================================

/// Read-then-write increment. Each step is atomic on its own, so there is no
/// undefined behaviour, but the pair is not: concurrent increments overwrite
/// each other and the final count comes out short.
#[derive(Debug, Default)]
pub struct RacyCounter {
    value: AtomicU64,
}

impl RacyCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Counter for RacyCounter {
    fn increment(&self) {
        let seen = self.value.load(Ordering::Relaxed);
        self.value.store(seen + 1, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Increments `counter` from `threads` scoped threads, `increments` times
/// each, and returns the value seen after every thread has joined.
pub fn run_increments<C: Counter>(counter: &C, threads: usize, increments: usize) -> u64 {
    thread::scope(|s| {
        for _ in 0..threads {
            s.spawn(|| {
                for _ in 0..increments {
                    counter.increment();
                }
            });
        }
    });
    crate::log_debug!(
        "{} threads x {} increments -> {}",
        threads,
        increments,
        counter.get()
    );
    counter.get()
}

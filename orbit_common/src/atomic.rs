//! Atomic `f64` cell for lock-free cross-thread observation.
//!
//! Loop-owned quantities (loop frequency, last reading, timing averages)
//! are published to observer threads through these cells instead of
//! sharing pointers into the loop internals. Counters use relaxed
//! ordering; min/max style updates go through a compare-and-swap loop.

use std::sync::atomic::{AtomicU64, Ordering};

/// An `f64` stored as its IEEE-754 bit pattern in an [`AtomicU64`].
#[derive(Debug)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    /// Create a new cell holding `value`.
    pub const fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    /// Load the current value.
    #[inline]
    pub fn load(&self, order: Ordering) -> f64 {
        f64::from_bits(self.bits.load(order))
    }

    /// Store a new value.
    #[inline]
    pub fn store(&self, value: f64, order: Ordering) {
        self.bits.store(value.to_bits(), order);
    }

    /// Update to `value` only if it is smaller than the stored value.
    ///
    /// CAS retry loop; relaxed ordering throughout.
    pub fn fetch_min(&self, value: f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        while value < f64::from_bits(current) {
            match self.bits.compare_exchange_weak(
                current,
                value.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Update to `value` only if it is larger than the stored value.
    pub fn fetch_max(&self, value: f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        while value > f64::from_bits(current) {
            match self.bits.compare_exchange_weak(
                current,
                value.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

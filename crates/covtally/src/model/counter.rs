//! Saturating hit counters.
//!
//! Counting runs inside the measured program, on every executed line and
//! branch arm. Increments are a relaxed load followed by a relaxed store:
//! no read-modify-write, no lock, no fence. Concurrent writers may lose
//! increments, so counts are approximate under contention, but any completed
//! increment leaves a value of at least 1 behind, which keeps the
//! "executed at least once" signal intact.

use std::sync::atomic::{AtomicU32, Ordering};

/// Largest value a hit counter will hold.
///
/// Kept at `i32::MAX` so counts stay non-negative for consumers that read
/// them as signed 32-bit values.
pub const HIT_CEILING: u32 = i32::MAX as u32;

/// Add two hit counts, clamping at [`HIT_CEILING`]
#[inline]
#[must_use]
pub const fn saturating_hits(a: u32, b: u32) -> u32 {
    let sum = a.saturating_add(b);
    if sum > HIT_CEILING {
        HIT_CEILING
    } else {
        sum
    }
}

/// Clamp a wide count read from a stream into counter range
#[inline]
#[must_use]
pub const fn clamp_hits(value: u64) -> u32 {
    if value > HIT_CEILING as u64 {
        HIT_CEILING
    } else {
        value as u32
    }
}

/// A single live counter slot
#[derive(Debug, Default)]
pub struct HitCounter(AtomicU32);

impl HitCounter {
    /// Create a zeroed counter
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Count one execution.
    ///
    /// This is the hot path.
    #[inline(always)]
    pub fn bump(&self) {
        let current = self.0.load(Ordering::Relaxed);
        if current < HIT_CEILING {
            self.0.store(current + 1, Ordering::Relaxed);
        }
    }

    /// Add `n` executions at once, saturating
    #[inline]
    pub fn add(&self, n: u32) {
        let current = self.0.load(Ordering::Relaxed);
        self.0.store(saturating_hits(current, n), Ordering::Relaxed);
    }

    /// Current value
    #[inline]
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    /// Read and zero the counter
    #[inline]
    pub fn take(&self) -> u32 {
        self.0.swap(0, Ordering::Relaxed)
    }

    /// Zero the counter
    #[inline]
    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

/// Allocate `len` zeroed counters
#[must_use]
pub fn counter_array(len: usize) -> Box<[HitCounter]> {
    (0..len).map(|_| HitCounter::new()).collect()
}

//! Deterministic random source.
//!
//! Every random decision a virtual user makes (credential suffixes, task
//! selection, peer reuse, amounts, think time, key suffixes) goes through a
//! [`LoadRng`]. A run owns one root source seeded from configuration and
//! forks an independent child per session, so the same seed replays the same
//! decisions regardless of how the tokio scheduler interleaves sessions.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};

const LOWER_ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Seeded random number generator for load generation.
#[derive(Debug, Clone)]
pub struct LoadRng {
    inner: SmallRng,
    seed: u64,
}

impl LoadRng {
    /// Creates a random source from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            inner: SmallRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Creates a random source seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self::new(rand::thread_rng().next_u64())
    }

    /// Returns the seed this source was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Derives an independent child source.
    ///
    /// The child's seed is drawn from this source, so a sequence of forks is
    /// itself deterministic.
    pub fn fork(&mut self) -> Self {
        Self::new(self.inner.next_u64())
    }

    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    pub fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    /// Returns a float in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.inner.gen_range(0.0..1.0)
    }

    /// Returns `true` with the given probability.
    pub fn next_bool(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }

    /// Returns an index in `[0, bound)`.
    ///
    /// # Panics
    ///
    /// Panics if `bound` is zero.
    pub fn next_index(&mut self, bound: usize) -> usize {
        assert!(bound > 0, "next_index bound must be positive");
        self.inner.gen_range(0..bound)
    }

    /// Returns an integer in `[low, high]`.
    pub fn range_inclusive(&mut self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        self.inner.gen_range(low..=high)
    }

    /// Returns a duration drawn uniformly from `[min, max]`.
    pub fn duration_between(&mut self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        min + (max - min).mul_f64(self.next_f64())
    }

    /// Returns `len` characters drawn from lowercase letters and digits.
    pub fn lower_alphanumeric(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| char::from(LOWER_ALPHANUMERIC[self.next_index(LOWER_ALPHANUMERIC.len())]))
            .collect()
    }

    /// Returns `len` lowercase hex characters.
    pub fn hex(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| {
                let nibble = self.inner.gen_range(0..16u32);
                char::from_digit(nibble, 16).unwrap_or('0')
            })
            .collect()
    }

    /// Fills a byte buffer.
    pub fn fill_bytes(&mut self, buf: &mut [u8]) {
        self.inner.fill_bytes(buf);
    }
}

impl Default for LoadRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}

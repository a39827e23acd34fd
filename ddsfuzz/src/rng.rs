//! Deterministic draw stream.
//!
//! All randomness in a run flows through [`DrawStream`]. The core generator
//! is `StdRng` seeded with `seed_from_u64`, and every draw consumes exactly one
//! 64-bit word, so the number of words consumed by a construct depends only
//! on the values drawn, never on rejection sampling.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::trace;

/// Seeded stream of primitive random draws.
#[derive(Debug, Clone)]
pub struct DrawStream {
    rng: StdRng,
    draws: u64,
}

impl DrawStream {
    /// Creates a stream for `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            draws: 0,
        }
    }

    /// Number of words consumed so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// A raw 64-bit word.
    pub fn bits(&mut self) -> u64 {
        self.draws += 1;
        self.rng.next_u64()
    }

    /// Uniform integer in `0..n` (Lemire widening multiply). `n == 0` yields 0.
    pub fn below(&mut self, n: u64) -> u64 {
        let word = self.bits();
        ((word as u128 * n as u128) >> 64) as u64
    }

    /// Uniform index in `0..n`.
    pub fn index(&mut self, n: usize) -> usize {
        self.below(n as u64) as usize
    }

    /// Uniform integer in `lo..=hi`. Returns `lo` when the range is empty.
    pub fn range_inclusive(&mut self, lo: u64, hi: u64) -> u64 {
        if hi < lo {
            let _ = self.bits();
            return lo;
        }
        match (hi - lo).checked_add(1) {
            Some(span) => lo + self.below(span),
            None => self.bits(),
        }
    }

    /// Uniform signed integer in `lo..=hi`.
    pub fn range_signed(&mut self, lo: i64, hi: i64) -> i64 {
        let span = hi.wrapping_sub(lo) as u64;
        let offset = self.range_inclusive(0, span);
        lo.wrapping_add(offset as i64)
    }

    /// Fair coin from the top bit of one word.
    pub fn boolean(&mut self) -> bool {
        self.bits() >> 63 == 1
    }

    /// Uniform `f64` in `[0, 1)` with 53 bits of precision.
    pub fn unit(&mut self) -> f64 {
        (self.bits() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// `true` with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.unit() < p
    }

    /// Uniform element of `items`, or `None` (still consuming a word) if empty.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        let i = self.index(items.len());
        items.get(i)
    }

    /// Weighted choice. Entries with zero weight are never chosen; `None`
    /// (still consuming a word) if every weight is zero.
    pub fn weighted<T: Copy>(&mut self, table: &[(T, u32)]) -> Option<T> {
        let total: u64 = table.iter().map(|(_, w)| *w as u64).sum();
        let mut roll = self.below(total);
        for (item, weight) in table {
            let weight = *weight as u64;
            if roll < weight {
                return Some(*item);
            }
            roll -= weight;
        }
        trace!(total, "weighted draw over an all-zero table");
        None
    }
}

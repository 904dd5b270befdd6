//! Running statistics shared by the learning components.
//!
//! Provides [`Welford`], a single-pass mean/variance accumulator with the
//! numerically stable update of Welford (1962). The mirror kernel and the
//! adaptive sampler both feed values in one at a time and query the running
//! mean and standard deviation without storing the sample.

use serde::{Deserialize, Serialize};

/// Single-pass accumulator for mean and variance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation into the running statistics.
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running mean, or 0 before any observation.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance, or 0 with fewer than two observations.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

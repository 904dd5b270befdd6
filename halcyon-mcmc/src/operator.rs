//! The proposal operator contract and shared self-tuning state.
//!
//! One MCMC iteration is `propose` → (driver scores the state) → exactly
//! one of `accept`/`reject` → `optimize(log_alpha)`. `propose` mutates the
//! shared [`ChainState`] in place and returns the log Hastings ratio, or
//! negative infinity to signal an automatic rejection (out-of-bounds
//! value, no legal move). Rejection is cheap and expected; it is never an
//! error. Misconfiguration, by contrast, fails in the constructor.

use rand::RngCore;

use halcyon_core::{HalcyonError, Result};

use crate::state::ChainState;

/// Default target acceptance probability for step-size tuning.
pub const TARGET_ACCEPTANCE: f64 = 0.3;

/// A unit of the chain's move set.
pub trait Operator {
    /// Short identifier used in schedules, diagnostics, and persisted state.
    fn name(&self) -> &str;

    /// Mutate `state` into a candidate and return the log Hastings ratio,
    /// or `f64::NEG_INFINITY` to auto-reject.
    fn propose(&mut self, state: &mut ChainState, rng: &mut dyn RngCore) -> f64;

    /// Called iff the driver accepted the candidate. The post-move state
    /// is passed so learning operators can measure what changed; plain
    /// operators only bump their counter.
    fn accept(&mut self, state: &ChainState);

    /// Called iff the driver rejected the candidate (including
    /// auto-rejections). The driver restores the state itself.
    fn reject(&mut self);

    /// Called after every step with the observed log Metropolis ratio;
    /// adjusts internal step sizes toward the target acceptance rate.
    fn optimize(&mut self, log_alpha: f64);

    /// Serialized tuning/learning state for chain resumption, if this
    /// operator carries any worth persisting.
    fn store_state(&self) -> Option<String> {
        None
    }

    /// Restore state produced by [`Operator::store_state`]. Dimension
    /// mismatches against the live configuration are fatal.
    fn restore_state(&mut self, _record: &str) -> Result<()> {
        Err(HalcyonError::InvalidInput(format!(
            "operator {} does not persist state",
            self.name()
        )))
    }

    /// Swap a naive uniform kernel for the default Bactrian kernel,
    /// keeping every other setting. Returns whether a swap happened;
    /// operators without a configurable kernel report `false`.
    fn upgrade_kernel(&mut self) -> bool {
        false
    }
}

/// Step-size tuning shared by every concrete operator.
///
/// Implements the Robbins-Monro update used across the engine: after each
/// step, `delta = (min(1, e^log_alpha) - target) / (calls + 1)` is added to
/// the log step size, so the step size random-walks toward the value that
/// yields the target acceptance probability and the adjustment decays as
/// the chain runs.
#[derive(Debug, Clone)]
pub struct Tuning {
    step_size: f64,
    target: f64,
    accepted: u64,
    rejected: u64,
    optimize_calls: u64,
}

impl Tuning {
    pub fn new(step_size: f64) -> Self {
        Self {
            step_size,
            target: TARGET_ACCEPTANCE,
            accepted: 0,
            rejected: 0,
            optimize_calls: 0,
        }
    }

    pub fn with_target(step_size: f64, target: f64) -> Self {
        Self {
            target,
            ..Self::new(step_size)
        }
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    pub fn set_step_size(&mut self, step_size: f64) {
        self.step_size = step_size;
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn record_accept(&mut self) {
        self.accepted += 1;
    }

    pub fn record_reject(&mut self) {
        self.rejected += 1;
    }

    /// Observed acceptance rate so far (0 when nothing has been counted).
    pub fn acceptance_rate(&self) -> f64 {
        let total = self.accepted + self.rejected;
        if total == 0 {
            0.0
        } else {
            self.accepted as f64 / total as f64
        }
    }

    /// The decaying Robbins-Monro increment for the log step size.
    pub fn calc_delta(&mut self, log_alpha: f64) -> f64 {
        self.optimize_calls += 1;
        let alpha = log_alpha.min(0.0).exp();
        (alpha - self.target) / (self.optimize_calls as f64 + 1.0)
    }

    /// Apply the standard update: `step <- exp(ln step + calc_delta)`.
    pub fn tune_step_size(&mut self, log_alpha: f64) {
        let delta = self.calc_delta(log_alpha) + self.step_size.ln();
        self.step_size = delta.exp();
    }
}

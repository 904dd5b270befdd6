//! Random-walk moves on parameters and tip dates.
//!
//! [`RandomWalkOperator`] adds a kernel-drawn delta to one dimension of a
//! bounded parameter. [`IntervalOperator`] walks box-constrained values
//! through a logistic-style transform so the proposal can never leave
//! `[lower, upper]`, paying the transform's Jacobian in the Hastings
//! ratio. [`TipDateRandomWalk`] perturbs sampled tip heights.

use rand::{Rng, RngCore};

use halcyon_core::{HalcyonError, Result};

use crate::kernel::Kernel;
use crate::operator::{Operator, Tuning};
use crate::state::{ChainState, ParamId};
use crate::tree::NodeId;

// ── Random walk ────────────────────────────────────────────────────────────

/// Perturbs one random dimension by a kernel delta; symmetric, so the
/// Hastings ratio is 0 apart from any mirror-kernel correction.
pub struct RandomWalkOperator {
    name: String,
    param: ParamId,
    kernel: Kernel,
    tuning: Tuning,
}

impl RandomWalkOperator {
    pub fn new(
        name: &str,
        state: &ChainState,
        param: ParamId,
        window: f64,
        kernel: Kernel,
    ) -> Result<Self> {
        if state.params.get(param).is_none() {
            return Err(HalcyonError::InvalidInput(format!(
                "no parameter {param}"
            )));
        }
        if !(window > 0.0) {
            return Err(HalcyonError::InvalidInput(format!(
                "walk window must be positive, got {window}"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            param,
            kernel,
            tuning: Tuning::new(window),
        })
    }
}

impl Operator for RandomWalkOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&mut self, state: &mut ChainState, rng: &mut dyn RngCore) -> f64 {
        let id = self.param;
        let i = rng.gen_range(0..state.param(id).dimension());
        let old = state.param(id).value(i);
        let new = old + self.kernel.random_delta(old, self.tuning.step_size(), rng);
        if !state.param(id).in_bounds(new) {
            return f64::NEG_INFINITY;
        }
        state.param_mut(id).set_value(i, new);
        self.kernel.log_hr_contribution_per_dimension()
    }

    fn accept(&mut self, _state: &ChainState) {
        self.tuning.record_accept();
    }

    fn reject(&mut self) {
        self.tuning.record_reject();
    }

    fn optimize(&mut self, log_alpha: f64) {
        self.tuning.tune_step_size(log_alpha);
    }

    fn upgrade_kernel(&mut self) -> bool {
        self.kernel.upgrade()
    }
}

// ── Interval walk ──────────────────────────────────────────────────────────

/// Scale move through the transform `y = (upper − v)/(v − lower)`, which
/// keeps box-constrained values strictly inside their bounds.
pub struct IntervalOperator {
    name: String,
    param: ParamId,
    lower: f64,
    upper: f64,
    kernel: Kernel,
    tuning: Tuning,
}

impl IntervalOperator {
    /// Both bounds of `param` must be finite.
    pub fn new(
        name: &str,
        state: &ChainState,
        param: ParamId,
        scale_factor: f64,
        kernel: Kernel,
    ) -> Result<Self> {
        let p = state
            .params
            .get(param)
            .ok_or_else(|| HalcyonError::InvalidInput(format!("no parameter {param}")))?;
        if !p.lower().is_finite() || !p.upper().is_finite() {
            return Err(HalcyonError::InvalidInput(format!(
                "interval operator on {:?} needs finite bounds, got [{}, {}]",
                p.name(),
                p.lower(),
                p.upper()
            )));
        }
        if !(scale_factor > 0.0) {
            return Err(HalcyonError::InvalidInput(format!(
                "scale factor must be positive, got {scale_factor}"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            param,
            lower: p.lower(),
            upper: p.upper(),
            kernel,
            tuning: Tuning::new(scale_factor),
        })
    }
}

impl Operator for IntervalOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&mut self, state: &mut ChainState, rng: &mut dyn RngCore) -> f64 {
        let id = self.param;
        let i = rng.gen_range(0..state.param(id).dimension());
        let old = state.param(id).value(i);
        if old <= self.lower || old >= self.upper {
            return f64::NEG_INFINITY;
        }
        let s = self.kernel.scaler(old, self.tuning.step_size(), rng);
        let y = (self.upper - old) / (old - self.lower) * s;
        let new = (self.upper + self.lower * y) / (y + 1.0);
        if !(new > self.lower && new < self.upper) {
            return f64::NEG_INFINITY;
        }
        state.param_mut(id).set_value(i, new);
        s.ln()
            + 2.0 * ((new - self.lower) / (old - self.lower)).ln()
            + self.kernel.log_hr_contribution_per_dimension()
    }

    fn accept(&mut self, _state: &ChainState) {
        self.tuning.record_accept();
    }

    fn reject(&mut self) {
        self.tuning.record_reject();
    }

    fn optimize(&mut self, log_alpha: f64) {
        self.tuning.tune_step_size(log_alpha);
    }

    fn upgrade_kernel(&mut self) -> bool {
        self.kernel.upgrade()
    }
}

// ── Tip dates ──────────────────────────────────────────────────────────────

/// Walks the height of one sampled tip, rejecting when it would rise
/// above its parent, drop below zero, or make no change at all.
pub struct TipDateRandomWalk {
    name: String,
    tips: Vec<String>,
    kernel: Kernel,
    tuning: Tuning,
}

impl TipDateRandomWalk {
    /// `tips` names the taxa whose dates are sampled; empty means every
    /// tip.
    pub fn new(name: &str, tips: Vec<String>, window: f64, kernel: Kernel) -> Result<Self> {
        if !(window > 0.0) {
            return Err(HalcyonError::InvalidInput(format!(
                "walk window must be positive, got {window}"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            tips,
            kernel,
            tuning: Tuning::new(window),
        })
    }

    fn targets(&self, state: &ChainState) -> Vec<NodeId> {
        state
            .tree
            .leaves()
            .into_iter()
            .filter(|&id| {
                if self.tips.is_empty() {
                    return true;
                }
                state
                    .tree
                    .get_node(id)
                    .and_then(|n| n.name.as_deref())
                    .map(|n| self.tips.iter().any(|t| t == n))
                    .unwrap_or(false)
            })
            .collect()
    }
}

impl Operator for TipDateRandomWalk {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&mut self, state: &mut ChainState, rng: &mut dyn RngCore) -> f64 {
        let targets = self.targets(state);
        if targets.is_empty() {
            return f64::NEG_INFINITY;
        }
        let tip = targets[rng.gen_range(0..targets.len())];
        let parent = match state.tree.parent(tip) {
            Some(p) => p,
            None => return f64::NEG_INFINITY,
        };
        let old = state.tree.height(tip);
        let new = old + self.kernel.random_delta(old, self.tuning.step_size(), rng);
        if new < 0.0 || new > state.tree.height(parent) || new == old {
            return f64::NEG_INFINITY;
        }
        state.tree.set_height(tip, new);
        self.kernel.log_hr_contribution_per_dimension()
    }

    fn accept(&mut self, _state: &ChainState) {
        self.tuning.record_accept();
    }

    fn reject(&mut self) {
        self.tuning.record_reject();
    }

    fn optimize(&mut self, log_alpha: f64) {
        self.tuning.tune_step_size(log_alpha);
    }

    fn upgrade_kernel(&mut self) -> bool {
        self.kernel.upgrade()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

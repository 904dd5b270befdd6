//! Multiplicative scale moves.
//!
//! One operator covers the scale family: a kernel-drawn factor multiplies
//! a single parameter dimension, every dimension jointly or
//! independently, the tree's root height, or all internal node heights.
//! The Hastings ratio is `ln s` per independently scaled value, or
//! `dof · ln s` for a joint move.

use rand::{Rng, RngCore};

use halcyon_core::{HalcyonError, Result};

use crate::kernel::Kernel;
use crate::operator::{Operator, Tuning};
use crate::state::{ChainState, ParamId};

/// What a [`ScaleOperator`] multiplies.
#[derive(Debug, Clone)]
pub enum ScaleTarget {
    /// One random dimension of a parameter.
    Dimension(ParamId),
    /// All dimensions by the same factor. `dof` overrides the Hastings
    /// exponent, which defaults to the dimension count.
    AllDimensions { param: ParamId, dof: Option<usize> },
    /// Each dimension by its own independent factor.
    EachDimension(ParamId),
    /// The root height alone.
    RootHeight,
    /// Every internal node height by the same factor.
    TreeHeights,
}

/// Scales values by a kernel-drawn positive factor.
pub struct ScaleOperator {
    name: String,
    target: ScaleTarget,
    kernel: Kernel,
    tuning: Tuning,
}

impl ScaleOperator {
    /// `scale_factor` controls the spread of drawn factors and is tuned
    /// towards the target acceptance rate.
    pub fn new(
        name: &str,
        state: &ChainState,
        target: ScaleTarget,
        scale_factor: f64,
        kernel: Kernel,
    ) -> Result<Self> {
        if let ScaleTarget::Dimension(id)
        | ScaleTarget::AllDimensions { param: id, .. }
        | ScaleTarget::EachDimension(id) = target
        {
            if state.params.get(id).is_none() {
                return Err(HalcyonError::InvalidInput(format!("no parameter {id}")));
            }
        }
        if !(scale_factor > 0.0) {
            return Err(HalcyonError::InvalidInput(format!(
                "scale factor must be positive, got {scale_factor}"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            target,
            kernel,
            tuning: Tuning::new(scale_factor),
        })
    }

    /// Tune towards a custom acceptance rate instead of the engine
    /// default of 0.3.
    pub fn with_target_acceptance(mut self, target: f64) -> Result<Self> {
        if !(target > 0.0 && target < 1.0) {
            return Err(HalcyonError::InvalidInput(format!(
                "acceptance target must lie in (0, 1), got {target}"
            )));
        }
        self.tuning = Tuning::with_target(self.tuning.step_size(), target);
        Ok(self)
    }

    pub fn scale_factor(&self) -> f64 {
        self.tuning.step_size()
    }

    fn draw(&mut self, value: f64, rng: &mut dyn RngCore) -> f64 {
        self.kernel.scaler(value, self.tuning.step_size(), rng)
    }
}

impl Operator for ScaleOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&mut self, state: &mut ChainState, rng: &mut dyn RngCore) -> f64 {
        match self.target.clone() {
            ScaleTarget::RootHeight => {
                let root = state.tree.root();
                let old = state.tree.height(root);
                let s = self.draw(old, rng);
                let new = old * s;
                let tallest_child = state
                    .tree
                    .get_node(root)
                    .map(|n| n.children.iter().fold(f64::NEG_INFINITY, |m, &c| m.max(state.tree.height(c))))
                    .unwrap_or(f64::NEG_INFINITY);
                if new < tallest_child {
                    return f64::NEG_INFINITY;
                }
                state.tree.set_height(root, new);
                s.ln() + self.kernel.log_hr_contribution_per_dimension()
            }
            ScaleTarget::TreeHeights => {
                let s = self.draw(f64::NAN, rng);
                match state.tree.scale_internal_heights(s) {
                    Some(scaled) => s.ln() * scaled as f64,
                    None => f64::NEG_INFINITY,
                }
            }
            ScaleTarget::Dimension(id) => {
                let i = rng.gen_range(0..state.param(id).dimension());
                let old = state.param(id).value(i);
                if old == 0.0 {
                    return f64::NEG_INFINITY;
                }
                let s = self.draw(old, rng);
                let new = old * s;
                if !state.param(id).in_bounds(new) {
                    return f64::NEG_INFINITY;
                }
                state.param_mut(id).set_value(i, new);
                s.ln() + self.kernel.log_hr_contribution_per_dimension()
            }
            ScaleTarget::AllDimensions { param: id, dof } => {
                let s = self.draw(f64::NAN, rng);
                let dim = state.param(id).dimension();
                let scaled: Vec<f64> = state.param(id).values().iter().map(|v| v * s).collect();
                if scaled.iter().any(|&v| !state.param(id).in_bounds(v)) {
                    return f64::NEG_INFINITY;
                }
                for (i, v) in scaled.into_iter().enumerate() {
                    state.param_mut(id).set_value(i, v);
                }
                dof.unwrap_or(dim) as f64 * s.ln()
            }
            ScaleTarget::EachDimension(id) => {
                let dim = state.param(id).dimension();
                let mut log_hr = 0.0;
                let mut scaled = Vec::with_capacity(dim);
                for i in 0..dim {
                    let old = state.param(id).value(i);
                    let s = self.draw(old, rng);
                    let new = old * s;
                    if !state.param(id).in_bounds(new) {
                        return f64::NEG_INFINITY;
                    }
                    log_hr += s.ln() + self.kernel.log_hr_contribution_per_dimension();
                    scaled.push(new);
                }
                for (i, v) in scaled.into_iter().enumerate() {
                    state.param_mut(id).set_value(i, v);
                }
                log_hr
            }
        }
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

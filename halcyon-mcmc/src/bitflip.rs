//! Single-bit flip move on boolean vectors.
//!
//! Flips one random bit. In `uniform_on_count` mode the Hastings ratio
//! makes all vectors with the same number of set bits equiprobable;
//! otherwise every configuration is equiprobable and the ratio is 0.

use rand::{Rng, RngCore};

use halcyon_core::{HalcyonError, Result};

use crate::operator::{Operator, Tuning};
use crate::state::{ChainState, FlagId};

/// Flips one bit of a [`crate::parameter::BoolParameter`].
pub struct BitFlipOperator {
    name: String,
    flag: FlagId,
    uniform_on_count: bool,
    tuning: Tuning,
}

impl BitFlipOperator {
    pub fn new(
        name: &str,
        state: &ChainState,
        flag: FlagId,
        uniform_on_count: bool,
    ) -> Result<Self> {
        if state.flags.get(flag).is_none() {
            return Err(HalcyonError::InvalidInput(format!("no flag parameter {flag}")));
        }
        Ok(Self {
            name: name.to_string(),
            flag,
            uniform_on_count,
            tuning: Tuning::new(1.0),
        })
    }
}

impl Operator for BitFlipOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&mut self, state: &mut ChainState, rng: &mut dyn RngCore) -> f64 {
        let id = self.flag;
        let dim = state.flag(id).dimension();
        if dim == 0 {
            return f64::NEG_INFINITY;
        }
        let sum = state.flag(id).count_ones() as f64;
        let dim_f = dim as f64;

        let pos = rng.gen_range(0..dim);
        let value = state.flag(id).value(pos);
        state.flag_mut(id).set_value(pos, !value);

        if !self.uniform_on_count {
            return 0.0;
        }
        if value {
            -(sum / (dim_f - sum + 1.0)).ln()
        } else {
            -((dim_f - sum) / (sum + 1.0)).ln()
        }
    }

    fn accept(&mut self, _state: &ChainState) {
        self.tuning.record_accept();
    }

    fn reject(&mut self) {
        self.tuning.record_reject();
    }

    fn optimize(&mut self, _log_alpha: f64) {}
}

// ── Tests ──────────────────────────────────────────────────────────────────

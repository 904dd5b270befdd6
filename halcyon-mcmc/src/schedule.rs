//! Operator registry and weighted selection.
//!
//! The chain driver asks the schedule for one operator per iteration,
//! drawn with probability proportional to its registered weight. A
//! construction flag upgrades naive uniform-kernel operators to their
//! Bactrian counterparts as they are registered, so configurations
//! written for the plain kernels transparently get the better-mixing
//! ones.

use log::debug;
use rand::{Rng, RngCore};

use halcyon_core::{HalcyonError, Result};

use crate::operator::Operator;

pub struct OperatorSchedule {
    operators: Vec<Box<dyn Operator>>,
    weights: Vec<f64>,
    cumulative: Vec<f64>,
    upgrade_kernels: bool,
}

impl OperatorSchedule {
    pub fn new() -> Self {
        Self {
            operators: Vec::new(),
            weights: Vec::new(),
            cumulative: Vec::new(),
            upgrade_kernels: false,
        }
    }

    /// Substitute Bactrian kernels for uniform ones at registration.
    pub fn with_kernel_upgrades(mut self) -> Self {
        self.upgrade_kernels = true;
        self
    }

    /// Register an operator with a positive selection weight.
    pub fn add(&mut self, mut operator: Box<dyn Operator>, weight: f64) -> Result<()> {
        if !(weight > 0.0 && weight.is_finite()) {
            return Err(HalcyonError::InvalidInput(format!(
                "operator {:?} needs a positive finite weight, got {weight}",
                operator.name()
            )));
        }
        if self.upgrade_kernels && operator.upgrade_kernel() {
            debug!("substituted Bactrian kernel for operator {}", operator.name());
        }
        self.operators.push(operator);
        self.weights.push(weight);
        self.rebuild_cumulative();
        Ok(())
    }

    fn rebuild_cumulative(&mut self) {
        let total: f64 = self.weights.iter().sum();
        self.cumulative.clear();
        let mut acc = 0.0;
        for w in &self.weights {
            acc += w / total;
            self.cumulative.push(acc);
        }
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn weight(&self, index: usize) -> f64 {
        self.weights[index]
    }

    pub fn operator(&self, index: usize) -> &dyn Operator {
        self.operators[index].as_ref()
    }

    pub fn operator_mut(&mut self, index: usize) -> &mut dyn Operator {
        self.operators[index].as_mut()
    }

    /// Pick an operator index in proportion to the registered weights.
    pub fn select(&self, rng: &mut dyn RngCore) -> Result<usize> {
        if self.operators.is_empty() {
            return Err(HalcyonError::InvalidInput(
                "cannot select from an empty schedule".to_string(),
            ));
        }
        let u: f64 = rng.gen();
        Ok(self
            .cumulative
            .partition_point(|&c| c <= u)
            .min(self.operators.len() - 1))
    }

    /// Persisted records for every operator that carries learned state,
    /// keyed by operator name.
    pub fn store_states(&self) -> Vec<(String, String)> {
        self.operators
            .iter()
            .filter_map(|op| op.store_state().map(|s| (op.name().to_string(), s)))
            .collect()
    }

    /// Feed records captured by [`OperatorSchedule::store_states`] back
    /// into the matching operators. Records naming an unknown operator
    /// are a configuration error.
    pub fn restore_states(&mut self, records: &[(String, String)]) -> Result<()> {
        for (name, record) in records {
            let op = self
                .operators
                .iter_mut()
                .find(|op| op.name() == name)
                .ok_or_else(|| {
                    HalcyonError::InvalidInput(format!(
                        "persisted state names unknown operator {name:?}"
                    ))
                })?;
            op.restore_state(record)?;
        }
        Ok(())
    }
}

impl Default for OperatorSchedule {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Kernel;
    use crate::parameter::RealParameter;
    use crate::state::ChainState;
    use crate::tree::TimeTree;
    use crate::walk::RandomWalkOperator;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn walk(name: &str, kernel: Kernel) -> Box<dyn Operator> {
        let mut tree = TimeTree::new(1.0);
        let root = tree.root();
        tree.add_child(root, Some("a".into()), 0.0).unwrap();
        tree.add_child(root, Some("b".into()), 0.0).unwrap();
        let mut state = ChainState::new(tree);
        let id = state.add_param(RealParameter::unbounded("x", vec![0.0]).unwrap());
        Box::new(RandomWalkOperator::new(name, &state, id, 0.3, kernel).unwrap())
    }

    #[test]
    fn selection_tracks_the_registered_weights() {
        let mut schedule = OperatorSchedule::new();
        schedule.add(walk("light", Kernel::default()), 1.0).unwrap();
        schedule.add(walk("heavy", Kernel::default()), 9.0).unwrap();

        let mut rng = StdRng::seed_from_u64(13);
        let mut counts = [0u32; 2];
        for _ in 0..20_000 {
            counts[schedule.select(&mut rng).unwrap()] += 1;
        }
        let heavy_share = counts[1] as f64 / 20_000.0;
        assert!(
            (heavy_share - 0.9).abs() < 0.02,
            "heavy share {heavy_share}"
        );
    }

    #[test]
    fn uniform_kernels_are_upgraded_when_asked() {
        // after registration with the flag, the kernel is already
        // Bactrian, so a manual upgrade finds nothing to do
        let mut upgrading = OperatorSchedule::new().with_kernel_upgrades();
        upgrading.add(walk("w", Kernel::uniform()), 1.0).unwrap();
        assert!(!upgrading.operator_mut(0).upgrade_kernel());

        // without the flag the uniform kernel survives registration
        let mut plain = OperatorSchedule::new();
        plain.add(walk("w", Kernel::uniform()), 1.0).unwrap();
        assert!(plain.operator_mut(0).upgrade_kernel());
    }

    #[test]
    fn non_positive_weights_are_rejected() {
        let mut schedule = OperatorSchedule::new();
        assert!(schedule.add(walk("w", Kernel::default()), 0.0).is_err());
        assert!(schedule.add(walk("w", Kernel::default()), -1.0).is_err());
        assert!(schedule.add(walk("w", Kernel::default()), f64::INFINITY).is_err());
        assert!(schedule.is_empty());
    }

    #[test]
    fn empty_schedule_cannot_select() {
        let schedule = OperatorSchedule::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(schedule.select(&mut rng).is_err());
    }
}

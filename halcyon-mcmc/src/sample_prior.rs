//! Sample-from-prior move.
//!
//! Replaces a random subset of a parameter's dimensions with fresh
//! inverse-CDF draws from a prior. The Hastings ratio is the summed log
//! density of the old values minus that of the new ones. When the
//! parameter indexes tree nodes, the subset is built by a biased
//! root-ward walk so the redrawn dimensions form a connected
//! neighbourhood on the tree instead of a scattered set. The expected
//! subset size `np` is the tunable.

use log::warn;
use rand::{Rng, RngCore};

use halcyon_core::{HalcyonError, Result};

use crate::operator::{Operator, Tuning};
use crate::prior::Prior;
use crate::state::{ChainState, ParamId};
use crate::tree::NodeId;

enum SubsetMode {
    /// Independent Bernoulli(np/dim) per dimension.
    Independent,
    /// Dimensions are tree nodes; walk from a random node to the root.
    /// With `include_root` unset the parameter covers only non-root
    /// nodes, in id order.
    Tree { include_root: bool },
}

/// Redraws a subset of dimensions from a prior distribution.
pub struct SampleFromPrior {
    name: String,
    param: ParamId,
    prior: Option<Box<dyn Prior>>,
    mode: SubsetMode,
    tuning: Tuning,
    dim: usize,
}

impl SampleFromPrior {
    /// Unstructured subset. Without a prior the redraw is uniform inside
    /// the parameter's bounds, which must then be finite.
    pub fn new(
        name: &str,
        state: &ChainState,
        param: ParamId,
        prior: Option<Box<dyn Prior>>,
        np: f64,
    ) -> Result<Self> {
        let p = state
            .params
            .get(param)
            .ok_or_else(|| HalcyonError::InvalidInput(format!("no parameter {param}")))?;
        if prior.is_none() && (!p.lower().is_finite() || !p.upper().is_finite()) {
            return Err(HalcyonError::InvalidInput(format!(
                "parameter {:?} needs a prior or finite bounds",
                p.name()
            )));
        }
        if np < 0.0 {
            return Err(HalcyonError::InvalidInput(format!(
                "np must be non-negative, got {np}"
            )));
        }
        let dim = p.dimension();
        Ok(Self {
            name: name.to_string(),
            param,
            prior,
            mode: SubsetMode::Independent,
            tuning: Tuning::new(np.min(dim as f64)),
            dim,
        })
    }

    /// Tree-neighbourhood subset. The parameter must have one dimension
    /// per tree node, or one per non-root node.
    pub fn on_tree(
        name: &str,
        state: &ChainState,
        param: ParamId,
        prior: Option<Box<dyn Prior>>,
        np: f64,
    ) -> Result<Self> {
        let mut op = Self::new(name, state, param, prior, np)?;
        let nodes = state.tree.node_count();
        op.mode = if op.dim == nodes {
            SubsetMode::Tree { include_root: true }
        } else if op.dim == nodes - 1 {
            SubsetMode::Tree { include_root: false }
        } else {
            return Err(HalcyonError::InvalidInput(format!(
                "parameter has {} dimensions but the tree has {} nodes",
                op.dim, nodes
            )));
        };
        Ok(op)
    }

    pub fn np(&self) -> f64 {
        self.tuning.step_size()
    }

    /// Dimension index of `node`, skipping the root when it is not
    /// covered by the parameter.
    fn index_of(state: &ChainState, node: NodeId, include_root: bool) -> Option<usize> {
        if include_root {
            return Some(node);
        }
        let root = state.tree.root();
        if node == root {
            None
        } else if node < root {
            Some(node)
        } else {
            Some(node - 1)
        }
    }

    fn node_of(state: &ChainState, index: usize, include_root: bool) -> NodeId {
        if include_root {
            return index;
        }
        let root = state.tree.root();
        if index < root {
            index
        } else {
            index + 1
        }
    }

    fn subset(&self, state: &ChainState, rng: &mut dyn RngCore) -> Vec<usize> {
        let prob = (self.np() / self.dim as f64).min(1.0);
        let mut indices = Vec::new();

        match self.mode {
            SubsetMode::Independent => {
                for i in 0..self.dim {
                    if rng.gen::<f64>() < prob {
                        indices.push(i);
                    }
                }
            }
            SubsetMode::Tree { include_root } => {
                let start = rng.gen_range(0..self.dim);
                indices.push(start);
                let mut node = Self::node_of(state, start, include_root);
                while let Some(parent) = state.tree.parent(node) {
                    if let Some(pi) = Self::index_of(state, parent, include_root) {
                        if rng.gen::<f64>() < prob {
                            indices.push(pi);
                        }
                    }
                    if let Some(n) = state.tree.get_node(parent) {
                        for &sibling in &n.children {
                            if sibling == node {
                                continue;
                            }
                            if let Some(si) = Self::index_of(state, sibling, include_root) {
                                if rng.gen::<f64>() < prob {
                                    indices.push(si);
                                }
                            }
                        }
                    }
                    node = parent;
                }
            }
        }

        if indices.is_empty() {
            indices.push(rng.gen_range(0..self.dim));
        }
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

impl Operator for SampleFromPrior {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&mut self, state: &mut ChainState, rng: &mut dyn RngCore) -> f64 {
        if state.param(self.param).dimension() != self.dim {
            return f64::NEG_INFINITY;
        }
        let indices = self.subset(state, rng);

        let mut log_hr = 0.0;
        for i in indices {
            let old = state.param(self.param).value(i);
            let u: f64 = rng.gen();
            let (new, old_log_p, new_log_p) = match &self.prior {
                Some(prior) => match prior.inverse_cdf(u) {
                    Ok(new) => (new, prior.log_density(old), prior.log_density(new)),
                    Err(e) => {
                        // a failed quantile leaves this dimension alone
                        warn!("{}: quantile failed for dimension {i}: {e}", self.name);
                        continue;
                    }
                },
                None => {
                    let lower = state.param(self.param).lower();
                    let upper = state.param(self.param).upper();
                    (lower + u * (upper - lower), 0.0, 0.0)
                }
            };
            if !state.param(self.param).in_bounds(new) {
                return f64::NEG_INFINITY;
            }
            state.param_mut(self.param).set_value(i, new);
            log_hr += old_log_p - new_log_p;
        }
        log_hr
    }

    fn accept(&mut self, _state: &ChainState) {
        self.tuning.record_accept();
    }

    fn reject(&mut self) {
        self.tuning.record_reject();
    }

    fn optimize(&mut self, log_alpha: f64) {
        self.tuning.tune_step_size(log_alpha);
        let clamped = self.tuning.step_size().clamp(0.0, self.dim as f64);
        self.tuning.set_step_size(clamped);
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::RealParameter;
    use crate::prior::{Exponential, Normal};
    use crate::tree::TimeTree;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn four_tip_state() -> ChainState {
        let mut tree = TimeTree::new(3.0);
        let root = tree.root();
        let left = tree.add_child(root, None, 1.0).unwrap();
        let right = tree.add_child(root, None, 2.0).unwrap();
        tree.add_child(left, Some("a".into()), 0.0).unwrap();
        tree.add_child(left, Some("b".into()), 0.0).unwrap();
        tree.add_child(right, Some("c".into()), 0.0).unwrap();
        tree.add_child(right, Some("d".into()), 0.0).unwrap();
        ChainState::new(tree)
    }

    #[test]
    fn ratio_is_old_minus_new_log_density() {
        let mut state = four_tip_state();
        let id = state.add_param(
            RealParameter::new("rate", vec![1.0], 0.0, f64::INFINITY).unwrap(),
        );
        let prior: Box<dyn Prior> = Box::new(Exponential::new(2.0).unwrap());
        let mut op =
            SampleFromPrior::new("sfp", &state, id, Some(prior), 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(40);

        let check = Exponential::new(2.0).unwrap();
        for _ in 0..100 {
            let old = state.param(id).value(0);
            let log_hr = op.propose(&mut state, &mut rng);
            let new = state.param(id).value(0);
            assert_relative_eq!(
                log_hr,
                check.log_density(old) - check.log_density(new),
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn no_prior_draws_uniformly_inside_bounds() {
        let mut state = four_tip_state();
        let id = state.add_param(
            RealParameter::new("p", vec![0.5, 0.5, 0.5], -1.0, 1.0).unwrap(),
        );
        let mut op = SampleFromPrior::new("sfp", &state, id, None, 2.0).unwrap();
        let mut rng = StdRng::seed_from_u64(41);
        for _ in 0..200 {
            let log_hr = op.propose(&mut state, &mut rng);
            assert_eq!(log_hr, 0.0);
            for i in 0..3 {
                let v = state.param(id).value(i);
                assert!((-1.0..=1.0).contains(&v));
            }
        }
    }

    #[test]
    fn unbounded_parameter_without_prior_is_rejected_at_setup() {
        let mut state = four_tip_state();
        let id = state.add_param(RealParameter::unbounded("p", vec![0.0]).unwrap());
        assert!(SampleFromPrior::new("sfp", &state, id, None, 1.0).is_err());
    }

    #[test]
    fn tree_subset_is_a_connected_neighbourhood() {
        let mut state = four_tip_state();
        let n = state.tree.node_count();
        let id = state.add_param(
            RealParameter::new("branch-rates", vec![1.0; n], 0.0, f64::INFINITY).unwrap(),
        );
        let prior: Box<dyn Prior> = Box::new(Normal::new(0.5, 0.1).unwrap());
        let op = SampleFromPrior::on_tree("sfp-tree", &state, id, Some(prior), 3.0).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let indices = op.subset(&state, &mut rng);
            assert!(!indices.is_empty());
            // every sampled node is on or adjacent to the walk from some
            // start to the root, so each non-start index has a sampled
            // neighbour or ancestor; weak check: all are valid node ids
            assert!(indices.iter().all(|&i| i < n));
        }
    }

    #[test]
    fn dimension_mismatch_with_tree_fails_at_setup() {
        let mut state = four_tip_state();
        let id = state.add_param(
            RealParameter::new("p", vec![1.0; 3], 0.0, f64::INFINITY).unwrap(),
        );
        assert!(SampleFromPrior::on_tree("sfp", &state, id, None, 1.0).is_err());
    }

    #[test]
    fn np_is_clamped_after_tuning() {
        let mut state = four_tip_state();
        let id = state.add_param(
            RealParameter::new("p", vec![1.0; 4], 0.0, 2.0).unwrap(),
        );
        let mut op = SampleFromPrior::new("sfp", &state, id, None, 4.0).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let _ = op.propose(&mut state, &mut rng);
        // large positive feedback pushes np up; the clamp caps it at dim
        for _ in 0..50 {
            op.optimize(10.0);
        }
        assert!(op.np() <= 4.0);
        for _ in 0..200 {
            op.optimize(-50.0);
        }
        assert!(op.np() >= 0.0);
    }
}

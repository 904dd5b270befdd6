//! Nearest-neighbour interchange move.
//!
//! Swaps a node with its uncle and redraws the parent's height uniformly
//! in the interval the swapped topology allows. The Hastings ratio is the
//! log ratio of the forward and reverse height ranges.

use rand::{Rng, RngCore};

use halcyon_core::Result;

use crate::constraint::CladeGroups;
use crate::operator::{Operator, Tuning};
use crate::state::ChainState;
use crate::tree::{NodeId, TimeTree};

/// Exchanges a node with its uncle, redrawing the parent height.
pub struct NearestNeighbourInterchange {
    name: String,
    tuning: Tuning,
    constraints: Option<Vec<Vec<String>>>,
}

impl NearestNeighbourInterchange {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tuning: Tuning::new(1.0),
            constraints: None,
        }
    }

    /// Restricted variant that only exchanges edges within one monophyly
    /// constraint group.
    pub fn restricted(
        name: &str,
        tree: &TimeTree,
        constraints: Vec<Vec<String>>,
    ) -> Result<Self> {
        CladeGroups::new(tree, &constraints)?;
        let mut op = Self::new(name);
        op.constraints = Some(constraints);
        Ok(op)
    }

    fn eligible(tree: &TimeTree, node: NodeId, groups: Option<&CladeGroups>) -> bool {
        let parent = match tree.parent(node) {
            Some(p) => p,
            None => return false,
        };
        let grandparent = match tree.parent(parent) {
            Some(g) => g,
            None => return false,
        };
        match groups {
            Some(g) => {
                let uncle = tree.other_child(grandparent, parent);
                g.movable(tree, node) && g.same_group(node, uncle)
            }
            None => true,
        }
    }
}

impl Operator for NearestNeighbourInterchange {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&mut self, state: &mut ChainState, rng: &mut dyn RngCore) -> f64 {
        let tree = &mut state.tree;
        if tree.leaf_count() < 3 {
            return f64::NEG_INFINITY;
        }

        let groups = match &self.constraints {
            Some(c) => match CladeGroups::new(tree, c) {
                Ok(g) => Some(g),
                Err(_) => return f64::NEG_INFINITY,
            },
            None => None,
        };

        let candidates: Vec<NodeId> = (0..tree.node_count())
            .filter(|&n| Self::eligible(tree, n, groups.as_ref()))
            .collect();
        if candidates.is_empty() {
            return f64::NEG_INFINITY;
        }
        let node = candidates[rng.gen_range(0..candidates.len())];

        let parent = match tree.parent(node) {
            Some(p) => p,
            None => return f64::NEG_INFINITY,
        };
        let grandparent = match tree.parent(parent) {
            Some(g) => g,
            None => return f64::NEG_INFINITY,
        };
        let uncle = tree.other_child(grandparent, parent);
        let sibling = tree.other_child(parent, node);

        let upper = tree.height(grandparent);
        let min_forward = tree.height(uncle).max(tree.height(sibling));
        let min_reverse = tree.height(node).max(tree.height(sibling));
        let range_forward = upper - min_forward;
        let range_reverse = upper - min_reverse;
        if range_forward <= 0.0 || range_reverse <= 0.0 {
            return f64::NEG_INFINITY;
        }

        let u: f64 = rng.gen_range(f64::EPSILON..1.0);
        tree.set_height(parent, min_forward + u * range_forward);

        // swap the node with its uncle
        tree.replace_child(parent, node, uncle);
        tree.replace_child(grandparent, uncle, node);

        (range_forward / range_reverse).ln()
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

//! Subtree prune-and-regraft move.
//!
//! Detaches a subtree and reattaches it on another edge at exactly the
//! height it was pruned from, so node heights never change and the move
//! is symmetric (Hastings ratio 0). Source and destination are drawn
//! uniformly; incompatible draws are retried up to a budget, after which
//! the proposal auto-rejects.

use rand::{Rng, RngCore};

use crate::operator::{Operator, Tuning};
use crate::state::ChainState;

/// Default number of (source, destination) draws before giving up.
pub const DEFAULT_MAX_TRIES: u32 = 1000;

/// Height-preserving prune-and-regraft.
pub struct SubtreePruneRegraft {
    name: String,
    max_tries: u32,
    tuning: Tuning,
}

impl SubtreePruneRegraft {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            max_tries: DEFAULT_MAX_TRIES,
            tuning: Tuning::new(1.0),
        }
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }
}

impl Operator for SubtreePruneRegraft {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&mut self, state: &mut ChainState, rng: &mut dyn RngCore) -> f64 {
        let tree = &mut state.tree;
        if tree.leaf_count() < 3 {
            return f64::NEG_INFINITY;
        }
        let n = tree.node_count();
        let root = tree.root();

        for _ in 0..self.max_tries {
            // prune target: any node with a grandparent
            let node = loop {
                let cand = rng.gen_range(0..n);
                if cand != root && tree.parent(cand) != Some(root) {
                    break cand;
                }
            };
            let father = match tree.parent(node) {
                Some(f) => f,
                None => continue,
            };
            let grandfather = match tree.parent(father) {
                Some(g) => g,
                None => continue,
            };
            let brother = tree.other_child(father, node);
            let height_father = tree.height(father);

            // destination edge: must span the pruned height and not touch
            // the pruned branch
            let new_child = rng.gen_range(0..n);
            if new_child == root || new_child == father {
                continue;
            }
            let new_grandfather = match tree.parent(new_child) {
                Some(p) => p,
                None => continue,
            };
            if new_grandfather == father
                || tree.height(new_child) >= height_father
                || tree.height(new_grandfather) <= height_father
            {
                continue;
            }

            tree.replace_child(grandfather, father, brother);
            tree.replace_child(new_grandfather, new_child, father);
            tree.replace_child(father, brother, new_child);
            return 0.0;
        }

        f64::NEG_INFINITY
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{NodeId, TimeTree};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn caterpillar(n_tips: usize) -> TimeTree {
        let mut tree = TimeTree::new(n_tips as f64 - 1.0);
        let mut spine = tree.root();
        for i in 0..n_tips - 1 {
            let h = tree.height(spine);
            tree.add_child(spine, Some(format!("t{i}")), 0.0).unwrap();
            if i < n_tips - 2 {
                spine = tree.add_child(spine, None, h - 1.0).unwrap();
            } else {
                tree.add_child(spine, Some(format!("t{}", n_tips - 1)), 0.0)
                    .unwrap();
            }
        }
        tree
    }

    fn equal_height_tree() -> TimeTree {
        // every internal node at the same height, so no destination edge
        // strictly spans a pruned height
        let mut tree = TimeTree::new(1.0);
        let root = tree.root();
        let left = tree.add_child(root, None, 1.0).unwrap();
        let right = tree.add_child(root, None, 1.0).unwrap();
        for (p, names) in [(left, ["a", "b"]), (right, ["c", "d"])] {
            for name in names {
                tree.add_child(p, Some(name.into()), 0.0).unwrap();
            }
        }
        tree
    }

    fn tips_below(tree: &TimeTree, node: NodeId) -> Vec<String> {
        let n = tree.get_node(node).unwrap();
        if n.is_leaf() {
            return vec![n.name.clone().unwrap()];
        }
        let mut tips: Vec<String> = n
            .children
            .iter()
            .flat_map(|&c| tips_below(tree, c))
            .collect();
        tips.sort();
        tips
    }

    /// Clades listed from the lowest internal node up, so trees that
    /// differ only in the height order of their clades get distinct keys.
    fn ranked_signature(tree: &TimeTree) -> String {
        let mut clades: Vec<(f64, String)> = tree
            .internal_nodes()
            .into_iter()
            .map(|n| (tree.height(n), tips_below(tree, n).join(",")))
            .collect();
        clades.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        clades
            .into_iter()
            .map(|(_, c)| c)
            .collect::<Vec<_>>()
            .join("|")
    }

    #[test]
    fn flat_target_makes_ranked_topologies_equiprobable() {
        let mut state = ChainState::new(caterpillar(4));
        let mut op = SubtreePruneRegraft::new("spr");
        let mut rng = StdRng::seed_from_u64(42);

        let burnin = 500;
        let total = 50_000;
        let mut counts: HashMap<String, u32> = HashMap::new();
        for i in 0..burnin + total {
            let snapshot = state.clone();
            if op.propose(&mut state, &mut rng) == f64::NEG_INFINITY {
                op.reject();
                state = snapshot;
            } else {
                // Hastings ratio 0 against a constant posterior
                op.accept(&state);
            }
            if i >= burnin {
                *counts.entry(ranked_signature(&state.tree)).or_insert(0) += 1;
            }
        }

        // 4 tips admit 18 ranked labelled topologies; regrafting at the
        // pruned height is symmetric, so each should come up equally often
        assert_eq!(counts.len(), 18, "{counts:?}");
        for (sig, n) in &counts {
            let freq = *n as f64 / total as f64;
            assert!((freq - 1.0 / 18.0).abs() < 0.012, "{sig}: {freq}");
        }
    }

    #[test]
    fn long_run_keeps_the_tree_valid() {
        let mut state = ChainState::new(caterpillar(8));
        let mut op = SubtreePruneRegraft::new("spr");
        let mut rng = StdRng::seed_from_u64(2024);

        for _ in 0..1000 {
            let snapshot = state.clone();
            let heights_before = state.tree.heights();
            let log_hr = op.propose(&mut state, &mut rng);
            if log_hr == f64::NEG_INFINITY {
                op.reject();
                state = snapshot;
                continue;
            }
            assert_eq!(log_hr, 0.0);
            // regrafting at the pruned height never moves a node in time
            assert_eq!(state.tree.heights(), heights_before);
            assert!(state.tree.check_heights().is_ok());
            assert!(state.tree.check_binary().is_ok());
            assert_eq!(state.tree.node_count(), 15);
            op.accept(&state);
        }
        assert!(op.tuning.accepted() > 0);
    }

    #[test]
    fn equal_internal_heights_exhaust_the_budget() {
        let mut state = ChainState::new(equal_height_tree());
        let mut op = SubtreePruneRegraft::new("spr").with_max_tries(50);
        let mut rng = StdRng::seed_from_u64(3);
        let mut rejections = 0;
        for _ in 0..20 {
            if op.propose(&mut state, &mut rng) == f64::NEG_INFINITY {
                op.reject();
                rejections += 1;
            }
        }
        assert_eq!(rejections, 20);
    }

    #[test]
    fn two_tip_tree_auto_rejects() {
        let mut tree = TimeTree::new(1.0);
        let root = tree.root();
        tree.add_child(root, Some("a".into()), 0.0).unwrap();
        tree.add_child(root, Some("b".into()), 0.0).unwrap();
        let mut state = ChainState::new(tree);
        let mut op = SubtreePruneRegraft::new("spr");
        let mut rng = StdRng::seed_from_u64(8);
        assert_eq!(op.propose(&mut state, &mut rng), f64::NEG_INFINITY);
    }
}

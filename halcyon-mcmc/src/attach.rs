//! Distance-guided clade reattachment.
//!
//! Detaches a clade and reattaches it at the same height on another edge,
//! like a prune-and-regraft, but the destination edge is drawn with
//! probability proportional to the inverse distance between the moving
//! clade and the candidate clade. The Hastings ratio is the log ratio of
//! the reverse edge's selection probability to the forward one. With the
//! uniform provider the bias disappears and destinations are equiprobable.

use rand::{Rng, RngCore};

use halcyon_core::Result;

use crate::constraint::CladeGroups;
use crate::distance::{clade_summary, CladeSummary, DistanceProvider, UniformDistance};
use crate::operator::{Operator, Tuning};
use crate::state::ChainState;
use crate::tree::{NodeId, TimeTree};

const MAX_NODE_TRIES: u32 = 1000;

/// Reattaches clades on edges chosen by inverse data distance.
pub struct AttachOperator {
    name: String,
    provider: Box<dyn DistanceProvider>,
    tips_only: bool,
    constraints: Option<Vec<Vec<String>>>,
    tuning: Tuning,
}

impl AttachOperator {
    /// Uniform-distance variant; destination edges are equally likely.
    pub fn uniform(name: &str) -> Self {
        Self {
            name: name.to_string(),
            provider: Box::new(UniformDistance),
            tips_only: false,
            constraints: None,
            tuning: Tuning::new(1.0),
        }
    }

    /// Distance-guided variant. `tree` is the starting tree, used to
    /// check the provider can summarize every tip.
    pub fn guided(
        name: &str,
        provider: Box<dyn DistanceProvider>,
        tree: &TimeTree,
    ) -> Result<Self> {
        provider.init(tree)?;
        Ok(Self {
            name: name.to_string(),
            provider,
            tips_only: false,
            constraints: None,
            tuning: Tuning::new(1.0),
        })
    }

    /// Only detach tips (their single-taxon clades).
    pub fn tips_only(mut self) -> Self {
        self.tips_only = true;
        self
    }

    /// Respect monophyly constraints: source and destination edges must
    /// share a clade group.
    pub fn with_constraints(
        mut self,
        tree: &TimeTree,
        constraints: Vec<Vec<String>>,
    ) -> Result<Self> {
        CladeGroups::new(tree, &constraints)?;
        self.constraints = Some(constraints);
        Ok(self)
    }

    fn eligible(&self, tree: &TimeTree, node: NodeId, groups: Option<&CladeGroups>) -> bool {
        if self.tips_only
            && !tree
                .get_node(node)
                .map(|n| n.is_leaf())
                .unwrap_or(false)
        {
            return false;
        }
        let parent = match tree.parent(node) {
            Some(p) => p,
            None => return false,
        };
        let grandparent = match tree.parent(parent) {
            Some(g) => g,
            None => return false,
        };
        match groups {
            Some(g) => g.same_group(parent, grandparent),
            None => true,
        }
    }

    /// Candidate destination siblings for detaching `node`: every `n`
    /// whose edge strictly spans the detach height and, under
    /// constraints, whose parent shares the moving edge's group.
    fn candidates(
        &self,
        tree: &TimeTree,
        node: NodeId,
        parent: NodeId,
        groups: Option<&CladeGroups>,
    ) -> Vec<NodeId> {
        let detach_height = tree.height(parent);
        (0..tree.node_count())
            .filter(|&n| n != node && n != parent)
            .filter(|&n| tree.height(n) < detach_height)
            .filter(|&n| match tree.parent(n) {
                Some(p) => {
                    tree.height(p) > detach_height
                        && match groups {
                            Some(g) => g.same_group(p, parent),
                            None => true,
                        }
                }
                None => false,
            })
            .collect()
    }

    /// Detach `node`'s parent edge and make `node` the sibling of
    /// `new_sibling`, keeping the parent's height.
    fn reattach(tree: &mut TimeTree, node: NodeId, new_sibling: NodeId) {
        let parent = match tree.parent(node) {
            Some(p) => p,
            None => return,
        };
        let grandparent = match tree.parent(parent) {
            Some(g) => g,
            None => return,
        };
        let brother = tree.other_child(parent, node);

        tree.replace_child(grandparent, parent, brother);
        // resolve the destination parent after the detach so reattaching
        // next to the old sibling round-trips
        let destination = match tree.parent(new_sibling) {
            Some(p) => p,
            None => return,
        };
        tree.replace_child(destination, new_sibling, parent);
        tree.replace_child(parent, brother, new_sibling);
    }
}

impl Operator for AttachOperator {
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

        let movable: Vec<NodeId> = (0..tree.node_count())
            .filter(|&n| self.eligible(tree, n, groups.as_ref()))
            .collect();
        if movable.is_empty() {
            return f64::NEG_INFINITY;
        }

        let mut node = movable[0];
        let mut cans = Vec::new();
        let mut found = false;
        for _ in 0..MAX_NODE_TRIES {
            node = movable[rng.gen_range(0..movable.len())];
            let parent = match tree.parent(node) {
                Some(p) => p,
                None => continue,
            };
            cans = self.candidates(tree, node, parent, groups.as_ref());
            if !cans.is_empty() {
                found = true;
                break;
            }
        }
        if !found {
            return f64::NEG_INFINITY;
        }
        let parent = match tree.parent(node) {
            Some(p) => p,
            None => return f64::NEG_INFINITY,
        };
        let brother = tree.other_child(parent, node);

        if cans.len() == 1 {
            Self::reattach(tree, node, cans[0]);
            return 0.0;
        }

        let mut summaries: Vec<CladeSummary> = match self.provider.init(tree) {
            Ok(s) => s,
            Err(_) => return f64::NEG_INFINITY,
        };
        clade_summary(self.provider.as_ref(), tree, &mut summaries, tree.root());

        let weights: Vec<f64> = cans
            .iter()
            .map(|&n| 1.0 / self.provider.dist(&summaries[node], &summaries[n]))
            .collect();
        let tot: f64 = weights.iter().sum();
        if !(tot > 0.0) {
            return f64::NEG_INFINITY;
        }

        // cumulative-weight draw
        let target = rng.gen::<f64>() * tot;
        let mut acc = 0.0;
        let mut chosen = cans.len() - 1;
        for (k, w) in weights.iter().enumerate() {
            acc += w;
            if target < acc {
                chosen = k;
                break;
            }
        }
        let new_sibling = cans[chosen];

        // reverse move: from the new position, the old site is reached by
        // picking the former sibling's edge
        let p_forward = weights[chosen] / tot;
        let w_back = 1.0 / self.provider.dist(&summaries[node], &summaries[brother]);
        let reverse_tot = tot + w_back - weights[chosen];
        let p_reverse = w_back / reverse_tot;

        Self::reattach(tree, node, new_sibling);
        (p_reverse / p_forward).ln()
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
    use crate::distance::TraitDistance;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn six_taxon_tree() -> TimeTree {
        let mut tree = TimeTree::new(5.0);
        let root = tree.root();
        let left = tree.add_child(root, None, 3.0).unwrap();
        let right = tree.add_child(root, None, 4.0).unwrap();
        let ll = tree.add_child(left, None, 1.0).unwrap();
        tree.add_child(left, Some("c".into()), 0.0).unwrap();
        tree.add_child(ll, Some("a".into()), 0.0).unwrap();
        tree.add_child(ll, Some("b".into()), 0.0).unwrap();
        let rr = tree.add_child(right, None, 2.0).unwrap();
        tree.add_child(right, Some("f".into()), 0.0).unwrap();
        tree.add_child(rr, Some("d".into()), 0.0).unwrap();
        tree.add_child(rr, Some("e".into()), 0.0).unwrap();
        tree
    }

    #[test]
    fn uniform_attach_keeps_the_tree_valid() {
        let mut state = ChainState::new(six_taxon_tree());
        let mut op = AttachOperator::uniform("attach");
        let mut rng = StdRng::seed_from_u64(99);

        let mut moved = 0;
        for _ in 0..1000 {
            let snapshot = state.clone();
            let heights_before = state.tree.heights();
            let log_hr = op.propose(&mut state, &mut rng);
            if log_hr == f64::NEG_INFINITY {
                op.reject();
                state = snapshot;
                continue;
            }
            assert!(log_hr.is_finite());
            assert_eq!(state.tree.heights(), heights_before);
            assert!(state.tree.check_heights().is_ok());
            assert!(state.tree.check_binary().is_ok());
            assert_eq!(state.tree.node_count(), 11);
            op.accept(&state);
            moved += 1;
        }
        assert!(moved > 0);
    }

    #[test]
    fn guided_attach_accepts_a_trait_provider() {
        let mut tree = six_taxon_tree();
        let leaves = tree.leaves();
        for (k, id) in leaves.into_iter().enumerate() {
            tree.get_node_mut(id)
                .unwrap()
                .metadata
                .insert("lat".into(), k as f64);
        }
        let provider = Box::new(TraitDistance::new("lat"));
        let mut op = AttachOperator::guided("gattach", provider, &tree).unwrap();
        let mut state = ChainState::new(tree);
        let mut rng = StdRng::seed_from_u64(5);

        for _ in 0..500 {
            let snapshot = state.clone();
            let log_hr = op.propose(&mut state, &mut rng);
            if log_hr == f64::NEG_INFINITY || state.tree.check_heights().is_err() {
                op.reject();
                state = snapshot;
                continue;
            }
            assert!(log_hr.is_finite());
            op.accept(&state);
        }
    }

    #[test]
    fn missing_trait_fails_at_setup() {
        let tree = six_taxon_tree();
        let provider = Box::new(TraitDistance::new("lat"));
        assert!(AttachOperator::guided("gattach", provider, &tree).is_err());
    }

    #[test]
    fn constrained_attach_preserves_the_clade() {
        let tree = six_taxon_tree();
        let clade: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let mut op = AttachOperator::uniform("cattach")
            .with_constraints(&tree, vec![clade.clone()])
            .unwrap();
        let mut state = ChainState::new(tree);
        let mut rng = StdRng::seed_from_u64(31);

        for _ in 0..500 {
            let snapshot = state.clone();
            let log_hr = op.propose(&mut state, &mut rng);
            if log_hr == f64::NEG_INFINITY {
                op.reject();
                state = snapshot;
                continue;
            }
            op.accept(&state);
            let groups = CladeGroups::new(&state.tree, &[clade.clone()]).unwrap();
            let members = (0..state.tree.node_count())
                .filter(|&n| groups.group(n) == Some(0))
                .count();
            // 3 tips plus 2 internal nodes when monophyletic
            assert_eq!(members, 5);
        }
    }

    #[test]
    fn tips_only_moves_only_leaves() {
        let mut state = ChainState::new(six_taxon_tree());
        let leaf_names_before = state.tree.leaf_names();
        let mut op = AttachOperator::uniform("tattach").tips_only();
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..200 {
            let snapshot = state.clone();
            let log_hr = op.propose(&mut state, &mut rng);
            if log_hr == f64::NEG_INFINITY {
                op.reject();
                state = snapshot;
                continue;
            }
            op.accept(&state);
            assert!(state.tree.check_binary().is_ok());
            assert_eq!(state.tree.leaf_names(), leaf_names_before);
        }
    }
}

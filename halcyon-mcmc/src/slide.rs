//! Subtree-slide move.
//!
//! Slides the parent of a randomly chosen non-root node up or down in
//! time. A slide past the grandparent walks up the ancestor chain and
//! reattaches there, possibly making the slid parent the new root; a
//! slide below the sibling picks a destination edge uniformly among those
//! the new height crosses. The Hastings ratio accounts for the number of
//! edges the reverse move could have come from.

use rand::{Rng, RngCore};
use rand_distr::StandardNormal;

use halcyon_core::{HalcyonError, Result};

use crate::constraint::CladeGroups;
use crate::operator::{Operator, Tuning};
use crate::state::ChainState;
use crate::tree::{NodeId, TimeTree};

/// Slides an internal node's height along its branch, rearranging the
/// topology when the new height crosses other edges.
pub struct SubtreeSlide {
    name: String,
    gaussian: bool,
    tuning: Tuning,
    constraints: Option<Vec<Vec<String>>>,
}

impl SubtreeSlide {
    /// `size` is the initial slide window; it is tuned towards the target
    /// acceptance rate. `gaussian` selects a Gaussian delta over a
    /// uniform one.
    pub fn new(name: &str, size: f64, gaussian: bool) -> Result<Self> {
        if !(size > 0.0) {
            return Err(HalcyonError::InvalidInput(format!(
                "slide size must be positive, got {size}"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            gaussian,
            tuning: Tuning::new(size),
            constraints: None,
        })
    }

    /// Restricted variant that only slides edges lying inside a single
    /// monophyly constraint group. `tree` is the starting tree, used to
    /// validate the constraint tip names up front.
    pub fn restricted(
        name: &str,
        size: f64,
        gaussian: bool,
        tree: &TimeTree,
        constraints: Vec<Vec<String>>,
    ) -> Result<Self> {
        CladeGroups::new(tree, &constraints)?;
        let mut op = Self::new(name, size, gaussian)?;
        op.constraints = Some(constraints);
        Ok(op)
    }

    pub fn size(&self) -> f64 {
        self.tuning.step_size()
    }

    fn delta(&self, rng: &mut dyn RngCore) -> f64 {
        let size = self.tuning.step_size();
        if self.gaussian {
            let eps: f64 = rng.sample(StandardNormal);
            eps * size
        } else {
            rng.gen::<f64>() * size - size / 2.0
        }
    }
}

impl Operator for SubtreeSlide {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&mut self, state: &mut ChainState, rng: &mut dyn RngCore) -> f64 {
        let tree = &mut state.tree;
        if tree.node_count() < 3 {
            return f64::NEG_INFINITY;
        }

        let groups = match &self.constraints {
            Some(c) => match CladeGroups::new(tree, c) {
                Ok(g) => Some(g),
                Err(_) => return f64::NEG_INFINITY,
            },
            None => None,
        };

        // choose the node to slide, avoiding the root
        let node = match &groups {
            Some(g) => {
                let candidates: Vec<NodeId> = (0..tree.node_count())
                    .filter(|&n| g.movable(tree, n))
                    .collect();
                if candidates.is_empty() {
                    return f64::NEG_INFINITY;
                }
                candidates[rng.gen_range(0..candidates.len())]
            }
            None => loop {
                let n = rng.gen_range(0..tree.node_count());
                if n != tree.root() {
                    break n;
                }
            },
        };

        let parent = match tree.parent(node) {
            Some(p) => p,
            None => return f64::NEG_INFINITY,
        };
        let sibling = tree.other_child(parent, node);
        let grandparent = tree.parent(parent);

        let delta = self.delta(rng);
        let old_height = tree.height(parent);
        let new_height = old_height + delta;

        if delta > 0.0 {
            match grandparent {
                Some(gp) if tree.height(gp) < new_height => {
                    // walk up until an ancestor spans the new height
                    let mut new_parent = Some(gp);
                    let mut new_child = parent;
                    while let Some(np) = new_parent {
                        if tree.height(np) >= new_height {
                            break;
                        }
                        new_child = np;
                        new_parent = tree.parent(np);
                    }

                    // reattaching outside the slid node's group would
                    // break a constrained clade
                    if let Some(g) = &groups {
                        if !g.same_group(node, new_child) {
                            return f64::NEG_INFINITY;
                        }
                    }

                    match new_parent {
                        None => {
                            // the slid parent becomes the new root
                            tree.replace_child(parent, sibling, new_child);
                            tree.replace_child(gp, parent, sibling);
                            tree.set_root(parent);
                        }
                        Some(np) => {
                            tree.replace_child(parent, sibling, new_child);
                            tree.replace_child(gp, parent, sibling);
                            tree.replace_child(np, new_child, parent);
                        }
                    }
                    tree.set_height(parent, new_height);

                    let sources = tree.intersecting_edges(new_child, old_height, None);
                    -((sources as f64).ln())
                }
                _ => {
                    tree.set_height(parent, new_height);
                    0.0
                }
            }
        } else {
            if tree.height(node) > new_height {
                return f64::NEG_INFINITY;
            }
            if tree.height(sibling) > new_height {
                let mut hits = Vec::new();
                let destinations = tree.intersecting_edges(sibling, new_height, Some(&mut hits));
                if hits.is_empty() {
                    return f64::NEG_INFINITY;
                }
                let new_child = hits[rng.gen_range(0..hits.len())];
                let new_parent = match tree.parent(new_child) {
                    Some(p) => p,
                    None => return f64::NEG_INFINITY,
                };
                // the destination edge must lie in the slid node's group,
                // otherwise the move would break a constrained clade
                if let Some(g) = &groups {
                    if !g.same_group(node, new_child) {
                        return f64::NEG_INFINITY;
                    }
                }

                match grandparent {
                    None => {
                        // the sibling becomes the new root
                        tree.replace_child(parent, sibling, new_child);
                        tree.replace_child(new_parent, new_child, parent);
                        tree.set_root(sibling);
                    }
                    Some(gp) => {
                        tree.replace_child(parent, sibling, new_child);
                        tree.replace_child(gp, parent, sibling);
                        tree.replace_child(new_parent, new_child, parent);
                    }
                }
                tree.set_height(parent, new_height);
                (destinations as f64).ln()
            } else {
                tree.set_height(parent, new_height);
                0.0
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
}

// ── Tests ──────────────────────────────────────────────────────────────────

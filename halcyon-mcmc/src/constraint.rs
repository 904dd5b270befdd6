//! Monophyly constraint bookkeeping for restricted topology moves.
//!
//! A constraint is a set of tip names that must form a clade. Every node
//! maps to the smallest constraint whose tips are a superset of the
//! node's descendant tips, or to `None` when only the (trivially
//! monophyletic) root clade encloses it. Topology operators use the
//! mapping to decide which edges may be rearranged without breaking a
//! constraint: two nodes are exchangeable when they fall in the same
//! group.

use std::collections::HashSet;

use halcyon_core::{HalcyonError, Result};

use crate::tree::{NodeId, TimeTree};

/// Node-to-constraint-group mapping for one tree shape.
///
/// The tree must already satisfy every constraint; the mapping is
/// recomputed after topology changes.
#[derive(Debug, Clone)]
pub struct CladeGroups {
    group: Vec<Option<usize>>,
}

impl CladeGroups {
    /// Build the mapping with a postorder set-intersection sweep. Fails
    /// when a constraint names a tip absent from the tree or lists a tip
    /// twice.
    pub fn new(tree: &TimeTree, constraints: &[Vec<String>]) -> Result<Self> {
        let mut sets: Vec<HashSet<&str>> = Vec::with_capacity(constraints.len());
        for (k, names) in constraints.iter().enumerate() {
            let set: HashSet<&str> = names.iter().map(String::as_str).collect();
            if set.len() != names.len() {
                return Err(HalcyonError::InvalidInput(format!(
                    "constraint {k} lists a tip more than once"
                )));
            }
            sets.push(set);
        }
        let tip_names: HashSet<String> = tree.leaf_names().into_iter().collect();
        for (k, set) in sets.iter().enumerate() {
            for name in set {
                if !tip_names.contains(*name) {
                    return Err(HalcyonError::InvalidInput(format!(
                        "constraint {k} names unknown tip {name:?}"
                    )));
                }
            }
        }

        // memberships[n] holds the constraints containing every tip below n
        let mut memberships: Vec<Vec<usize>> = vec![Vec::new(); tree.node_count()];
        let mut group: Vec<Option<usize>> = vec![None; tree.node_count()];
        for id in tree.iter_postorder() {
            let node = match tree.get_node(id) {
                Some(n) => n,
                None => continue,
            };
            let member: Vec<usize> = if node.is_leaf() {
                let name = node.name.as_deref().unwrap_or("");
                sets.iter()
                    .enumerate()
                    .filter(|(_, s)| s.contains(name))
                    .map(|(k, _)| k)
                    .collect()
            } else {
                let mut iter = node.children.iter();
                let mut acc: Vec<usize> = iter
                    .next()
                    .map(|&c| memberships[c].clone())
                    .unwrap_or_default();
                for &c in iter {
                    acc.retain(|k| memberships[c].contains(k));
                }
                acc
            };
            group[id] = member
                .iter()
                .copied()
                .min_by_key(|&k| sets[k].len());
            memberships[id] = member;
        }
        Ok(Self { group })
    }

    /// Smallest enclosing constraint of `node`, or `None` for the root group.
    pub fn group(&self, node: NodeId) -> Option<usize> {
        self.group.get(node).copied().flatten()
    }

    pub fn same_group(&self, a: NodeId, b: NodeId) -> bool {
        self.group(a) == self.group(b)
    }

    /// A node is movable when relinking the edge above it cannot split a
    /// constrained clade, which holds exactly when it shares its parent's
    /// group.
    pub fn movable(&self, tree: &TimeTree, node: NodeId) -> bool {
        match tree.parent(node) {
            Some(p) => self.same_group(node, p),
            None => false,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TimeTree;

    // ((a,b),(c,d)) with the root at height 3.
    fn four_tips() -> TimeTree {
        let mut tree = TimeTree::new(3.0);
        let root = tree.root();
        let left = tree.add_child(root, None, 1.0).unwrap();
        let right = tree.add_child(root, None, 2.0).unwrap();
        tree.add_child(left, Some("a".into()), 0.0).unwrap();
        tree.add_child(left, Some("b".into()), 0.0).unwrap();
        tree.add_child(right, Some("c".into()), 0.0).unwrap();
        tree.add_child(right, Some("d".into()), 0.0).unwrap();
        tree
    }

    fn leaf(tree: &TimeTree, name: &str) -> NodeId {
        tree.leaves()
            .into_iter()
            .find(|&id| tree.get_node(id).unwrap().name.as_deref() == Some(name))
            .unwrap()
    }

    #[test]
    fn unconstrained_tree_is_one_group() {
        let tree = four_tips();
        let groups = CladeGroups::new(&tree, &[]).unwrap();
        for id in 0..tree.node_count() {
            assert_eq!(groups.group(id), None);
        }
        assert!(groups.movable(&tree, leaf(&tree, "a")));
        assert!(!groups.movable(&tree, tree.root()));
    }

    #[test]
    fn members_map_to_their_clade_and_outsiders_to_the_root_group() {
        let tree = four_tips();
        let ab = vec!["a".to_string(), "b".to_string()];
        let groups = CladeGroups::new(&tree, &[ab]).unwrap();

        let a = leaf(&tree, "a");
        let b = leaf(&tree, "b");
        let parent_ab = tree.parent(a).unwrap();
        assert_eq!(groups.group(a), Some(0));
        assert_eq!(groups.group(b), Some(0));
        assert_eq!(groups.group(parent_ab), Some(0));
        assert_eq!(groups.group(leaf(&tree, "c")), None);
        assert_eq!(groups.group(tree.root()), None);

        // the clade top may not cross out of its parent's group
        assert!(!groups.movable(&tree, parent_ab));
        assert!(groups.movable(&tree, a));
        assert!(groups.same_group(a, b));
        assert!(!groups.same_group(a, leaf(&tree, "c")));
    }

    #[test]
    fn nested_constraints_prefer_the_smallest() {
        let tree = four_tips();
        let abcd = vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string(),
        ];
        let ab = vec!["a".to_string(), "b".to_string()];
        let groups = CladeGroups::new(&tree, &[abcd, ab]).unwrap();
        assert_eq!(groups.group(leaf(&tree, "a")), Some(1));
        assert_eq!(groups.group(leaf(&tree, "c")), Some(0));
        assert_eq!(groups.group(tree.root()), Some(0));
    }

    #[test]
    fn unknown_and_duplicate_tips_are_rejected() {
        let tree = four_tips();
        let bad = vec!["a".to_string(), "z".to_string()];
        assert!(CladeGroups::new(&tree, &[bad]).is_err());
        let dup = vec!["a".to_string(), "a".to_string()];
        assert!(CladeGroups::new(&tree, &[dup]).is_err());
    }
}

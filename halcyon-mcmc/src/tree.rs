//! Time-calibrated binary tree stored as a node arena.
//!
//! Nodes live in a flat `Vec<TimeNode>` and are referenced by `NodeId`
//! (a `usize` index), so topology moves are plain index relinking and the
//! chain driver can roll back a rejected proposal by swapping in a cloned
//! arena. Heights are measured backwards in time: tips sit at or near 0,
//! the root is the oldest node, and `height(child) <= height(parent)`
//! holds on every edge.

use std::collections::BTreeMap;

use halcyon_core::{HalcyonError, Result, Summarizable};

/// Index into the tree's node arena.
pub type NodeId = usize;

/// A single node in a time tree.
#[derive(Debug, Clone)]
pub struct TimeNode {
    /// Index of this node in the arena.
    pub id: NodeId,
    /// Parent node (None for the root).
    pub parent: Option<NodeId>,
    /// Child nodes; empty for tips, exactly two otherwise.
    pub children: Vec<NodeId>,
    /// Age of this node (time before present).
    pub height: f64,
    /// Taxon label; set on tips.
    pub name: Option<String>,
    /// Per-tip trait values used by distance-guided operators.
    pub metadata: BTreeMap<String, f64>,
}

impl TimeNode {
    /// True if this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// True if this node has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A rooted, strictly bifurcating time tree.
#[derive(Debug, Clone)]
pub struct TimeTree {
    nodes: Vec<TimeNode>,
    root: NodeId,
}

impl TimeTree {
    /// Create a tree with a single unnamed root node at the given height.
    pub fn new(root_height: f64) -> Self {
        let root = TimeNode {
            id: 0,
            parent: None,
            children: Vec::new(),
            height: root_height,
            name: None,
            metadata: BTreeMap::new(),
        };
        Self {
            nodes: vec![root],
            root: 0,
        }
    }

    /// Create a tree from pre-built nodes and a root index.
    ///
    /// Validates parent/child agreement, strict bifurcation, and the
    /// height invariant.
    pub fn from_nodes(nodes: Vec<TimeNode>, root: NodeId) -> Result<Self> {
        if nodes.is_empty() {
            return Err(HalcyonError::InvalidInput("empty node list".into()));
        }
        if root >= nodes.len() {
            return Err(HalcyonError::InvalidInput(format!(
                "root index {} out of range ({})",
                root,
                nodes.len()
            )));
        }
        let tree = Self { nodes, root };
        tree.check_binary()?;
        tree.check_heights()?;
        Ok(tree)
    }

    /// Add a child to `parent` and return its `NodeId`.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: Option<String>,
        height: f64,
    ) -> Result<NodeId> {
        if parent >= self.nodes.len() {
            return Err(HalcyonError::InvalidInput(format!(
                "parent index {} out of range ({})",
                parent,
                self.nodes.len()
            )));
        }
        if self.nodes[parent].children.len() >= 2 {
            return Err(HalcyonError::InvalidInput(format!(
                "node {parent} already has two children"
            )));
        }
        let id = self.nodes.len();
        self.nodes.push(TimeNode {
            id,
            parent: Some(parent),
            children: Vec::new(),
            height,
            name,
            metadata: BTreeMap::new(),
        });
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    /// Access a node by id.
    pub fn get_node(&self, id: NodeId) -> Option<&TimeNode> {
        self.nodes.get(id)
    }

    /// Mutable access to a node by id.
    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut TimeNode> {
        self.nodes.get_mut(id)
    }

    /// The root node id.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Height of a node. Panics on an out-of-range id.
    pub fn height(&self, id: NodeId) -> f64 {
        self.nodes[id].height
    }

    /// Set the height of a node.
    pub fn set_height(&mut self, id: NodeId, height: f64) {
        self.nodes[id].height = height;
    }

    /// Parent of a node, if any.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// The sibling of `child` under `parent`.
    ///
    /// Panics if `child` is not a child of `parent` in a bifurcating tree.
    pub fn other_child(&self, parent: NodeId, child: NodeId) -> NodeId {
        let ch = &self.nodes[parent].children;
        if ch[0] == child {
            ch[1]
        } else {
            ch[0]
        }
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaf nodes.
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// All leaf node ids.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| n.id)
            .collect()
    }

    /// All internal node ids (root included).
    pub fn internal_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| !n.is_leaf())
            .map(|n| n.id)
            .collect()
    }

    /// Heights of all nodes, indexed by `NodeId`.
    pub fn heights(&self) -> Vec<f64> {
        self.nodes.iter().map(|n| n.height).collect()
    }

    /// Post-order (children before parent) traversal yielding node ids.
    pub fn iter_postorder(&self) -> impl Iterator<Item = NodeId> {
        let mut result = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            result.push(id);
            for &child in &self.nodes[id].children {
                stack.push(child);
            }
        }
        result.reverse();
        result.into_iter()
    }

    /// Most recent common ancestor of two nodes.
    pub fn mrca(&self, a: NodeId, b: NodeId) -> Result<NodeId> {
        if a >= self.nodes.len() || b >= self.nodes.len() {
            return Err(HalcyonError::InvalidInput("node id out of range".into()));
        }
        let mut ancestors_a = Vec::new();
        let mut cur = a;
        loop {
            ancestors_a.push(cur);
            match self.nodes[cur].parent {
                Some(p) => cur = p,
                None => break,
            }
        }
        cur = b;
        loop {
            if ancestors_a.contains(&cur) {
                return Ok(cur);
            }
            match self.nodes[cur].parent {
                Some(p) => cur = p,
                None => break,
            }
        }
        Ok(self.root)
    }

    /// Sorted list of leaf names (unnamed tips are excluded).
    pub fn leaf_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| n.is_leaf())
            .filter_map(|n| n.name.clone())
            .collect();
        names.sort();
        names
    }

    // ── Relinking primitives for topology operators ────────────────────

    /// In `parent`'s child list, replace `old_child` with `new_child` and
    /// point `new_child` back at `parent`.
    ///
    /// `old_child`'s parent link is left untouched; the caller is in the
    /// middle of a relinking sequence and decides where it goes.
    pub fn replace_child(&mut self, parent: NodeId, old_child: NodeId, new_child: NodeId) {
        for c in &mut self.nodes[parent].children {
            if *c == old_child {
                *c = new_child;
            }
        }
        self.nodes[new_child].parent = Some(parent);
    }

    /// Make `id` the root: clears its parent link and records it as root.
    pub fn set_root(&mut self, id: NodeId) {
        self.nodes[id].parent = None;
        self.root = id;
    }

    /// Remove `child` from `parent`'s child list.
    ///
    /// `child`'s parent link is left dangling for the caller to fix.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent].children.retain(|&c| c != child);
    }

    /// Append `child` under `parent` and set its parent link.
    pub fn push_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
    }

    /// Count edges whose height range spans `height` within the clade
    /// rooted at `node`, optionally collecting the lower endpoints.
    ///
    /// An edge (parent(n), n) intersects when
    /// `height(n) < height <= height(parent(n))`. Used by subtree-slide
    /// to enumerate reattachment destinations and to count reverse-move
    /// sources.
    pub fn intersecting_edges(
        &self,
        node: NodeId,
        height: f64,
        hits: Option<&mut Vec<NodeId>>,
    ) -> usize {
        let mut collected = hits;
        self.intersecting_edges_inner(node, height, &mut collected)
    }

    fn intersecting_edges_inner(
        &self,
        node: NodeId,
        height: f64,
        hits: &mut Option<&mut Vec<NodeId>>,
    ) -> usize {
        let parent = match self.nodes[node].parent {
            Some(p) => p,
            None => return 0,
        };
        if self.nodes[parent].height < height {
            return 0;
        }
        if self.nodes[node].height < height {
            if let Some(out) = hits.as_deref_mut() {
                out.push(node);
            }
            return 1;
        }
        let children = self.nodes[node].children.clone();
        children
            .iter()
            .map(|&c| self.intersecting_edges_inner(c, height, hits))
            .sum()
    }

    /// Multiply all internal node heights by `factor`.
    ///
    /// Checks the height invariant against the new heights before
    /// committing anything; returns the number of scaled nodes, or `None`
    /// if any edge would invert (the caller treats that as a rejected
    /// proposal).
    pub fn scale_internal_heights(&mut self, factor: f64) -> Option<usize> {
        if factor <= 0.0 {
            return None;
        }
        let scaled: Vec<f64> = self
            .nodes
            .iter()
            .map(|n| {
                if n.is_leaf() {
                    n.height
                } else {
                    n.height * factor
                }
            })
            .collect();
        for n in &self.nodes {
            if let Some(p) = n.parent {
                if scaled[n.id] > scaled[p] {
                    return None;
                }
            }
        }
        let mut count = 0;
        for n in &mut self.nodes {
            if !n.is_leaf() {
                n.height = scaled[n.id];
                count += 1;
            }
        }
        Some(count)
    }

    // ── Validation ─────────────────────────────────────────────────────

    /// Verify `height(child) <= height(parent)` on every edge.
    pub fn check_heights(&self) -> Result<()> {
        for n in &self.nodes {
            if n.height < 0.0 {
                return Err(HalcyonError::InvalidInput(format!(
                    "node {} has negative height {}",
                    n.id, n.height
                )));
            }
            if let Some(p) = n.parent {
                if n.height > self.nodes[p].height {
                    return Err(HalcyonError::InvalidInput(format!(
                        "node {} (height {}) is older than its parent {} (height {})",
                        n.id, n.height, p, self.nodes[p].height
                    )));
                }
            }
        }
        Ok(())
    }

    /// Verify every node has 0 or 2 children and links are consistent.
    pub fn check_binary(&self) -> Result<()> {
        for n in &self.nodes {
            if n.children.len() == 1 || n.children.len() > 2 {
                return Err(HalcyonError::InvalidInput(format!(
                    "node {} has {} children; expected 0 or 2",
                    n.id,
                    n.children.len()
                )));
            }
            for &c in &n.children {
                if c >= self.nodes.len() || self.nodes[c].parent != Some(n.id) {
                    return Err(HalcyonError::InvalidInput(format!(
                        "child link {} -> {} is not mirrored by a parent link",
                        n.id, c
                    )));
                }
            }
        }
        if self.nodes[self.root].parent.is_some() {
            return Err(HalcyonError::InvalidInput(
                "root node has a parent".into(),
            ));
        }
        Ok(())
    }
}

impl Summarizable for TimeTree {
    fn summary(&self) -> String {
        let leaves = self.leaf_count();
        format!(
            "TimeTree: {} nodes ({} tips, root height {:.4})",
            self.node_count(),
            leaves,
            self.nodes[self.root].height
        )
    }
}

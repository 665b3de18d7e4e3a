#![forbid(unsafe_code)]

//! Node sets for document-subset canonicalization.
//!
//! A `NodeSet` is the set of tree nodes a signature reference selects
//! after its transforms ran. Canonicalization renders only the nodes in
//! the set.

use crate::document::{NodeId, NodeKind, XmlTree};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet {
    nodes: HashSet<NodeId>,
}

impl NodeSet {
    /// Create an empty node set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node of the tree, comments included.
    pub fn all(tree: &XmlTree) -> Self {
        let mut nodes = HashSet::new();
        collect_subtree(tree.root(), tree, &mut nodes, true);
        Self { nodes }
    }

    /// Every node except comments. This is what `URI=""` selects.
    pub fn all_without_comments(tree: &XmlTree) -> Self {
        let mut nodes = HashSet::new();
        collect_subtree(tree.root(), tree, &mut nodes, false);
        Self { nodes }
    }

    /// The subtree rooted at `root`, without comments. This is what a
    /// bare-name `#id` reference selects.
    pub fn tree_without_comments(root: NodeId, tree: &XmlTree) -> Self {
        let mut nodes = HashSet::new();
        collect_subtree(root, tree, &mut nodes, false);
        Self { nodes }
    }

    /// The subtree rooted at `root`, comments included.
    pub fn tree_with_comments(root: NodeId, tree: &XmlTree) -> Self {
        let mut nodes = HashSet::new();
        collect_subtree(root, tree, &mut nodes, true);
        Self { nodes }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn insert(&mut self, id: NodeId) {
        self.nodes.insert(id);
    }

    /// Remove `root` and all of its descendants.
    pub fn remove_subtree(&mut self, root: NodeId, tree: &XmlTree) {
        self.nodes.remove(&root);
        for id in tree.descendants(root) {
            self.nodes.remove(&id);
        }
    }

    /// Compute self - other.
    pub fn subtract(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.difference(&other.nodes).copied().collect(),
        }
    }

    /// Compute the union of two node sets.
    pub fn union(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.union(&other.nodes).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Topmost element nodes of the set, in document order: elements in
    /// the set whose parent is not in the set.
    pub fn apex_elements(&self, tree: &XmlTree) -> Vec<NodeId> {
        let mut apexes: Vec<NodeId> = self
            .nodes
            .iter()
            .copied()
            .filter(|id| tree.element(*id).is_some())
            .filter(|id| tree.parent(*id).map_or(true, |p| !self.nodes.contains(&p) || tree.element(p).is_none()))
            .collect();
        apexes.sort();
        apexes
    }
}

fn collect_subtree(id: NodeId, tree: &XmlTree, set: &mut HashSet<NodeId>, include_comments: bool) {
    if !include_comments && matches!(tree.node_kind(id), Some(NodeKind::Comment(_))) {
        return;
    }
    set.insert(id);
    for child in tree.children(id) {
        collect_subtree(child, tree, set, include_comments);
    }
}

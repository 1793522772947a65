//! Root-to-leaf walks through the tree.

use branchwork_core::{NodeId, SimState, TreeError};

use crate::tree::Tree;

/// An ordered sequence of nodes from a root downwards.
///
/// A path is a snapshot: nodes added to the tree after it was built are
/// only seen through [`Path::last_node`], which continues along first
/// children. Rebuild with [`Tree::make_containing_path`] when the branch
/// of interest may have moved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Path {
    nodes: Vec<NodeId>,
}

impl Path {
    pub(crate) fn from_nodes(nodes: Vec<NodeId>) -> Self {
        Self { nodes }
    }

    /// Nodes in root-to-leaf order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// First node.
    pub fn root(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    /// Last node recorded when the path was built.
    pub fn last(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the path has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `node` lies on the path.
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// Position of `node` on the path.
    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| *n == node)
    }

    /// Append `node`, which must be a child of the current last node.
    pub fn extend_to<S: SimState>(&mut self, tree: &Tree<S>, node: NodeId) -> Result<(), TreeError> {
        let parent = tree.get(node)?.parent();
        if parent.is_none() || parent != self.last() {
            return Err(TreeError::NotOnPath(node));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// The current last node of the path, starting at `head`.
    ///
    /// `head` must lie on the path. From the recorded last node the walk
    /// continues live along first children, so growth since the path was
    /// built is picked up.
    pub fn last_node<S: SimState>(&self, tree: &Tree<S>, head: NodeId) -> Result<NodeId, TreeError> {
        let mut tip = match self.last() {
            Some(last) if self.contains(head) => last,
            _ => return Err(TreeError::NotOnPath(head)),
        };
        while let Some(&first) = tree.get(tip)?.children().first() {
            tip = first;
        }
        Ok(tip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Tick(f64);

    impl SimState for Tick {
        fn clock(&self) -> f64 {
            self.0
        }
    }

    #[test]
    fn last_node_follows_growth() {
        let mut tree = Tree::new();
        let root = tree.add_state(Tick(0.0), None, None).unwrap();
        let a = tree.add_state(Tick(1.0), Some(root), None).unwrap();
        let path = tree.make_containing_path(root).unwrap();
        assert_eq!(path.last(), Some(a));

        let b = tree.add_state(Tick(2.0), Some(a), None).unwrap();
        assert_eq!(path.last_node(&tree, root).unwrap(), b);
        assert_eq!(path.last_node(&tree, a).unwrap(), b);
    }

    #[test]
    fn last_node_rejects_foreign_head() {
        let mut tree = Tree::new();
        let root = tree.add_state(Tick(0.0), None, None).unwrap();
        let other = tree.add_state(Tick(0.0), None, None).unwrap();
        let path = tree.make_containing_path(root).unwrap();
        assert_eq!(
            path.last_node(&tree, other),
            Err(TreeError::NotOnPath(other))
        );
    }

    #[test]
    fn extend_to_requires_a_child_of_the_last_node() {
        let mut tree = Tree::new();
        let root = tree.add_state(Tick(0.0), None, None).unwrap();
        let mut path = tree.make_containing_path(root).unwrap();
        let a = tree.add_state(Tick(1.0), Some(root), None).unwrap();
        let b = tree.add_state(Tick(2.0), Some(a), None).unwrap();
        assert_eq!(path.extend_to(&tree, b), Err(TreeError::NotOnPath(b)));
        path.extend_to(&tree, a).unwrap();
        path.extend_to(&tree, b).unwrap();
        assert_eq!(path.nodes(), &[root, a, b]);
    }

    #[test]
    fn index_and_contains() {
        let mut tree = Tree::new();
        let root = tree.add_state(Tick(0.0), None, None).unwrap();
        let a = tree.add_state(Tick(1.0), Some(root), None).unwrap();
        let path = tree.make_containing_path(a).unwrap();
        assert_eq!(path.index_of(a), Some(1));
        assert!(path.contains(root));
        assert_eq!(path.len(), 2);
        assert!(!Path::default().contains(root));
    }
}

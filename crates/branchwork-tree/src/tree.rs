//! The tree: owner of every node and sole mutator of structure.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use branchwork_core::{NodeId, SimState, StepProfile, TreeError};

use crate::node::Node;
use crate::path::Path;

/// Append-mostly forest of simulation states.
///
/// Nodes are never removed. Every mutating method validates its input
/// before linking anything, so a failed call leaves the tree untouched.
/// Callers sharing a tree across threads go through
/// [`TreeLock`](crate::TreeLock).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(serialize = "S: Serialize", deserialize = "S: DeserializeOwned"))]
pub struct Tree<S> {
    nodes: Vec<Node<S>>,
    roots: Vec<NodeId>,
}

impl<S: SimState> Default for Tree<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SimState> Tree<S> {
    /// An empty tree.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root nodes in creation order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Option<&Node<S>> {
        self.nodes.get(id.index())
    }

    /// Look up a node, failing with [`TreeError::UnknownNode`].
    pub fn get(&self, id: NodeId) -> Result<&Node<S>, TreeError> {
        self.node(id).ok_or(TreeError::UnknownNode(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Node<S>, TreeError> {
        self.nodes
            .get_mut(id.index())
            .ok_or(TreeError::UnknownNode(id))
    }

    /// State payload of a node.
    pub fn state(&self, id: NodeId) -> Result<&S, TreeError> {
        self.get(id).map(Node::state)
    }

    /// Clock of a node's state.
    pub fn clock(&self, id: NodeId) -> Result<f64, TreeError> {
        self.get(id).map(Node::clock)
    }

    /// Every node, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Node<S>> {
        self.nodes.iter()
    }

    /// Every leaf in the tree, in creation order.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().filter(|n| n.is_leaf()).map(Node::id)
    }

    /// Add `state` as a new root.
    pub fn add_root(&mut self, state: S) -> NodeId {
        self.link(Node {
            id: self.next_id(),
            state,
            parent: None,
            children: Vec::new(),
            step_profile: None,
            end: None,
            touched: false,
            still_in_editing: false,
        })
    }

    /// Add `state` as a new child of `parent`, or as a new root.
    ///
    /// Fails with [`TreeError::InvalidState`] unless the state's clock
    /// strictly exceeds the parent's.
    pub fn add_state(
        &mut self,
        state: S,
        parent: Option<NodeId>,
        step_profile: Option<StepProfile>,
    ) -> Result<NodeId, TreeError> {
        if let Some(parent_id) = parent {
            let parent_clock = self.get(parent_id)?.clock();
            let clock = state.clock();
            // Written to reject NaN as well.
            if !(clock > parent_clock) {
                return Err(TreeError::InvalidState {
                    clock,
                    parent_clock,
                });
            }
        }
        Ok(self.link(Node {
            id: self.next_id(),
            state,
            parent,
            children: Vec::new(),
            step_profile,
            end: None,
            touched: false,
            still_in_editing: false,
        }))
    }

    /// Create an editable sibling of `template` holding a copy of its state.
    ///
    /// The new node has the template's parent (or is a new root), no step
    /// profile, and stays editable until [`finalize`](Tree::finalize).
    pub fn fork_to_edit(&mut self, template: NodeId) -> Result<NodeId, TreeError> {
        let source = self.get(template)?;
        let node = Node {
            id: self.next_id(),
            state: source.state.clone(),
            parent: source.parent,
            children: Vec::new(),
            step_profile: None,
            end: None,
            touched: true,
            still_in_editing: true,
        };
        Ok(self.link(node))
    }

    /// Mutate the state of a node that is still open for editing.
    ///
    /// The edit is applied to a copy and committed only if the new clock
    /// still exceeds the parent's. A node that already has children is
    /// refused, since they were stepped from the state as it stands.
    pub fn edit_state(&mut self, id: NodeId, edit: impl FnOnce(&mut S)) -> Result<(), TreeError> {
        let node = self.get(id)?;
        if !node.still_in_editing {
            return Err(TreeError::NotEditable(id));
        }
        if !node.children.is_empty() {
            return Err(TreeError::HasChildren(id));
        }
        let mut state = node.state.clone();
        edit(&mut state);
        let clock = state.clock();
        if let Some(parent) = node.parent {
            let parent_clock = self.clock(parent)?;
            if !(clock > parent_clock) {
                return Err(TreeError::InvalidState {
                    clock,
                    parent_clock,
                });
            }
        }
        self.get_mut(id)?.state = state;
        Ok(())
    }

    /// Close a node for editing. Idempotent.
    pub fn finalize(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.get_mut(id)?.still_in_editing = false;
        Ok(())
    }

    /// Mark `id` as the end of its branch under `step_profile`.
    ///
    /// Returns `true` if the mark was newly set. Repeated calls are no-ops
    /// and never change the recorded profile.
    pub fn make_end(
        &mut self,
        id: NodeId,
        step_profile: Option<StepProfile>,
    ) -> Result<bool, TreeError> {
        let node = self.get_mut(id)?;
        if node.end.is_some() {
            return Ok(false);
        }
        node.end = Some(step_profile);
        Ok(true)
    }

    /// Leaves reachable from `from` within `max_clock_distance`, each with
    /// its clock distance from `from`.
    ///
    /// `from` itself counts when it is a leaf. Subtrees are pruned as soon
    /// as their clock distance exceeds the limit, since clocks only grow
    /// along a branch.
    pub fn get_all_leaves(
        &self,
        from: NodeId,
        max_clock_distance: f64,
    ) -> Result<IndexMap<NodeId, f64>, TreeError> {
        let origin = self.get(from)?.clock();
        let mut leaves = IndexMap::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let node = self.get(id)?;
            let distance = node.clock() - origin;
            if distance > max_clock_distance {
                continue;
            }
            if node.is_leaf() {
                leaves.insert(id, distance);
            } else {
                // Reverse so children are visited in creation order.
                stack.extend(node.children.iter().rev().copied());
            }
        }
        Ok(leaves)
    }

    /// Path from the root through `id`, continued along first children
    /// to a leaf.
    pub fn make_containing_path(&self, id: NodeId) -> Result<Path, TreeError> {
        let mut nodes = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            nodes.push(current);
            cursor = self.get(current)?.parent;
        }
        nodes.reverse();
        let mut tip = id;
        while let Some(&first) = self.get(tip)?.children.first() {
            nodes.push(first);
            tip = first;
        }
        Ok(Path::from_nodes(nodes))
    }

    /// Rebuild a tree from nodes in id order, as yielded by
    /// [`iter`](Tree::iter). Roots are recovered from the parentless
    /// nodes and the result is validated.
    pub fn from_nodes(nodes: Vec<Node<S>>) -> Result<Self, TreeError> {
        let roots = nodes.iter().filter(|n| n.parent.is_none()).map(|n| n.id).collect();
        let tree = Self { nodes, roots };
        tree.validate()?;
        Ok(tree)
    }

    /// Check every link and clock. Used after restoring a persisted tree.
    pub fn validate(&self) -> Result<(), TreeError> {
        for (index, node) in self.nodes.iter().enumerate() {
            let corrupt = |reason: &str| TreeError::Corrupt {
                node: node.id,
                reason: reason.to_owned(),
            };
            if node.id.index() != index {
                return Err(corrupt("id does not match arena slot"));
            }
            match node.parent {
                None => {
                    if !self.roots.contains(&node.id) {
                        return Err(corrupt("parentless node missing from roots"));
                    }
                }
                Some(parent) => {
                    let parent = self.get(parent).map_err(|_| corrupt("dangling parent"))?;
                    if !parent.children.contains(&node.id) {
                        return Err(corrupt("parent does not list node as child"));
                    }
                    if !(node.clock() > parent.clock()) {
                        return Err(corrupt("clock does not exceed parent clock"));
                    }
                }
            }
            for child in &node.children {
                if self.node(*child).and_then(Node::parent) != Some(node.id) {
                    return Err(corrupt("child does not point back to node"));
                }
            }
        }
        Ok(())
    }

    fn next_id(&self) -> NodeId {
        // Arena slots are u32; four billion nodes is far past any
        // realistic tree held in memory.
        NodeId(self.nodes.len() as u32)
    }

    fn link(&mut self, node: Node<S>) -> NodeId {
        let id = node.id;
        match node.parent {
            Some(parent) => self.nodes[parent.index()].children.push(id),
            None => self.roots.push(id),
        }
        self.nodes.push(node);
        id
    }
}

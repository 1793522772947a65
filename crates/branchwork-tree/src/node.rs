//! A single node of the simulation tree.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use branchwork_core::{NodeId, SimState, StepProfile};

/// One state in the tree, plus its links and provenance.
///
/// Nodes are created only by [`Tree`](crate::Tree), which is the sole
/// mutator of structure. `children` only grows and the end mark is set at
/// most once.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(serialize = "S: Serialize", deserialize = "S: DeserializeOwned"))]
pub struct Node<S> {
    pub(crate) id: NodeId,
    pub(crate) state: S,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) step_profile: Option<StepProfile>,
    /// Set by `make_end`; holds the profile the branch ended under.
    pub(crate) end: Option<Option<StepProfile>>,
    pub(crate) touched: bool,
    pub(crate) still_in_editing: bool,
}

impl<S: SimState> Node<S> {
    /// This node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The state payload.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Clock of the state payload.
    pub fn clock(&self) -> f64 {
        self.state.clock()
    }

    /// Parent node, `None` for roots.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in creation order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The step profile that produced this node.
    ///
    /// `None` for roots and for nodes forked for editing.
    pub fn step_profile(&self) -> Option<&StepProfile> {
        self.step_profile.as_ref()
    }

    /// Whether the simulation ended at this node.
    pub fn ends(&self) -> bool {
        self.end.is_some()
    }

    /// The step profile under which the branch ended, if it ended under one.
    pub fn end_profile(&self) -> Option<&StepProfile> {
        self.end.as_ref().and_then(Option::as_ref)
    }

    /// Whether no children have been added yet.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether this node has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether the node was created by `fork_to_edit`.
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// Whether the node's state may still be edited.
    pub fn is_editable(&self) -> bool {
        self.still_in_editing
    }
}

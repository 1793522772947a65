//! Error types shared across the branchwork workspace.
//!
//! Organized by subsystem: tree mutation, history browsing and step
//! execution. Engine-level errors (wire, config, persistence) live in
//! `branchwork-engine` and wrap these.

use thiserror::Error;

use crate::id::NodeId;

/// Errors from mutating or querying a simulation tree.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TreeError {
    /// The node id does not exist in this tree.
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
    /// A new state's clock does not strictly exceed its parent's clock.
    #[error("invalid state: clock {clock} does not exceed parent clock {parent_clock}")]
    InvalidState {
        /// Clock of the rejected state.
        clock: f64,
        /// Clock of the parent it was meant to follow.
        parent_clock: f64,
    },
    /// The node already has successors, which were computed from its
    /// current state.
    #[error("node {0} already has children and can no longer be edited")]
    HasChildren(NodeId),
    /// The node is not open for editing.
    #[error("node {0} is not open for editing")]
    NotEditable(NodeId),
    /// The node does not lie on the given path.
    #[error("node {0} is not on the path")]
    NotOnPath(NodeId),
    /// A node's links or clocks are inconsistent (e.g. after a bad restore).
    #[error("corrupt tree at node {node}: {reason}")]
    Corrupt {
        /// The offending node.
        node: NodeId,
        /// What is inconsistent about it.
        reason: String,
    },
}

/// Errors from reading a branch's history.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum HistoryError {
    /// The history contains no states.
    #[error("history is empty")]
    Empty,
    /// The requested clock lies beyond the tail of the history.
    #[error("clock {requested} is beyond the history ceiling {ceiling}")]
    OutOfBounds {
        /// The clock that was asked for.
        requested: f64,
        /// Clock of the tail state.
        ceiling: f64,
    },
    /// The requested clock precedes the first state in the history.
    #[error("clock {requested} precedes the first recorded clock {floor}")]
    BeforeStart {
        /// The clock that was asked for.
        requested: f64,
        /// Clock of the first state.
        floor: f64,
    },
    /// No state has exactly the requested clock.
    #[error("no state with clock exactly {requested}")]
    NoExactMatch {
        /// The clock that was asked for.
        requested: f64,
    },
    /// Positional lookup past the end of the history.
    #[error("index {index} out of range for history of length {len}")]
    IndexOutOfRange {
        /// The index that was asked for.
        index: usize,
        /// Number of states available.
        len: usize,
    },
    /// The browser's tail is not on its path; the path must be recomputed.
    #[error("tail node {0} is not on the browsed path")]
    TailNotOnPath(NodeId),
}

/// Errors and signals produced while stepping a simulation.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum StepError {
    /// The simulated world has ended on this branch.
    ///
    /// Not a failure: callers mark the branch's last node as ended and stop
    /// iterating it.
    #[error("world ended")]
    WorldEnded,
    /// The step profile names a function the simpack does not provide.
    #[error("unknown step function '{name}'")]
    UnknownStepFunction {
        /// The requested function name.
        name: String,
    },
    /// The simpack does not implement the requested stepping mode.
    #[error("simpack '{simpack}' has no {mode} step")]
    Unsupported {
        /// Name of the simpack.
        simpack: String,
        /// `"stateless"` or `"history-aware"`.
        mode: &'static str,
    },
    /// A history-dependent step could not read the history it needed.
    #[error("history: {0}")]
    History(#[from] HistoryError),
    /// The step function failed.
    #[error("step failed: {reason}")]
    Failed {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl StepError {
    /// Whether this is the branch-termination signal rather than a failure.
    pub fn is_world_ended(&self) -> bool {
        matches!(self, Self::WorldEnded)
    }
}

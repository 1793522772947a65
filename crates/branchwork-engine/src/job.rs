//! Jobs: a frontier node bound to a crunching profile.

use branchwork_core::{JobId, NodeId, SimState, StepProfile};
use branchwork_tree::Tree;

use crate::profile::CrunchingProfile;

/// A request to extend the branch at `node` until the profile's target.
///
/// Owned by the [`CrunchingManager`](crate::CrunchingManager). The node
/// advances to each newly harvested state, so it always names the
/// frontier of the branch this job is growing.
#[derive(Clone, Debug)]
pub struct Job {
    id: JobId,
    node: NodeId,
    crunching_profile: CrunchingProfile,
    fork: bool,
    cancelled: bool,
}

impl Job {
    /// A new buffer job on `node`.
    pub fn new(node: NodeId, crunching_profile: CrunchingProfile) -> Self {
        Self {
            id: JobId::next(),
            node,
            crunching_profile,
            fork: false,
            cancelled: false,
        }
    }

    /// A new job that always grows its own branch from `node`, even when
    /// the node already has a child stepped with the same profile.
    pub fn fork(node: NodeId, crunching_profile: CrunchingProfile) -> Self {
        Self {
            fork: true,
            ..Self::new(node, crunching_profile)
        }
    }

    /// This job's id.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// The frontier node the job extends.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The crunching profile (step profile and target).
    pub fn crunching_profile(&self) -> &CrunchingProfile {
        &self.crunching_profile
    }

    /// Shortcut for the step profile.
    pub fn step_profile(&self) -> &StepProfile {
        self.crunching_profile.step_profile()
    }

    /// Shortcut for the clock target.
    pub fn target(&self) -> f64 {
        self.crunching_profile.target()
    }

    /// Whether the job was asked for as an explicit fork.
    pub fn is_fork(&self) -> bool {
        self.fork
    }

    /// Whether the job was cancelled and awaits removal.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub(crate) fn advance_to(&mut self, node: NodeId) {
        self.node = node;
    }

    pub(crate) fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Whether the job has nothing left to do.
    ///
    /// A job is obsolete once its node is gone, has ended or has reached
    /// the target. A buffer job is also superseded when the node already
    /// has a child produced with its step profile and no cruncher
    /// (`crunching` is false) is working it. Forks are never superseded,
    /// and distinct profiles on one node stay independent.
    pub fn is_obsolete<S: SimState>(&self, tree: &Tree<S>, crunching: bool) -> bool {
        let Some(node) = tree.node(self.node) else {
            return true;
        };
        if node.ends() || self.crunching_profile.is_reached(node.clock()) {
            return true;
        }
        !self.fork
            && !crunching
            && node.children().iter().any(|child| {
                tree.node(*child).and_then(|c| c.step_profile()) == Some(self.step_profile())
            })
    }
}

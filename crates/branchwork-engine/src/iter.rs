//! Lazy synchronous simulation.

use std::iter::FusedIterator;
use std::sync::Arc;

use branchwork_core::{NodeId, Simpack, StepError, StepProfile};
use branchwork_tree::TreeLock;

use crate::error::ProjectError;
use crate::mode::{Cursor, Refresh, StepMode};

enum Phase {
    Start,
    Running(Cursor),
    Done,
}

/// Iterator returned by [`Project::iter_simulate`](crate::Project::iter_simulate).
///
/// Owns handles to the tree and simpack, so it can outlive the borrow of
/// the project it came from. Each call to `next` takes the write lock,
/// re-validates the branch history, computes one step and commits it.
/// The first item is the starting node; the sequence ends after
/// `iterations` new nodes, when the world ends (the last node is marked
/// as ended), or after the first error.
pub struct SimulationIter<P: Simpack> {
    pack: Arc<P>,
    tree: TreeLock<P::State>,
    mode: Arc<dyn StepMode<P>>,
    profile: Option<StepProfile>,
    error: Option<ProjectError>,
    start: NodeId,
    remaining: usize,
    phase: Phase,
}

impl<P: Simpack> SimulationIter<P> {
    pub(crate) fn new(
        pack: Arc<P>,
        tree: TreeLock<P::State>,
        mode: Arc<dyn StepMode<P>>,
        profile: Result<StepProfile, ProjectError>,
        start: NodeId,
        iterations: usize,
    ) -> Self {
        let (profile, error) = match profile {
            Ok(profile) => (Some(profile), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            pack,
            tree,
            mode,
            profile,
            error,
            start,
            remaining: iterations,
            phase: Phase::Start,
        }
    }

    /// Steps still allowed.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    fn open(&mut self) -> Result<NodeId, ProjectError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let cursor = {
            let tree = self.tree.read();
            self.mode.open(&tree, self.start, Refresh::BeforeEveryStep)?
        };
        self.phase = Phase::Running(cursor);
        Ok(self.start)
    }

    /// One step under the write lock. `Ok(None)` means the world ended.
    fn advance(&mut self) -> Result<Option<NodeId>, ProjectError> {
        let Phase::Running(cursor) = &mut self.phase else {
            return Ok(None);
        };
        let Some(profile) = self.profile.as_ref() else {
            return Ok(None);
        };
        let mut tree = self.tree.write();
        cursor.prepare(&tree)?;
        match self.mode.step(&self.pack, &tree, cursor, profile) {
            Ok(state) => {
                let next = tree.add_state(state, Some(cursor.tail()), Some(profile.clone()))?;
                cursor.advance(&tree, next)?;
                Ok(Some(next))
            }
            Err(StepError::WorldEnded) => {
                tree.make_end(cursor.tail(), Some(profile.clone()))?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<P: Simpack> Iterator for SimulationIter<P> {
    type Item = Result<NodeId, ProjectError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.phase {
            Phase::Done => None,
            Phase::Start => {
                let first = self.open();
                if first.is_err() {
                    self.phase = Phase::Done;
                }
                Some(first)
            }
            Phase::Running(_) if self.remaining == 0 => {
                self.phase = Phase::Done;
                None
            }
            Phase::Running(_) => {
                self.remaining -= 1;
                match self.advance() {
                    Ok(Some(node)) => Some(Ok(node)),
                    Ok(None) => {
                        self.phase = Phase::Done;
                        None
                    }
                    Err(e) => {
                        self.phase = Phase::Done;
                        Some(Err(e))
                    }
                }
            }
        }
    }
}

impl<P: Simpack> FusedIterator for SimulationIter<P> {}

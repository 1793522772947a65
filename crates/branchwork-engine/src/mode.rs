//! Step modes: how a step reads its input from the tree.
//!
//! A simpack either steps from the previous state alone or reads the
//! branch's history. [`for_simpack`] picks the matching [`StepMode`] once,
//! when a project is built; every execution path then goes through it:
//!
//! - crunchers receive [`StepMode::seed`] (the frontier state, or the
//!   committed prefix for history-aware simpacks);
//! - `simulate` and `iter_simulate` open a [`Cursor`] and call
//!   [`StepMode::step`] under the write lock.

use std::sync::Arc;

use branchwork_core::{NodeId, Seed, SimState, Simpack, StepError, StepProfile, TreeError};
use branchwork_tree::Tree;

use crate::browser::HistoryBrowser;
use crate::error::ProjectError;

/// When a cursor's history path is recomputed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refresh {
    /// Once, after the first node the run creates. Enough while the
    /// caller holds the write lock for the whole run.
    AfterFirstNode,
    /// Before every step, for runs that release the lock between steps.
    BeforeEveryStep,
}

/// Position of a synchronous run in the tree.
#[derive(Debug)]
pub struct Cursor {
    tail: NodeId,
    browser: Option<HistoryBrowser>,
    refresh: Refresh,
    created: usize,
}

impl Cursor {
    /// The node the next step extends.
    pub fn tail(&self) -> NodeId {
        self.tail
    }

    /// Nodes created through this cursor so far.
    pub fn created(&self) -> usize {
        self.created
    }

    /// Prepare for the next step.
    pub fn prepare<S: SimState>(&mut self, tree: &Tree<S>) -> Result<(), TreeError> {
        if let (Some(browser), Refresh::BeforeEveryStep) = (self.browser.as_mut(), self.refresh) {
            browser.refresh(tree)?;
        }
        Ok(())
    }

    /// Record that the run created `node` as the new tail.
    pub fn advance<S: SimState>(&mut self, tree: &Tree<S>, node: NodeId) -> Result<(), TreeError> {
        self.tail = node;
        self.created += 1;
        if let Some(browser) = self.browser.as_mut() {
            browser.advance(tree, node)?;
            // The first new node may sit on a fork the old path missed.
            if self.created == 1 && self.refresh == Refresh::AfterFirstNode {
                browser.refresh(tree)?;
            }
        }
        Ok(())
    }
}

/// Capability interface over the two ways a simpack can step.
pub trait StepMode<P: Simpack>: Send + Sync {
    /// `"stateless"` or `"history-aware"`.
    fn name(&self) -> &'static str;

    /// Starting point for a background cruncher extending `node`.
    fn seed(&self, tree: &Tree<P::State>, node: NodeId) -> Result<Seed<P::State>, ProjectError>;

    /// Open a cursor at `node` for a synchronous run.
    fn open(&self, tree: &Tree<P::State>, node: NodeId, refresh: Refresh) -> Result<Cursor, ProjectError>;

    /// Produce the successor of the cursor's tail.
    fn step(
        &self,
        pack: &P,
        tree: &Tree<P::State>,
        cursor: &Cursor,
        profile: &StepProfile,
    ) -> Result<P::State, StepError>;
}

/// Steps from the previous state only.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stateless;

impl<P: Simpack> StepMode<P> for Stateless {
    fn name(&self) -> &'static str {
        "stateless"
    }

    fn seed(&self, tree: &Tree<P::State>, node: NodeId) -> Result<Seed<P::State>, ProjectError> {
        Ok(Seed::State(tree.state(node)?.clone()))
    }

    fn open(&self, tree: &Tree<P::State>, node: NodeId, refresh: Refresh) -> Result<Cursor, ProjectError> {
        tree.get(node)?;
        Ok(Cursor {
            tail: node,
            browser: None,
            refresh,
            created: 0,
        })
    }

    fn step(
        &self,
        pack: &P,
        tree: &Tree<P::State>,
        cursor: &Cursor,
        profile: &StepProfile,
    ) -> Result<P::State, StepError> {
        let state = tree.state(cursor.tail).map_err(|e| StepError::Failed {
            reason: e.to_string(),
        })?;
        pack.step(state, profile)
    }
}

/// Steps through a [`HistoryBrowser`] over the committed branch.
#[derive(Clone, Copy, Debug, Default)]
pub struct HistoryAware;

impl<P: Simpack> StepMode<P> for HistoryAware {
    fn name(&self) -> &'static str {
        "history-aware"
    }

    fn seed(&self, tree: &Tree<P::State>, node: NodeId) -> Result<Seed<P::State>, ProjectError> {
        let browser = HistoryBrowser::new(tree, node)?;
        Ok(Seed::History(browser.snapshot(tree)?))
    }

    fn open(&self, tree: &Tree<P::State>, node: NodeId, refresh: Refresh) -> Result<Cursor, ProjectError> {
        Ok(Cursor {
            tail: node,
            browser: Some(HistoryBrowser::new(tree, node)?),
            refresh,
            created: 0,
        })
    }

    fn step(
        &self,
        pack: &P,
        tree: &Tree<P::State>,
        cursor: &Cursor,
        profile: &StepProfile,
    ) -> Result<P::State, StepError> {
        let browser = cursor.browser.as_ref().ok_or_else(|| StepError::Failed {
            reason: "history-aware cursor without a browser".to_owned(),
        })?;
        let view = browser.view(tree)?;
        pack.history_step(&view, profile)
    }
}

/// The step mode matching `pack`'s declared history dependence.
pub fn for_simpack<P: Simpack>(pack: &P) -> Arc<dyn StepMode<P>> {
    if pack.history_dependent() {
        Arc::new(HistoryAware)
    } else {
        Arc::new(Stateless)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchwork_test_utils::{CounterPack, HistorySumPack, Tick};

    #[test]
    fn picks_mode_from_declaration() {
        assert_eq!(for_simpack(&CounterPack).name(), "stateless");
        assert_eq!(for_simpack(&HistorySumPack).name(), "history-aware");
    }

    #[test]
    fn seeds_match_mode() {
        let mut tree = Tree::new();
        let root = tree.add_state(Tick::at(0.0), None, None).unwrap();
        let a = tree.add_state(Tick::at(1.0), Some(root), None).unwrap();

        let stateless = for_simpack(&CounterPack).seed(&tree, a).unwrap();
        assert_eq!(stateless, Seed::State(Tick::at(1.0)));

        let history = for_simpack(&HistorySumPack).seed(&tree, a).unwrap();
        assert_eq!(history, Seed::History(vec![Tick::at(0.0), Tick::at(1.0)]));
    }

    #[test]
    fn history_cursor_sees_every_committed_state() {
        let mut tree = Tree::new();
        let root = tree.add_state(Tick::at(0.0), None, None).unwrap();
        let mode = for_simpack(&HistorySumPack);
        let profile = StepProfile::new("sum");
        let mut cursor = mode.open(&tree, root, Refresh::BeforeEveryStep).unwrap();
        let mut clocks = Vec::new();
        for _ in 0..4 {
            cursor.prepare(&tree).unwrap();
            let next = mode.step(&HistorySumPack, &tree, &cursor, &profile).unwrap();
            clocks.push(next.clock);
            let id = tree.add_state(next, Some(cursor.tail()), None).unwrap();
            cursor.advance(&tree, id).unwrap();
        }
        assert_eq!(clocks, vec![1.0, 2.0, 4.0, 8.0]);
        assert_eq!(cursor.created(), 4);
    }

    #[test]
    fn open_rejects_unknown_node() {
        let tree = Tree::<Tick>::new();
        assert!(for_simpack(&CounterPack).open(&tree, NodeId(3), Refresh::AfterFirstNode).is_err());
    }
}

//! Read-only, clock-indexed access to one branch's committed past.

use branchwork_core::{HistoryAccess, HistoryError, NodeId, SimState, TreeError};
use branchwork_tree::{Path, Tree};

/// A window over the branch ending at a moving tail node.
///
/// The browser keeps a [`Path`] through the tail. As the tail advances to
/// a child of the path's last node the path is extended in place;
/// anything else (a fork, an edit elsewhere) needs
/// [`refresh`](HistoryBrowser::refresh). Views never expose a node past
/// the tail, so queries beyond the tail's clock fail with
/// [`HistoryError::OutOfBounds`].
#[derive(Clone, Debug)]
pub struct HistoryBrowser {
    path: Path,
    tail: NodeId,
}

impl HistoryBrowser {
    /// Browser over the branch through `tail`.
    pub fn new<S: SimState>(tree: &Tree<S>, tail: NodeId) -> Result<Self, TreeError> {
        Ok(Self {
            path: tree.make_containing_path(tail)?,
            tail,
        })
    }

    /// Current tail node.
    pub fn tail(&self) -> NodeId {
        self.tail
    }

    /// The path being browsed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recompute the path through the current tail.
    pub fn refresh<S: SimState>(&mut self, tree: &Tree<S>) -> Result<(), TreeError> {
        self.path = tree.make_containing_path(self.tail)?;
        Ok(())
    }

    /// Move the tail to `node`.
    ///
    /// Extends the path when `node` is already on it or is a child of its
    /// last node; otherwise recomputes the path.
    pub fn advance<S: SimState>(&mut self, tree: &Tree<S>, node: NodeId) -> Result<(), TreeError> {
        self.tail = node;
        if self.path.contains(node) || self.path.extend_to(tree, node).is_ok() {
            return Ok(());
        }
        self.refresh(tree)
    }

    /// Borrow the committed history up to and including the tail.
    pub fn view<'t, S: SimState>(&'t self, tree: &'t Tree<S>) -> Result<BranchView<'t, S>, HistoryError> {
        let end = self
            .path
            .index_of(self.tail)
            .ok_or(HistoryError::TailNotOnPath(self.tail))?;
        Ok(BranchView {
            tree,
            nodes: &self.path.nodes()[..=end],
        })
    }

    /// Owned copy of the committed history, oldest first.
    pub fn snapshot<S: SimState>(&self, tree: &Tree<S>) -> Result<Vec<S>, HistoryError> {
        let view = self.view(tree)?;
        (0..view.len()).map(|i| view.get(i).cloned()).collect()
    }
}

/// Borrowed history of one branch, bounded by the browser's tail.
pub struct BranchView<'t, S> {
    tree: &'t Tree<S>,
    nodes: &'t [NodeId],
}

impl<S: SimState> HistoryAccess<S> for BranchView<'_, S> {
    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn get(&self, index: usize) -> Result<&S, HistoryError> {
        let out_of_range = HistoryError::IndexOutOfRange {
            index,
            len: self.nodes.len(),
        };
        let id = self.nodes.get(index).ok_or(out_of_range.clone())?;
        self.tree.state(*id).map_err(|_| out_of_range)
    }
}

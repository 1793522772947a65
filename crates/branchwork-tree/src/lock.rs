//! Shared ownership of a tree behind a readers-writer lock.
//!
//! The lock is `parking_lot::RwLock`, whose fairness policy is
//! writer-preferring: once a writer is queued, new readers block until it
//! has run. A steady stream of readers (history browsing, buffer checks)
//! therefore cannot starve `sync_crunchers` or `simulate`.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use branchwork_core::SimState;

use crate::tree::Tree;

/// Cloneable handle to a shared [`Tree`].
///
/// Clones point at the same tree. Read guards may be held concurrently;
/// a write guard is exclusive.
pub struct TreeLock<S> {
    inner: Arc<RwLock<Tree<S>>>,
}

impl<S> Clone for TreeLock<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SimState> Default for TreeLock<S> {
    fn default() -> Self {
        Self::new(Tree::new())
    }
}

impl<S: SimState> TreeLock<S> {
    /// Wrap `tree` for shared access.
    pub fn new(tree: Tree<S>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tree)),
        }
    }

    /// Acquire shared read access, blocking while a writer holds or awaits
    /// the lock.
    pub fn read(&self) -> RwLockReadGuard<'_, Tree<S>> {
        self.inner.read()
    }

    /// Acquire exclusive write access.
    pub fn write(&self) -> RwLockWriteGuard<'_, Tree<S>> {
        self.inner.write()
    }

    /// Read access without blocking.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, Tree<S>>> {
        self.inner.try_read()
    }

    /// Write access without blocking.
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, Tree<S>>> {
        self.inner.try_write()
    }

    /// Whether two handles share the same tree.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// Compile-time assertion: TreeLock must be shareable across crunchers.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<TreeLock<f64>>();
};

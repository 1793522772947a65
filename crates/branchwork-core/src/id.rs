//! Strongly-typed identifiers for tree nodes, jobs and crunchers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies a node in a simulation tree.
///
/// Node ids are arena indices: `NodeId(n)` is the n-th node ever added to
/// its tree. They are stable for the life of the tree and survive
/// persistence unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The arena slot this id refers to.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Counter for unique [`JobId`] allocation.
static JOB_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies a crunching job.
///
/// Allocated from a process-wide monotonic counter, so two jobs never
/// share an id even across projects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl JobId {
    /// Allocate a fresh, unique job id. Thread-safe.
    pub fn next() -> Self {
        Self(JOB_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Counter for unique [`CruncherId`] allocation.
static CRUNCHER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies a background cruncher (thread or process).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CruncherId(pub u64);

impl CruncherId {
    /// Allocate a fresh, unique cruncher id. Thread-safe.
    pub fn next() -> Self {
        Self(CRUNCHER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for CruncherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cruncher-{}", self.0)
    }
}

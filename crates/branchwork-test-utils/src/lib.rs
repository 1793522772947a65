//! Test utilities for branchwork development.
//!
//! Provides fixture simpacks in [`fixtures`] and a handful of assertions
//! and helpers for inspecting trees produced by the engine.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::thread;
use std::time::{Duration, Instant};

use branchwork_core::{NodeId, SimState};
use branchwork_tree::Tree;

pub use fixtures::{CounterPack, HistorySumPack, Tick};

/// Panic unless every non-root node's clock exceeds its parent's.
pub fn assert_clock_monotonic<S: SimState>(tree: &Tree<S>) {
    for node in tree.iter() {
        if let Some(parent) = node.parent() {
            let parent_clock = tree.clock(parent).expect("parent exists");
            assert!(
                node.clock() > parent_clock,
                "node {} clock {} does not exceed parent {} clock {}",
                node.id(),
                node.clock(),
                parent,
                parent_clock,
            );
        }
    }
}

/// Clocks of the nodes after `from`, following first children.
pub fn branch_clocks<S: SimState>(tree: &Tree<S>, from: NodeId) -> Vec<f64> {
    let mut clocks = Vec::new();
    let mut tip = from;
    while let Some(&next) = tree.get(tip).expect("node exists").children().first() {
        clocks.push(tree.clock(next).expect("node exists"));
        tip = next;
    }
    clocks
}

/// Number of nodes strictly below `from`.
pub fn descendant_count<S: SimState>(tree: &Tree<S>, from: NodeId) -> usize {
    let mut count = 0;
    let mut stack = vec![from];
    while let Some(id) = stack.pop() {
        let children = tree.get(id).expect("node exists").children();
        count += children.len();
        stack.extend_from_slice(children);
    }
    count
}

/// Poll `done` every few milliseconds until it returns `true` or
/// `timeout` elapses. Returns the final result of `done`.
pub fn poll_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

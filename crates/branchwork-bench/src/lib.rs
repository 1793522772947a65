//! Benchmark fixtures for branchwork.
//!
//! - [`walk_chain`]: a single long branch of random-walk states
//! - [`bushy_tree`]: a complete tree with a fixed fan-out, for leaf and
//!   path queries
//! - [`prisoner_state`]: a large tournament state, for codec throughput

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use branchwork_core::{NodeId, Simpack, StepCall, StepProfile};
use branchwork_simpacks::{Prisoner, RandomWalk, Tournament, Walker};
use branchwork_tree::Tree;

/// Tree holding one branch of `len` walk steps after the root.
pub fn walk_chain(len: usize) -> (Tree<Walker>, NodeId) {
    let pack = RandomWalk;
    let profile = StepProfile::build(pack.default_step_function(), ());
    let mut tree = Tree::new();
    let root = tree.add_root(pack.create_root());
    let mut tip = root;
    for _ in 0..len {
        let next = pack
            .step(tree.state(tip).expect("tip exists"), &profile)
            .expect("walk never fails");
        tip = tree
            .add_state(next, Some(tip), Some(profile.clone()))
            .expect("walk clocks increase");
    }
    (tree, root)
}

/// Complete tree of the given depth where every inner node has `fanout`
/// children, each stepped with a different stride.
pub fn bushy_tree(depth: usize, fanout: usize) -> (Tree<Walker>, NodeId) {
    let pack = RandomWalk;
    let profiles: Vec<StepProfile> = (1..=fanout)
        .map(|stride| StepProfile::build("walk", StepCall::new().kwarg("stride", stride as i64)))
        .collect();
    let mut tree = Tree::new();
    let root = tree.add_root(pack.create_root());
    let mut frontier = vec![root];
    for _ in 0..depth {
        let mut next_frontier = Vec::with_capacity(frontier.len() * fanout);
        for node in frontier {
            for profile in &profiles {
                let state = pack
                    .step(tree.state(node).expect("node exists"), profile)
                    .expect("walk never fails");
                let child = tree
                    .add_state(state, Some(node), Some(profile.clone()))
                    .expect("walk clocks increase");
                next_frontier.push(child);
            }
        }
        frontier = next_frontier;
    }
    (tree, root)
}

/// Tournament after `rounds` rounds with `population` players.
pub fn prisoner_state(population: usize, rounds: usize) -> Tournament {
    let pack = Prisoner { population };
    let profile = StepProfile::new("play");
    let mut state = pack.create_root();
    for _ in 0..rounds {
        state = pack.step(&state, &profile).expect("play never fails");
    }
    state
}

//! Stress: many crunchers and readers sharing one tree.
//!
//! Eight roots are crunched in parallel while four reader threads walk the
//! tree and one thread drives `iter_simulate` on a separate root. Readers
//! must never observe a node whose clock does not exceed its parent's,
//! and every branch must reach its target.

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use branchwork_engine::Project;
use branchwork_test_utils::{assert_clock_monotonic, descendant_count, CounterPack};

use common::crunch_until_idle;

const ROOTS: usize = 8;
const READERS: usize = 4;
const BUFFER: f64 = 200.0;

#[test]
fn readers_never_see_a_broken_tree() {
    let mut project = Project::new(CounterPack);
    let roots: Vec<_> = (0..ROOTS).map(|_| project.create_root()).collect();
    let side = project.create_root();
    for root in &roots {
        project.ensure_buffer(*root, BUFFER).unwrap();
    }

    let done = Arc::new(AtomicBool::new(false));
    let reads = Arc::new(AtomicUsize::new(0));
    let readers: Vec<_> = (0..READERS)
        .map(|i| {
            let tree = project.tree().clone();
            let done = Arc::clone(&done);
            let reads = Arc::clone(&reads);
            thread::Builder::new()
                .name(format!("reader-{i}"))
                .spawn(move || {
                    while !done.load(Ordering::Acquire) {
                        let tree = tree.read();
                        assert_clock_monotonic(&tree);
                        reads.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .unwrap()
        })
        .collect();

    let stepper = {
        let iter = project.iter_simulate(side, 100, ());
        thread::Builder::new()
            .name("stepper".into())
            .spawn(move || iter.map(|node| node.unwrap()).count())
            .unwrap()
    };

    crunch_until_idle(&mut project);
    assert_eq!(stepper.join().unwrap(), 101);
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }

    assert!(reads.load(Ordering::Relaxed) > 0);
    let tree = project.tree().read();
    for root in &roots {
        assert_eq!(descendant_count(&tree, *root), BUFFER as usize);
    }
    assert_eq!(descendant_count(&tree, side), 100);
    assert!(tree.validate().is_ok());
}

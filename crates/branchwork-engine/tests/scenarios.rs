//! End-to-end crunching scenarios on thread crunchers.

mod common;

use branchwork_core::{HistoryAccess, NodeId, StepCall, StepProfile};
use branchwork_engine::{Project, ProjectConfig};
use branchwork_test_utils::{assert_clock_monotonic, branch_clocks, descendant_count, CounterPack, HistorySumPack};

use common::crunch_until_idle;

#[test]
fn crunching_fills_the_requested_buffer() {
    let mut project = Project::new(CounterPack);
    let root = project.create_root();
    project.begin_crunching(root, Some(5.0), ()).unwrap();

    assert_eq!(crunch_until_idle(&mut project), 5);
    assert_eq!(project.sync_crunchers(), 0);

    let tree = project.tree().read();
    assert_eq!(descendant_count(&tree, root), 5);
    assert_eq!(branch_clocks(&tree, root), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    assert_eq!(project.crunching_manager().job_count(), 0);
}

#[test]
fn repeated_buffer_requests_coalesce() {
    let mut project = Project::new(CounterPack);
    let root = project.create_root();
    project.ensure_buffer(root, 3.0).unwrap();
    project.ensure_buffer(root, 6.0).unwrap();

    let jobs: Vec<f64> = project.crunching_manager().jobs().map(|j| j.target()).collect();
    assert_eq!(jobs, vec![6.0]);

    assert_eq!(crunch_until_idle(&mut project), 6);
    let tree = project.tree().read();
    assert_eq!(tree.get(root).unwrap().children().len(), 1);
    assert_eq!(branch_clocks(&tree, root), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn buffer_requests_extend_existing_leaves() {
    let mut project = Project::new(CounterPack);
    let root = project.create_root();
    project.ensure_buffer(root, 2.0).unwrap();
    crunch_until_idle(&mut project);

    // The leaf now sits at clock 2; asking for more restarts from it with
    // the profile that produced it.
    project.ensure_buffer(root, 4.0).unwrap();
    let job = project.crunching_manager().jobs().next().unwrap().clone();
    assert_eq!(job.step_profile(), &StepProfile::new("step"));
    assert_eq!(project.tree().read().clock(job.node()).unwrap(), 2.0);

    assert_eq!(crunch_until_idle(&mut project), 2);
    assert_eq!(descendant_count(&project.tree().read(), root), 4);
}

#[test]
fn distinct_jobs_on_one_leaf_fork_independently() {
    let mut project = Project::new(CounterPack);
    let root = project.create_root();
    let a = project.begin_crunching(root, Some(3.0), ()).unwrap();
    let b = project
        .begin_crunching(root, Some(3.0), StepCall::function("step_by").arg(0.5))
        .unwrap();
    assert_ne!(a, b);
    assert_eq!(project.crunching_manager().jobs_on(root).len(), 2);

    crunch_until_idle(&mut project);
    let tree = project.tree().read();
    let children = tree.get(root).unwrap().children();
    assert_eq!(children.len(), 2);
    let clocks: Vec<f64> = children.iter().map(|c| tree.clock(*c).unwrap()).collect();
    assert!(clocks.contains(&1.0) && clocks.contains(&0.5));
    assert_eq!(descendant_count(&tree, root), 3 + 6);
    assert_clock_monotonic(&tree);
}

#[test]
fn repeated_forks_with_one_profile_each_grow_a_branch() {
    let config = ProjectConfig {
        max_crunchers: Some(1),
        ..ProjectConfig::default()
    };
    let mut project = Project::with_config(CounterPack, config).unwrap();
    let root = project.create_root();
    project.begin_crunching(root, Some(3.0), ()).unwrap();
    assert_eq!(crunch_until_idle(&mut project), 3);

    project.begin_crunching(root, Some(3.0), ()).unwrap();
    assert_eq!(crunch_until_idle(&mut project), 3);
    assert!(project.crunching_manager_mut().take_failures().is_empty());

    let tree = project.tree().read();
    let children = tree.get(root).unwrap().children();
    assert_eq!(children.len(), 2);
    for child in children {
        assert_eq!(branch_clocks(&tree, *child), vec![2.0, 3.0]);
    }
}

#[test]
fn crunching_and_simulating_agree() {
    let mut crunched = Project::new(CounterPack);
    let root = crunched.create_root();
    let profile = StepCall::function("step_by").arg(1.5);
    crunched.begin_crunching(root, Some(6.0), profile.clone()).unwrap();
    crunch_until_idle(&mut crunched);

    let simulated = Project::new(CounterPack);
    let sim_root = simulated.create_root();
    simulated.simulate(sim_root, 4, profile).unwrap();

    let a = crunched.tree().read();
    let b = simulated.tree().read();
    assert_eq!(branch_clocks(&a, root), vec![1.5, 3.0, 4.5, 6.0]);
    assert_eq!(branch_clocks(&a, root), branch_clocks(&b, sim_root));

    // Provenance matches too.
    let leaf_a = a.leaves().find(|n| *n != root).unwrap();
    let leaf_b = b.leaves().find(|n| *n != sim_root).unwrap();
    assert_eq!(
        a.get(leaf_a).unwrap().step_profile(),
        b.get(leaf_b).unwrap().step_profile()
    );
    assert_eq!(a.state(leaf_a).unwrap(), b.state(leaf_b).unwrap());
}

#[test]
fn history_steps_see_the_whole_branch() {
    let expected = vec![1.0, 2.0, 4.0, 8.0, 16.0];

    let simulated = Project::new(HistorySumPack);
    assert_eq!(simulated.step_mode(), "history-aware");
    let root = simulated.create_root();
    let last = simulated.simulate(root, 5, ()).unwrap();
    assert_eq!(branch_clocks(&simulated.tree().read(), root), expected);
    assert_eq!(simulated.tree().read().clock(last).unwrap(), 16.0);

    let iterated = Project::new(HistorySumPack);
    let root = iterated.create_root();
    let nodes: Vec<NodeId> = iterated
        .iter_simulate(root, 5, ())
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(nodes.len(), 6);
    assert_eq!(nodes[0], root);
    assert_eq!(branch_clocks(&iterated.tree().read(), root), expected);

    let mut crunched = Project::new(HistorySumPack);
    let root = crunched.create_root();
    crunched.begin_crunching(root, Some(16.0), ()).unwrap();
    crunch_until_idle(&mut crunched);
    assert_eq!(branch_clocks(&crunched.tree().read(), root), expected);
}

#[test]
fn history_crunching_resumes_with_full_prefix() {
    // Seeding a second cruncher from a mid-branch leaf must include the
    // states committed by the first one.
    let mut project = Project::new(HistorySumPack);
    let root = project.create_root();
    project.ensure_buffer(root, 2.0).unwrap();
    crunch_until_idle(&mut project);
    project.ensure_buffer(root, 8.0).unwrap();
    crunch_until_idle(&mut project);
    assert_eq!(
        branch_clocks(&project.tree().read(), root),
        vec![1.0, 2.0, 4.0, 8.0]
    );
}

#[test]
fn iter_simulate_rebrowses_after_outside_forks() {
    let project = Project::new(HistorySumPack);
    let root = project.create_root();
    let mut iter = project.iter_simulate(root, 3, ());
    assert_eq!(iter.next().unwrap().unwrap(), root);
    let first = iter.next().unwrap().unwrap();

    // Between yields the caller may change the tree; an unrelated fork
    // must not disturb the branch history the next step reads.
    {
        let mut tree = project.tree().write();
        tree.add_state(branchwork_test_utils::Tick::at(0.5), Some(root), None)
            .unwrap();
    }
    let rest: Vec<NodeId> = iter.collect::<Result<_, _>>().unwrap();
    assert_eq!(rest.len(), 2);

    let tree = project.tree().read();
    let view_clocks: Vec<f64> = rest.iter().map(|n| tree.clock(*n).unwrap()).collect();
    assert_eq!(tree.clock(first).unwrap(), 1.0);
    assert_eq!(view_clocks, vec![2.0, 4.0]);
}

#[test]
fn iter_simulate_releases_the_lock_between_items() {
    let project = Project::new(CounterPack);
    let root = project.create_root();
    for node in project.iter_simulate(root, 3, ()) {
        let node = node.unwrap();
        // Readers get in while the iterator is suspended.
        let tree = project.tree().try_read().expect("lock is free between items");
        assert!(tree.get(node).is_ok());
    }
    assert_eq!(project.tree().read().len(), 4);
}

#[test]
fn iter_simulate_reports_bad_start_first() {
    let project = Project::new(CounterPack);
    let mut iter = project.iter_simulate(NodeId(7), 3, ());
    assert!(iter.next().unwrap().is_err());
    assert!(iter.next().is_none());

    let root = project.create_root();
    let mut iter = project.iter_simulate(root, 3, StepCall::function("missing"));
    assert!(iter.next().unwrap().is_err());
    assert!(iter.next().is_none());
}

#[test]
fn history_view_is_bounded_by_tail() {
    let project = Project::new(HistorySumPack);
    let root = project.create_root();
    let tip = project.simulate(root, 3, ()).unwrap();
    let tree = project.tree().read();
    let mid = tree.get(tip).unwrap().parent().unwrap();
    let browser = branchwork_engine::HistoryBrowser::new(&tree, mid).unwrap();
    let view = browser.view(&tree).unwrap();
    assert_eq!(view.len(), 3);
    assert!(view
        .state_by_clock(4.0, branchwork_core::Rounding::Closest)
        .is_err());
}

use std::time::Duration;

use branchwork_core::Simpack;
use branchwork_engine::Project;
use branchwork_test_utils::poll_until;

/// Sync until no jobs or crunchers remain. Returns the nodes added.
pub fn crunch_until_idle<P: Simpack>(project: &mut Project<P>) -> usize {
    let mut added = 0;
    let idle = poll_until(Duration::from_secs(20), || {
        added += project.sync_crunchers();
        let manager = project.crunching_manager();
        manager.job_count() == 0 && manager.cruncher_count() == 0
    });
    assert!(idle, "crunching did not settle: {project}");
    added
}

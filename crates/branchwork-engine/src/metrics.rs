//! Per-sync metrics for the crunching manager.
//!
//! [`SyncMetrics`] describes a single `sync_crunchers` pass, so a driving
//! loop can report progress beyond the bare node count.

/// Counters and timing collected during one sync pass.
///
/// Durations are in microseconds. The manager replaces these after each
/// pass; read them through
/// [`CrunchingManager::last_metrics`](crate::CrunchingManager::last_metrics).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncMetrics {
    /// Wall-clock time for the entire pass, in microseconds.
    pub total_us: u64,
    /// Nodes added to the tree from cruncher output.
    pub states_harvested: usize,
    /// Branches marked as ended because a cruncher's world ended.
    pub branches_ended: usize,
    /// Crunchers started during the pass.
    pub crunchers_spawned: usize,
    /// Crunchers stopped or reaped during the pass.
    pub crunchers_retired: usize,
    /// Jobs removed as obsolete, cancelled or failed.
    pub jobs_removed: usize,
    /// Workers that failed (error, panic, bad state, spawn failure).
    pub failures: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = SyncMetrics::default();
        assert_eq!(m.total_us, 0);
        assert_eq!(m.states_harvested, 0);
        assert_eq!(m.crunchers_spawned, 0);
        assert_eq!(m.failures, 0);
    }
}

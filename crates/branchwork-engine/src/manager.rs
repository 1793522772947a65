//! The crunching manager: owner of the job list and the cruncher pool.
//!
//! # Sync pass
//!
//! ```text
//! sync_crunchers()
//!   1. drain every cruncher (non-blocking)
//!   2. under the write lock, append drained states in production order,
//!      advancing each job's node; end branches whose world ended
//!   3. drop failed, cancelled and obsolete jobs, retiring their crunchers;
//!      reap crunchers that finished
//!   4. spawn a cruncher for every job without one (up to max_crunchers),
//!      skipping jobs whose node is still open for editing
//!   → number of nodes added in step 2
//! ```
//!
//! Nothing happens between calls: the owner decides when to sync. States a
//! cruncher queued before a pass drains it are harvested even if the same
//! pass then retires the cruncher; later output dies with the cruncher.

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use branchwork_core::{CruncherId, JobId, NodeId, Seed, Simpack};
use branchwork_tree::{Tree, TreeLock};

use crate::config::ProjectConfig;
use crate::cruncher::{self, Cruncher, CruncherEvent};
use crate::error::ProjectError;
use crate::job::Job;
use crate::metrics::SyncMetrics;
use crate::mode::StepMode;
use crate::profile::CrunchingProfile;

/// A worker failure, isolated to its job.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerFailure {
    /// The job that was dropped.
    pub job: JobId,
    /// The failing cruncher, if one had been started.
    pub cruncher: Option<CruncherId>,
    /// The job's frontier when it failed. Everything up to it is kept.
    pub node: NodeId,
    /// What went wrong.
    pub reason: String,
}

/// Scheduler matching jobs to background crunchers.
///
/// The manager is the only place background output enters the tree.
/// Jobs are kept in creation order, which is also the order
/// [`jobs_on`](CrunchingManager::jobs_on) reports them in.
pub struct CrunchingManager<P: Simpack> {
    pack: Arc<P>,
    tree: TreeLock<P::State>,
    mode: Arc<dyn StepMode<P>>,
    config: ProjectConfig,
    jobs: IndexMap<JobId, Job>,
    crunchers: IndexMap<JobId, Box<dyn Cruncher<P::State>>>,
    failures: Vec<WorkerFailure>,
    metrics: SyncMetrics,
}

impl<P: Simpack> CrunchingManager<P> {
    /// Manager feeding `tree`, spawning crunchers per `config`.
    pub fn new(
        pack: Arc<P>,
        tree: TreeLock<P::State>,
        mode: Arc<dyn StepMode<P>>,
        config: ProjectConfig,
    ) -> Self {
        Self {
            pack,
            tree,
            mode,
            config,
            jobs: IndexMap::new(),
            crunchers: IndexMap::new(),
            failures: Vec::new(),
            metrics: SyncMetrics::default(),
        }
    }

    /// The configuration crunchers are spawned with.
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// All jobs, oldest first.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    /// Number of jobs.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Look up a job.
    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    /// Jobs whose frontier is `node`, oldest first.
    pub fn jobs_on(&self, node: NodeId) -> Vec<&Job> {
        self.jobs.values().filter(|j| j.node() == node).collect()
    }

    /// Number of crunchers in the pool.
    pub fn cruncher_count(&self) -> usize {
        self.crunchers.len()
    }

    /// Whether a live cruncher works `job`.
    pub fn is_crunching(&self, job: JobId) -> bool {
        self.crunchers.get(&job).is_some_and(|c| c.is_alive())
    }

    /// Metrics of the most recent sync pass.
    pub fn last_metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    /// Take the failures recorded since the last call.
    pub fn take_failures(&mut self) -> Vec<WorkerFailure> {
        std::mem::take(&mut self.failures)
    }

    /// Queue a new buffer job on `node`. It starts at the next sync.
    pub fn add_job(&mut self, node: NodeId, crunching_profile: CrunchingProfile) -> JobId {
        self.queue(Job::new(node, crunching_profile))
    }

    /// Queue a job that grows a new fork from `node`, see [`Job::fork`].
    pub fn add_fork(&mut self, node: NodeId, crunching_profile: CrunchingProfile) -> JobId {
        self.queue(Job::fork(node, crunching_profile))
    }

    fn queue(&mut self, job: Job) -> JobId {
        let id = job.id();
        debug!(job = %id, node = %job.node(), target = job.target(), step = %job.step_profile(), fork = job.is_fork(), "job added");
        self.jobs.insert(id, job);
        id
    }

    /// Raise a job's target, notifying its cruncher if the target moved.
    pub fn raise_target(&mut self, id: JobId, target: f64) -> bool {
        let Some(job) = self.jobs.get(&id) else {
            return false;
        };
        if !job.crunching_profile().raise_target(target) {
            return false;
        }
        if let Some(cruncher) = self.crunchers.get_mut(&id) {
            cruncher.update_target(target);
        }
        true
    }

    /// Cancel a job.
    ///
    /// Its cruncher is told to stop at once; the job and whatever the
    /// cruncher had already queued are settled by the next sync.
    pub fn cancel_job(&mut self, id: JobId) -> bool {
        let Some(job) = self.jobs.get_mut(&id) else {
            return false;
        };
        job.cancel();
        if let Some(cruncher) = self.crunchers.get_mut(&id) {
            cruncher.retire();
        }
        true
    }

    /// Run one sync pass. Returns the number of nodes added to the tree.
    pub fn sync_crunchers(&mut self) -> usize {
        let started = Instant::now();
        let mut metrics = SyncMetrics::default();

        let drained: Vec<(JobId, Vec<CruncherEvent<P::State>>)> = self
            .crunchers
            .iter_mut()
            .map(|(job, cruncher)| (*job, cruncher.drain_events()))
            .filter(|(_, events)| !events.is_empty())
            .collect();

        let lock = self.tree.clone();
        let spawn_queue = {
            let mut tree = lock.write();
            let mut failed = Vec::new();
            for (id, events) in drained {
                if let Some(reason) = self.harvest(&mut tree, id, events, &mut metrics) {
                    failed.push((id, reason));
                }
            }
            for (id, reason) in failed {
                self.fail(id, reason, &mut metrics);
            }
            self.prune(&tree, &mut metrics);
            self.plan_spawns(&tree)
        };

        for (id, seed) in spawn_queue {
            let Some(job) = self.jobs.get(&id) else {
                continue;
            };
            let spawned = seed
                .map_err(|e| format!("cannot seed cruncher: {e}"))
                .and_then(|seed| cruncher::spawn(&self.config, &self.pack, job, seed));
            match spawned {
                Ok(cruncher) => {
                    debug!(job = %id, cruncher = %cruncher.id(), kind = cruncher.kind(), node = %job.node(), "cruncher spawned");
                    self.crunchers.insert(id, cruncher);
                    metrics.crunchers_spawned += 1;
                }
                Err(reason) => self.fail(id, reason, &mut metrics),
            }
        }

        metrics.total_us = started.elapsed().as_micros() as u64;
        let harvested = metrics.states_harvested;
        self.metrics = metrics;
        harvested
    }

    /// Append one cruncher's events to the tree. Returns a failure reason
    /// if the cruncher failed or produced a state the tree rejected.
    fn harvest(
        &mut self,
        tree: &mut Tree<P::State>,
        id: JobId,
        events: Vec<CruncherEvent<P::State>>,
        metrics: &mut SyncMetrics,
    ) -> Option<String> {
        let job = self.jobs.get_mut(&id)?;
        let mut added = 0;
        let mut failure = None;
        for event in events {
            match event {
                CruncherEvent::State(state) => {
                    match tree.add_state(state, Some(job.node()), Some(job.step_profile().clone())) {
                        Ok(node) => {
                            job.advance_to(node);
                            added += 1;
                        }
                        Err(e) => {
                            failure = Some(format!("rejected state: {e}"));
                            break;
                        }
                    }
                }
                CruncherEvent::WorldEnded => {
                    match tree.make_end(job.node(), Some(job.step_profile().clone())) {
                        Ok(true) => metrics.branches_ended += 1,
                        Ok(false) => {}
                        Err(e) => failure = Some(format!("cannot end branch: {e}")),
                    }
                }
                CruncherEvent::Failed(reason) => failure = Some(reason),
                CruncherEvent::Finished => {}
            }
        }
        if added > 0 {
            trace!(job = %id, added, node = %job.node(), "harvested states");
        }
        metrics.states_harvested += added;
        failure
    }

    fn fail(&mut self, id: JobId, reason: String, metrics: &mut SyncMetrics) {
        let cruncher = self.crunchers.shift_remove(&id).map(|mut c| {
            c.retire();
            metrics.crunchers_retired += 1;
            c.id()
        });
        let Some(job) = self.jobs.shift_remove(&id) else {
            return;
        };
        warn!(job = %id, node = %job.node(), %reason, "worker failed; job dropped");
        metrics.failures += 1;
        metrics.jobs_removed += 1;
        self.failures.push(WorkerFailure {
            job: id,
            cruncher,
            node: job.node(),
            reason,
        });
    }

    /// Drop cancelled and obsolete jobs and reap finished crunchers.
    fn prune(&mut self, tree: &Tree<P::State>, metrics: &mut SyncMetrics) {
        let done: Vec<JobId> = self
            .jobs
            .values()
            .filter(|job| {
                let crunching = self.crunchers.get(&job.id()).is_some_and(|c| c.is_alive());
                job.is_cancelled() || job.is_obsolete(tree, crunching)
            })
            .map(Job::id)
            .collect();
        for id in done {
            self.jobs.shift_remove(&id);
            metrics.jobs_removed += 1;
            debug!(job = %id, "job removed");
        }

        let jobs = &self.jobs;
        self.crunchers.retain(|id, cruncher| {
            let keep = jobs.contains_key(id) && cruncher.is_alive();
            if !keep {
                cruncher.retire();
                metrics.crunchers_retired += 1;
                debug!(job = %id, cruncher = %cruncher.id(), "cruncher retired");
            }
            keep
        });
    }

    /// Seeds for jobs that need a cruncher, within the free slots.
    ///
    /// Jobs on a node that is still open for editing wait until it is
    /// finalized.
    fn plan_spawns(&self, tree: &Tree<P::State>) -> Vec<(JobId, Result<Seed<P::State>, ProjectError>)> {
        let slots = self.config.free_slots(self.crunchers.len());
        self.jobs
            .values()
            .filter(|job| !self.crunchers.contains_key(&job.id()))
            .filter(|job| !tree.node(job.node()).is_some_and(|n| n.is_editable()))
            .take(slots)
            .map(|job| (job.id(), self.mode.seed(tree, job.node())))
            .collect()
    }

    /// Stop every cruncher and drop them. Jobs stay queued.
    pub fn retire_all(&mut self) {
        for (id, mut cruncher) in self.crunchers.drain(..) {
            cruncher.retire();
            debug!(job = %id, cruncher = %cruncher.id(), "cruncher retired");
        }
    }
}

impl<P: Simpack> Drop for CrunchingManager<P> {
    fn drop(&mut self) {
        self.retire_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use branchwork_core::{StepCall, StepProfile};
    use branchwork_test_utils::{poll_until, CounterPack, Tick};

    use crate::config::{CruncherKind, ProcessConfig};
    use crate::mode;

    fn manager(config: ProjectConfig) -> (CrunchingManager<CounterPack>, NodeId) {
        let pack = Arc::new(CounterPack);
        let tree = TreeLock::default();
        let root = tree.write().add_state(Tick::at(0.0), None, None).unwrap();
        let mode = mode::for_simpack(pack.as_ref());
        (CrunchingManager::new(pack, tree, mode, config), root)
    }

    fn profile(call: StepCall, target: f64) -> CrunchingProfile {
        CrunchingProfile::new(StepProfile::build("step", call), target)
    }

    fn drain(manager: &mut CrunchingManager<CounterPack>) -> usize {
        let mut total = 0;
        assert!(poll_until(Duration::from_secs(10), || {
            total += manager.sync_crunchers();
            manager.job_count() == 0 && manager.cruncher_count() == 0
        }));
        total
    }

    #[test]
    fn manager_is_send() {
        fn assert<T: Send>() {}
        assert::<CrunchingManager<CounterPack>>();
    }

    #[test]
    fn jobs_on_reports_creation_order() {
        let (mut m, root) = manager(ProjectConfig::default());
        let a = m.add_job(root, profile(StepCall::new(), 2.0));
        let b = m.add_job(root, profile(StepCall::function("step_by").arg(2.0), 2.0));
        let ids: Vec<JobId> = m.jobs_on(root).iter().map(|j| j.id()).collect();
        assert_eq!(ids, vec![a, b]);
        assert!(m.jobs_on(NodeId(99)).is_empty());
    }

    #[test]
    fn raise_target_only_moves_up() {
        let (mut m, root) = manager(ProjectConfig::default());
        let id = m.add_job(root, profile(StepCall::new(), 3.0));
        assert!(!m.raise_target(id, 2.0));
        assert!(m.raise_target(id, 7.0));
        assert_eq!(m.job(id).unwrap().target(), 7.0);
        assert!(!m.raise_target(JobId(u64::MAX), 9.0));
    }

    #[test]
    fn first_sync_spawns_and_later_syncs_harvest() {
        let (mut m, root) = manager(ProjectConfig::default());
        m.add_job(root, profile(StepCall::new(), 3.0));
        assert_eq!(m.sync_crunchers(), 0);
        assert_eq!(m.last_metrics().crunchers_spawned, 1);
        assert_eq!(drain(&mut m), 3);
        assert!(m.take_failures().is_empty());
    }

    #[test]
    fn cap_limits_concurrent_crunchers() {
        let config = ProjectConfig {
            max_crunchers: Some(1),
            ..ProjectConfig::default()
        };
        let (mut m, root) = manager(config);
        m.add_job(root, profile(StepCall::function("slow"), 2.0));
        m.add_job(root, profile(StepCall::function("step_by").arg(0.5), 1.0));
        m.sync_crunchers();
        assert_eq!(m.cruncher_count(), 1);
        assert_eq!(m.job_count(), 2);
        assert_eq!(drain(&mut m), 4);
    }

    #[test]
    fn spawn_failure_drops_only_that_job() {
        let config = ProjectConfig {
            cruncher: CruncherKind::Process(ProcessConfig::new("/nonexistent/branchwork-worker")),
            ..ProjectConfig::default()
        };
        let (mut m, root) = manager(config);
        let id = m.add_job(root, profile(StepCall::new(), 3.0));
        assert_eq!(m.sync_crunchers(), 0);
        assert_eq!(m.job_count(), 0);
        let failures = m.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].job, id);
        assert_eq!(failures[0].cruncher, None);
        assert_eq!(failures[0].node, root);
        assert_eq!(m.last_metrics().failures, 1);
    }

    #[test]
    fn editable_nodes_wait_for_finalize() {
        let (mut m, root) = manager(ProjectConfig::default());
        let copy = m.tree.write().fork_to_edit(root).unwrap();
        m.add_job(copy, profile(StepCall::new(), 2.0));

        assert_eq!(m.sync_crunchers(), 0);
        assert_eq!(m.cruncher_count(), 0);
        assert_eq!(m.job_count(), 1);

        m.tree.write().finalize(copy).unwrap();
        assert_eq!(drain(&mut m), 2);
    }

    #[test]
    fn cancel_unknown_job_is_false() {
        let (mut m, _) = manager(ProjectConfig::default());
        assert!(!m.cancel_job(JobId(u64::MAX)));
    }
}

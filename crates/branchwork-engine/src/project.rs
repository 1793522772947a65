//! The project facade: a tree, its crunching manager and the two
//! synchronous simulation paths.

use std::fmt;
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use branchwork_core::{JobId, NodeId, Simpack, StepArgs, StepError, StepProfile};
use branchwork_tree::{Path, Tree, TreeLock};

use crate::config::ProjectConfig;
use crate::error::ProjectError;
use crate::iter::SimulationIter;
use crate::manager::CrunchingManager;
use crate::mode::{self, Refresh, StepMode};
use crate::profile::CrunchingProfile;

/// A simulation tree together with the machinery that grows it.
///
/// Background work is only requested here ([`ensure_buffer`],
/// [`begin_crunching`]); it is collected by [`sync_crunchers`], which the
/// owner calls whenever it wants progress. [`simulate`] and
/// [`iter_simulate`] advance a node synchronously on the calling thread.
///
/// Dropping a project retires all of its crunchers.
///
/// [`ensure_buffer`]: Project::ensure_buffer
/// [`begin_crunching`]: Project::begin_crunching
/// [`sync_crunchers`]: Project::sync_crunchers
/// [`simulate`]: Project::simulate
/// [`iter_simulate`]: Project::iter_simulate
pub struct Project<P: Simpack> {
    pub(crate) pack: Arc<P>,
    pub(crate) tree: TreeLock<P::State>,
    mode: Arc<dyn StepMode<P>>,
    manager: CrunchingManager<P>,
    pub(crate) default_step_function: String,
}

impl<P: Simpack> Project<P> {
    /// An empty project with thread crunchers.
    pub fn new(pack: P) -> Self {
        Self::assemble(pack, Tree::new(), ProjectConfig::default(), None)
    }

    /// An empty project using `config`.
    pub fn with_config(pack: P, config: ProjectConfig) -> Result<Self, ProjectError> {
        config.validate()?;
        Ok(Self::assemble(pack, Tree::new(), config, None))
    }

    pub(crate) fn assemble(
        pack: P,
        tree: Tree<P::State>,
        config: ProjectConfig,
        default_step_function: Option<String>,
    ) -> Self {
        let pack = Arc::new(pack);
        let tree = TreeLock::new(tree);
        let mode = mode::for_simpack(pack.as_ref());
        let default_step_function =
            default_step_function.unwrap_or_else(|| pack.default_step_function().to_owned());
        let manager = CrunchingManager::new(Arc::clone(&pack), tree.clone(), Arc::clone(&mode), config);
        Self {
            pack,
            tree,
            mode,
            manager,
            default_step_function,
        }
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// The simulation package.
    pub fn simpack(&self) -> &P {
        &self.pack
    }

    /// The shared tree. Take `read()` to inspect, `write()` to edit.
    pub fn tree(&self) -> &TreeLock<P::State> {
        &self.tree
    }

    /// The configuration crunchers are spawned with.
    pub fn config(&self) -> &ProjectConfig {
        self.manager.config()
    }

    /// The crunching manager.
    pub fn crunching_manager(&self) -> &CrunchingManager<P> {
        &self.manager
    }

    /// Mutable access to the crunching manager.
    pub fn crunching_manager_mut(&mut self) -> &mut CrunchingManager<P> {
        &mut self.manager
    }

    /// `"stateless"` or `"history-aware"`.
    pub fn step_mode(&self) -> &'static str {
        self.mode.name()
    }

    // ── Step profiles ──────────────────────────────────────────────

    /// Step function used when callers do not name one.
    pub fn default_step_function(&self) -> &str {
        &self.default_step_function
    }

    /// Change the default step function.
    pub fn set_default_step_function(&mut self, name: &str) -> Result<(), ProjectError> {
        self.check_function(name)?;
        self.default_step_function = name.to_owned();
        Ok(())
    }

    /// Build a step profile from caller arguments.
    ///
    /// An existing [`StepProfile`] is returned unchanged; otherwise the
    /// call's function, or the project default, is bound to its arguments.
    pub fn build_step_profile(&self, args: impl Into<StepArgs>) -> StepProfile {
        StepProfile::build(&self.default_step_function, args)
    }

    fn checked_profile(&self, args: impl Into<StepArgs>) -> Result<StepProfile, ProjectError> {
        let profile = self.build_step_profile(args);
        self.check_function(profile.function())?;
        Ok(profile)
    }

    fn check_function(&self, name: &str) -> Result<(), ProjectError> {
        if self.pack.has_step_function(name) {
            Ok(())
        } else {
            Err(StepError::UnknownStepFunction {
                name: name.to_owned(),
            }
            .into())
        }
    }

    // ── Roots and editing ──────────────────────────────────────────

    /// Add the simpack's plain root state as a new root.
    pub fn create_root(&self) -> NodeId {
        self.root_this_state(self.pack.create_root())
    }

    /// Add a randomized root state, reproducible from `seed`.
    pub fn create_messy_root(&self, seed: u64) -> NodeId {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.root_this_state(self.pack.create_messy_root(&mut rng))
    }

    /// Add `state` as a new root.
    pub fn root_this_state(&self, state: P::State) -> NodeId {
        self.tree.write().add_root(state)
    }

    /// Create an editable copy of `template` next to it.
    ///
    /// Jobs on the copy are not crunched until it is
    /// [finalized](Tree::finalize).
    pub fn fork_to_edit(&self, template: NodeId) -> Result<NodeId, ProjectError> {
        Ok(self.tree.write().fork_to_edit(template)?)
    }

    // ── Background crunching ───────────────────────────────────────

    /// Make sure every live leaf within `clock_buffer` of `node` is being
    /// crunched to `node.clock + clock_buffer`.
    ///
    /// Leaves that already have jobs get their targets raised; other
    /// leaves get a new job stepping with the profile that produced them
    /// (or the default profile for roots and edited nodes). Takes effect
    /// at the next [`sync_crunchers`](Project::sync_crunchers).
    pub fn ensure_buffer(&mut self, node: NodeId, clock_buffer: f64) -> Result<(), ProjectError> {
        let default_profile = self.build_step_profile(());
        let (target, requests) = {
            let tree = self.tree.read();
            let target = tree.clock(node)? + clock_buffer;
            let leaves = tree.get_all_leaves(node, clock_buffer)?;
            let mut requests = Vec::with_capacity(leaves.len());
            for leaf in leaves.keys() {
                let leaf = tree.get(*leaf)?;
                if leaf.ends() {
                    continue;
                }
                let profile = leaf.step_profile().cloned().unwrap_or_else(|| default_profile.clone());
                requests.push((leaf.id(), profile));
            }
            (target, requests)
        };
        for (leaf, profile) in requests {
            let existing: Vec<JobId> = self.manager.jobs_on(leaf).iter().map(|j| j.id()).collect();
            if existing.is_empty() {
                self.manager.add_job(leaf, CrunchingProfile::new(profile, target));
            } else {
                for job in existing {
                    self.manager.raise_target(job, target);
                }
            }
        }
        Ok(())
    }

    /// Make sure the leaf `path` reaches from `node` is being crunched to
    /// `node.clock + clock_buffer`.
    ///
    /// When the leaf already has jobs only the most recent one is raised,
    /// on the guess that it is the one the caller cares about. Returns the
    /// job, or `None` if the leaf's world has ended.
    pub fn ensure_buffer_on_path(
        &mut self,
        node: NodeId,
        path: &Path,
        clock_buffer: f64,
    ) -> Result<Option<JobId>, ProjectError> {
        let (leaf, target, profile) = {
            let tree = self.tree.read();
            let leaf = tree.get(path.last_node(&tree, node)?)?;
            if leaf.ends() {
                return Ok(None);
            }
            let target = tree.clock(node)? + clock_buffer;
            (leaf.id(), target, leaf.step_profile().cloned())
        };
        let latest = self.manager.jobs_on(leaf).last().map(|j| j.id());
        if let Some(job) = latest {
            self.manager.raise_target(job, target);
            return Ok(Some(job));
        }
        let profile = profile.unwrap_or_else(|| self.build_step_profile(()));
        Ok(Some(self.manager.add_job(leaf, CrunchingProfile::new(profile, target))))
    }

    /// Start a new job on `node`, even if others already target it.
    ///
    /// Every call grows its own fork, so repeating a call with the same
    /// arguments on a stochastic simpack yields another branch. `clock_buffer` of `None` crunches until cancelled or until
    /// the world ends.
    pub fn begin_crunching(
        &mut self,
        node: NodeId,
        clock_buffer: Option<f64>,
        args: impl Into<StepArgs>,
    ) -> Result<JobId, ProjectError> {
        let profile = self.checked_profile(args)?;
        let clock = self.tree.read().clock(node)?;
        let crunching = match clock_buffer {
            Some(buffer) => CrunchingProfile::new(profile, clock + buffer),
            None => CrunchingProfile::unbounded(profile),
        };
        Ok(self.manager.add_fork(node, crunching))
    }

    /// Cancel a job; see [`CrunchingManager::cancel_job`].
    pub fn cancel_job(&mut self, job: JobId) -> bool {
        self.manager.cancel_job(job)
    }

    /// Collect background output into the tree and (re)start crunchers.
    /// Returns the number of nodes added.
    pub fn sync_crunchers(&mut self) -> usize {
        self.manager.sync_crunchers()
    }

    // ── Synchronous paths ──────────────────────────────────────────

    /// Advance `node` by up to `iterations` steps, holding the write lock
    /// for the whole run. Returns the last node reached.
    ///
    /// If the world ends, the last node is marked as ended and returned
    /// early; any other step error is returned as is, leaving the nodes
    /// created so far in the tree.
    pub fn simulate(
        &self,
        node: NodeId,
        iterations: usize,
        args: impl Into<StepArgs>,
    ) -> Result<NodeId, ProjectError> {
        let profile = self.checked_profile(args)?;
        let mut tree = self.tree.write();
        let mut cursor = self.mode.open(&tree, node, Refresh::AfterFirstNode)?;
        for _ in 0..iterations {
            cursor.prepare(&tree)?;
            match self.mode.step(&self.pack, &tree, &cursor, &profile) {
                Ok(state) => {
                    let next = tree.add_state(state, Some(cursor.tail()), Some(profile.clone()))?;
                    cursor.advance(&tree, next)?;
                }
                Err(StepError::WorldEnded) => {
                    tree.make_end(cursor.tail(), Some(profile))?;
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(cursor.tail())
    }

    /// Lazy variant of [`simulate`](Project::simulate).
    ///
    /// Yields `node` first, then each new node. The write lock is taken
    /// only while a step is computed and committed, never while the
    /// caller holds a yielded node, and the history path is recomputed
    /// before every step.
    pub fn iter_simulate(
        &self,
        node: NodeId,
        iterations: usize,
        args: impl Into<StepArgs>,
    ) -> SimulationIter<P> {
        let profile = self.checked_profile(args);
        SimulationIter::new(
            Arc::clone(&self.pack),
            self.tree.clone(),
            Arc::clone(&self.mode),
            profile,
            node,
            iterations,
        )
    }
}

impl<P: Simpack> fmt::Display for Project<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "project containing {} nodes and employing {} crunchers",
            self.tree.read().len(),
            self.manager.cruncher_count()
        )
    }
}

impl<P: Simpack> fmt::Debug for Project<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("simpack", &self.pack.name())
            .field("nodes", &self.tree.read().len())
            .field("jobs", &self.manager.job_count())
            .field("crunchers", &self.manager.cruncher_count())
            .field("mode", &self.mode.name())
            .finish()
    }
}

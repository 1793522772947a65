//! Branchwork: forking simulation timelines with background crunching.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all branchwork sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use branchwork::prelude::*;
//! use branchwork::simpacks::RandomWalk;
//!
//! let mut project = Project::new(RandomWalk);
//! let root = project.create_root();
//!
//! // Synchronously, on this thread.
//! let tip = project.simulate(root, 10, ()).unwrap();
//! assert_eq!(project.tree().read().clock(tip).unwrap(), 10.0);
//!
//! // In the background: ask for 20 clock units past the root, then sync
//! // until the crunchers have delivered.
//! project.ensure_buffer(root, 20.0).unwrap();
//! while project.crunching_manager().job_count() > 0 {
//!     project.sync_crunchers();
//! }
//! let leaves = project.tree().read().get_all_leaves(root, f64::INFINITY).unwrap();
//! assert_eq!(leaves.values().copied().fold(0.0, f64::max), 20.0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `branchwork-core` | Ids, errors, step profiles, the simpack contract |
//! | [`tree`] | `branchwork-tree` | Node arena, paths, the shared tree lock |
//! | [`engine`] | `branchwork-engine` | Crunchers, the crunching manager, the project facade |
//! | [`simpacks`] | `branchwork-simpacks` | Reference simulation packages |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and traits (`branchwork-core`).
///
/// Implement [`types::Simpack`] and [`types::SimState`] to plug a
/// simulation into the engine.
pub use branchwork_core as types;

/// The simulation tree (`branchwork-tree`).
pub use branchwork_tree as tree;

/// Crunching and the project facade (`branchwork-engine`).
///
/// [`engine::Project`] is the usual entry point.
pub use branchwork_engine as engine;

/// Reference simulation packages (`branchwork-simpacks`).
pub use branchwork_simpacks as simpacks;

/// Common imports for typical branchwork usage.
pub mod prelude {
    // Core types and traits
    pub use branchwork_core::{
        HistoryAccess, JobId, NodeId, Rounding, SimState, Simpack, StepArg, StepCall, StepProfile,
    };

    // Errors
    pub use branchwork_core::{HistoryError, StepError, TreeError};
    pub use branchwork_engine::{PersistError, ProjectError};

    // Tree
    pub use branchwork_tree::{Node, Path, Tree, TreeLock};

    // Engine
    pub use branchwork_engine::{
        CruncherKind, CrunchingManager, HistoryBrowser, ProcessConfig, Project, ProjectConfig,
        SyncMetrics, WorkerFailure,
    };
}

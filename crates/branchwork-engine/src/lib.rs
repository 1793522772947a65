//! Crunching engine for branchwork.
//!
//! Grows a shared simulation tree in the background while the caller
//! inspects or edits it. A [`Project`] owns the tree and a
//! [`CrunchingManager`]; callers request work with
//! [`Project::ensure_buffer`] or [`Project::begin_crunching`] and collect
//! it with [`Project::sync_crunchers`]. [`Project::simulate`] and
//! [`Project::iter_simulate`] advance a node synchronously instead.
//!
//! # Architecture
//!
//! ```text
//! Project
//! ├── TreeLock<Tree>            shared, writer-preferring RwLock
//! ├── StepMode                  Stateless | HistoryAware (chosen once)
//! └── CrunchingManager
//!     ├── jobs: IndexMap<JobId, Job>          Job = node + CrunchingProfile
//!     └── crunchers: IndexMap<JobId, Box<dyn Cruncher>>
//!         ├── ThreadCruncher   named thread → crossbeam channel
//!         └── ProcessCruncher  worker process → stdout frames → reader thread
//! ```
//!
//! Background workers never touch the tree. The manager appends what they
//! produced, in production order, under the write lock.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod browser;
pub mod codec;
pub mod config;
pub mod cruncher;
pub mod error;
pub mod iter;
pub mod job;
pub mod manager;
pub mod metrics;
pub mod mode;
pub mod persist;
pub mod profile;
pub mod project;
pub mod worker;

pub use browser::{BranchView, HistoryBrowser};
pub use codec::WireError;
pub use config::{ConfigError, CruncherKind, ProcessConfig, ProjectConfig};
pub use cruncher::{Cruncher, CruncherEvent, ProcessCruncher, ThreadCruncher};
pub use error::{PersistError, ProjectError};
pub use iter::SimulationIter;
pub use job::Job;
pub use manager::{CrunchingManager, WorkerFailure};
pub use metrics::SyncMetrics;
pub use mode::{Cursor, HistoryAware, Refresh, Stateless, StepMode};
pub use profile::CrunchingProfile;
pub use project::Project;

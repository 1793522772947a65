//! Core types and traits for the branchwork crunching engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the contract a simulation package ("simpack") fulfils, the step
//! profiles that parameterize its step functions, the read-only history
//! interface used by history-dependent steps, and the lazy step sequence
//! shared by every execution path.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod history;
pub mod id;
pub mod profile;
pub mod simpack;
pub mod step;

pub use error::{HistoryError, StepError, TreeError};
pub use history::{BufferedHistory, HistoryAccess, Rounding};
pub use id::{CruncherId, JobId, NodeId};
pub use profile::{StepArg, StepArgs, StepCall, StepProfile};
pub use simpack::{SimState, Simpack};
pub use step::{Seed, StepSequence};

//! Engine-level error types.
//!
//! Core errors ([`TreeError`], [`StepError`], [`HistoryError`]) are
//! wrapped rather than flattened so callers can still match on them.

use thiserror::Error;

use branchwork_core::{HistoryError, StepError, TreeError};

use crate::codec::WireError;
use crate::config::ConfigError;

/// Errors from [`Project`](crate::Project) operations.
#[derive(Debug, Error)]
pub enum ProjectError {
    /// A tree operation failed (unknown node, invalid state, ...).
    #[error("tree: {0}")]
    Tree(#[from] TreeError),
    /// A step failed during a synchronous run.
    #[error("step: {0}")]
    Step(#[from] StepError),
    /// Branch history could not be read.
    #[error("history: {0}")]
    History(#[from] HistoryError),
    /// The project configuration is invalid.
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    /// Saving or loading failed.
    #[error("persistence: {0}")]
    Persist(#[from] PersistError),
}

impl ProjectError {
    /// The underlying step error, if this is one.
    pub fn as_step_error(&self) -> Option<&StepError> {
        match self {
            Self::Step(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors from saving or restoring a project.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The byte stream could not be read or written.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The restored tree is internally inconsistent.
    #[error("restored tree is invalid: {0}")]
    Tree(#[from] TreeError),
    /// The restored configuration is invalid.
    #[error("restored config is invalid: {0}")]
    Config(#[from] ConfigError),
    /// The saved project belongs to a different simpack.
    #[error("saved project uses simpack '{found}', expected '{expected}'")]
    SimpackMismatch {
        /// Name of the simpack loading the project.
        expected: String,
        /// Name recorded in the saved project.
        found: String,
    },
    /// The saved default step function is unknown to the simpack.
    #[error("saved default step function '{0}' is unknown to the simpack")]
    UnknownStepFunction(String),
    /// The stream ended without a project record.
    #[error("stream contains no project")]
    Empty,
    /// The stream ended before every recorded node was read.
    #[error("saved project lists {expected} nodes but only {found} were found")]
    MissingNodes {
        /// Node count recorded in the header.
        expected: u64,
        /// Nodes actually read.
        found: u64,
    },
}

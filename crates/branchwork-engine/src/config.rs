//! Project configuration, validation, and error types.
//!
//! [`ProjectConfig`] picks the cruncher substrate and bounds the pool.
//! [`validate()`](ProjectConfig::validate) runs when a project is built
//! and again when one is restored, since the config travels with saved
//! projects.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── ProcessConfig ──────────────────────────────────────────────────

/// How to launch a worker process for a process-backed cruncher.
///
/// The program must speak the frame protocol in [`codec`](crate::codec)
/// on stdin/stdout, e.g. a binary that calls
/// [`worker::serve`](crate::worker::serve).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Path to the worker executable.
    pub program: PathBuf,
    /// Extra command-line arguments passed to every worker.
    pub args: Vec<String>,
}

impl ProcessConfig {
    /// A worker launched as `program` with no extra arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append a command-line argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

// ── CruncherKind ───────────────────────────────────────────────────

/// Execution substrate for background crunchers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum CruncherKind {
    /// OS thread sharing memory with the project.
    #[default]
    Thread,
    /// Separate worker process; states cross the boundary serialized.
    Process(ProcessConfig),
}

impl CruncherKind {
    /// Short label used in logs and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Thread => "thread",
            Self::Process(_) => "process",
        }
    }
}

// ── ProjectConfig ──────────────────────────────────────────────────

/// Configuration for a [`Project`](crate::Project).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Which substrate new crunchers run on. Default: thread.
    pub cruncher: CruncherKind,
    /// Cap on concurrently running crunchers. `None` = no cap. Jobs
    /// beyond the cap wait for a later sync.
    pub max_crunchers: Option<usize>,
    /// Produced-but-uncollected states a cruncher may buffer before it
    /// blocks. Default: 1024.
    pub queue_capacity: usize,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            cruncher: CruncherKind::Thread,
            max_crunchers: None,
            queue_capacity: 1024,
        }
    }
}

impl ProjectConfig {
    /// Config using process crunchers launched per `process`.
    pub fn process(process: ProcessConfig) -> Self {
        Self {
            cruncher: CruncherKind::Process(process),
            ..Self::default()
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_crunchers == Some(0) {
            return Err(ConfigError::NoCrunchers);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::QueueCapacityZero);
        }
        if let CruncherKind::Process(process) = &self.cruncher {
            if process.program.as_os_str().is_empty() {
                return Err(ConfigError::MissingWorkerProgram);
            }
        }
        Ok(())
    }

    /// Remaining cruncher slots given `running` live crunchers.
    pub fn free_slots(&self, running: usize) -> usize {
        match self.max_crunchers {
            Some(max) => max.saturating_sub(running),
            None => usize::MAX,
        }
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected by [`ProjectConfig::validate()`].
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// `max_crunchers` is `Some(0)`, so no job could ever run.
    #[error("max_crunchers must be at least 1")]
    NoCrunchers,
    /// `queue_capacity` is zero.
    #[error("queue_capacity must be at least 1")]
    QueueCapacityZero,
    /// Process crunchers were requested without a worker program.
    #[error("process crunchers need a worker program")]
    MissingWorkerProgram,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(ProjectConfig::default().validate(), Ok(()));
        assert_eq!(ProjectConfig::default().cruncher.label(), "thread");
    }

    #[test]
    fn zero_crunchers_rejected() {
        let cfg = ProjectConfig {
            max_crunchers: Some(0),
            ..ProjectConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::NoCrunchers));
    }

    #[test]
    fn zero_queue_rejected() {
        let cfg = ProjectConfig {
            queue_capacity: 0,
            ..ProjectConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::QueueCapacityZero));
    }

    #[test]
    fn process_needs_program() {
        let cfg = ProjectConfig::process(ProcessConfig::new(""));
        assert_eq!(cfg.validate(), Err(ConfigError::MissingWorkerProgram));
        let cfg = ProjectConfig::process(ProcessConfig::new("worker").arg("-q"));
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!(cfg.cruncher.label(), "process");
    }

    #[test]
    fn free_slots_respects_cap() {
        let capped = ProjectConfig {
            max_crunchers: Some(2),
            ..ProjectConfig::default()
        };
        assert_eq!(capped.free_slots(0), 2);
        assert_eq!(capped.free_slots(3), 0);
        assert_eq!(ProjectConfig::default().free_slots(100), usize::MAX);
    }
}

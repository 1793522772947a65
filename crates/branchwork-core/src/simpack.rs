//! The simulation-package contract.
//!
//! A simpack supplies the state type, a set of named step functions and a
//! declaration of whether stepping needs history. The engine never
//! interprets states beyond reading their clock.

use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StepError;
use crate::history::HistoryAccess;
use crate::profile::StepProfile;

/// A simulation state value.
///
/// States are opaque to the engine except for their clock, a numeric
/// progress measure that must strictly increase along a branch. States
/// are serializable because they cross process boundaries and are
/// persisted with their tree.
pub trait SimState: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Progress value of this state.
    fn clock(&self) -> f64;
}

/// A simulation package: state type plus step functions.
///
/// Step functions are addressed by name through [`StepProfile::function`].
/// A simpack implements [`step`](Simpack::step) when its steps only need
/// the previous state, or [`history_step`](Simpack::history_step) when
/// [`history_dependent`](Simpack::history_dependent) is `true`.
///
/// Either step may return [`StepError::WorldEnded`] to terminate a branch.
pub trait Simpack: Send + Sync + 'static {
    /// The state type produced by this simpack.
    type State: SimState;

    /// Stable name, used to match a worker process to its simpack.
    fn name(&self) -> &str;

    /// A plain root state.
    fn create_root(&self) -> Self::State;

    /// A randomized root state. Defaults to [`create_root`](Simpack::create_root).
    fn create_messy_root(&self, rng: &mut dyn RngCore) -> Self::State {
        let _ = rng;
        self.create_root()
    }

    /// Name of the step function used when callers do not pick one.
    fn default_step_function(&self) -> &str;

    /// Names of every step function this simpack understands.
    fn step_functions(&self) -> &[&'static str];

    /// Whether stepping reads the branch history rather than just the
    /// previous state.
    fn history_dependent(&self) -> bool {
        false
    }

    /// Whether `name` is one of [`step_functions`](Simpack::step_functions).
    fn has_step_function(&self, name: &str) -> bool {
        self.step_functions().contains(&name)
    }

    /// Produce the successor of `state`.
    fn step(&self, state: &Self::State, profile: &StepProfile) -> Result<Self::State, StepError> {
        let _ = (state, profile);
        Err(StepError::Unsupported {
            simpack: self.name().to_owned(),
            mode: "stateless",
        })
    }

    /// Produce the successor of the last state in `history`.
    fn history_step(
        &self,
        history: &dyn HistoryAccess<Self::State>,
        profile: &StepProfile,
    ) -> Result<Self::State, StepError> {
        let _ = (history, profile);
        Err(StepError::Unsupported {
            simpack: self.name().to_owned(),
            mode: "history-aware",
        })
    }
}

//! The lazy step sequence shared by background workers.
//!
//! A [`StepSequence`] turns a simpack, a [`Seed`] and a [`StepProfile`]
//! into an infinite iterator of successor states. Thread crunchers and
//! process workers both drive it; callers decide when to stop (clock
//! target or a terminal error). The synchronous paths step against the
//! live tree instead and call the simpack one state at a time.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, StepError};
use crate::history::{BufferedHistory, HistoryAccess};
use crate::profile::StepProfile;
use crate::simpack::{SimState, Simpack};

/// Starting point of a step sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "S: Serialize", deserialize = "S: DeserializeOwned"))]
pub enum Seed<S> {
    /// Stateless stepping from a single state.
    State(S),
    /// History-aware stepping from a branch prefix, oldest first.
    History(Vec<S>),
}

impl<S: SimState> Seed<S> {
    /// Clock of the state the sequence will step from.
    pub fn clock(&self) -> Option<f64> {
        match self {
            Self::State(s) => Some(s.clock()),
            Self::History(states) => states.last().map(|s| s.clock()),
        }
    }
}

enum Memory<S> {
    Last(S),
    History(BufferedHistory<S>),
}

/// Infinite iterator of successor states.
///
/// Yields `Ok(state)` for each step. The first `Err` (including
/// [`StepError::WorldEnded`]) is yielded once and ends the sequence.
pub struct StepSequence<P: Simpack> {
    pack: Arc<P>,
    profile: StepProfile,
    memory: Memory<P::State>,
    halted: bool,
}

impl<P: Simpack> StepSequence<P> {
    /// Build a sequence stepping from `seed` with `profile`.
    ///
    /// Fails when the profile names a function the simpack lacks, or
    /// when a history seed is empty.
    pub fn new(pack: Arc<P>, seed: Seed<P::State>, profile: StepProfile) -> Result<Self, StepError> {
        if !pack.has_step_function(profile.function()) {
            return Err(StepError::UnknownStepFunction {
                name: profile.function().to_owned(),
            });
        }
        let memory = match seed {
            Seed::State(state) => Memory::Last(state),
            Seed::History(states) => {
                if states.is_empty() {
                    return Err(HistoryError::Empty.into());
                }
                Memory::History(BufferedHistory::from_states(states))
            }
        };
        Ok(Self {
            pack,
            profile,
            memory,
            halted: false,
        })
    }

    /// The profile every step is called with.
    pub fn profile(&self) -> &StepProfile {
        &self.profile
    }

    /// The state the next step will follow.
    pub fn current(&self) -> Option<&P::State> {
        match &self.memory {
            Memory::Last(state) => Some(state),
            Memory::History(history) => history.last_state().ok(),
        }
    }
}

impl<P: Simpack> Iterator for StepSequence<P> {
    type Item = Result<P::State, StepError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.halted {
            return None;
        }
        let produced = match &self.memory {
            Memory::Last(state) => self.pack.step(state, &self.profile),
            Memory::History(history) => self.pack.history_step(history, &self.profile),
        };
        match produced {
            Ok(state) => {
                match &mut self.memory {
                    Memory::Last(last) => *last = state.clone(),
                    Memory::History(history) => history.push(state.clone()),
                }
                Some(Ok(state))
            }
            Err(err) => {
                self.halted = true;
                Some(Err(err))
            }
        }
    }
}

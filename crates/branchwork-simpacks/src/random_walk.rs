//! One-dimensional random walk.
//!
//! Each step moves the walker one stride left or right. The direction
//! comes from a ChaCha8 stream seeded by the walker's seed and step count,
//! so the same state always has the same successor, whether it is stepped
//! in-process, in a worker process or after a save and load.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use branchwork_core::{SimState, Simpack, StepError, StepProfile};

use crate::step_rng;

/// Walker position at one moment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Walker {
    /// Steps taken; doubles as the clock.
    pub steps: u64,
    /// Current position.
    pub position: i64,
    /// Seed of the walk's random stream.
    pub seed: u64,
}

impl SimState for Walker {
    fn clock(&self) -> f64 {
        self.steps as f64
    }
}

/// Random-walk simpack.
///
/// | function       | behaviour                                                   |
/// |----------------|-------------------------------------------------------------|
/// | `walk`         | move `stride` (kwarg, default 1) left or right              |
/// | `walk_to_wall` | as `walk`; ends once the walker is `wall` (default 10) from 0 |
/// | `drift`        | as `walk`; moves right with probability `bias` (default 0.5) |
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomWalk;

impl RandomWalk {
    /// Simpack name.
    pub const NAME: &'static str = "random-walk";

    const FUNCTIONS: &'static [&'static str] = &["walk", "walk_to_wall", "drift"];

    fn advance(state: &Walker, stride: i64, bias: f64) -> Walker {
        let mut rng = step_rng(state.seed, state.steps);
        let right = rng.gen_bool(bias.clamp(0.0, 1.0));
        Walker {
            steps: state.steps + 1,
            position: state.position + if right { stride } else { -stride },
            seed: state.seed,
        }
    }
}

impl Simpack for RandomWalk {
    type State = Walker;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn create_root(&self) -> Walker {
        Walker {
            steps: 0,
            position: 0,
            seed: 0,
        }
    }

    fn create_messy_root(&self, rng: &mut dyn RngCore) -> Walker {
        Walker {
            steps: 0,
            position: rng.gen_range(-5..=5),
            seed: rng.next_u64(),
        }
    }

    fn default_step_function(&self) -> &str {
        "walk"
    }

    fn step_functions(&self) -> &[&'static str] {
        Self::FUNCTIONS
    }

    fn step(&self, state: &Walker, profile: &StepProfile) -> Result<Walker, StepError> {
        let stride = profile.kwarg_f64("stride", 1.0) as i64;
        match profile.function() {
            "walk" => Ok(Self::advance(state, stride, 0.5)),
            "walk_to_wall" => {
                let wall = profile.kwarg_f64("wall", 10.0) as i64;
                if state.position.abs() >= wall {
                    Err(StepError::WorldEnded)
                } else {
                    Ok(Self::advance(state, stride, 0.5))
                }
            }
            "drift" => Ok(Self::advance(state, stride, profile.kwarg_f64("bias", 0.5))),
            other => Err(StepError::UnknownStepFunction {
                name: other.to_owned(),
            }),
        }
    }
}

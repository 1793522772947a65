//! Reusable simpack fixtures.
//!
//! - [`CounterPack`]: stateless, one step function per behaviour under
//!   test (plain counting, custom increments, ending, panicking,
//!   regressing clocks, failing, slow steps).
//! - [`HistorySumPack`]: history-dependent; each clock is the sum of every
//!   earlier clock on the branch plus one, so any missing history shows up
//!   as a wrong clock.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use branchwork_core::{HistoryAccess, Rounding, SimState, Simpack, StepError, StepProfile};

/// Minimal state: a clock and a step counter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub clock: f64,
    pub steps: u64,
}

impl Tick {
    pub fn at(clock: f64) -> Self {
        Self { clock, steps: 0 }
    }

    fn next(&self, by: f64) -> Self {
        Self {
            clock: self.clock + by,
            steps: self.steps + 1,
        }
    }
}

impl SimState for Tick {
    fn clock(&self) -> f64 {
        self.clock
    }
}

/// Stateless counter with a step function per test behaviour.
///
/// | function     | behaviour                                               |
/// |--------------|---------------------------------------------------------|
/// | `step`       | clock + 1                                               |
/// | `step_by`    | clock + `arg 0` (or kwarg `amount`, default 1)          |
/// | `end_at`     | clock + 1, world ends once clock reaches kwarg `limit`  |
/// | `panic_at`   | clock + 1, panics once clock reaches kwarg `limit`      |
/// | `regress_at` | clock + 1, goes backwards once clock reaches `limit`    |
/// | `fail_at`    | clock + 1, returns an error once clock reaches `limit`  |
/// | `slow`       | clock + 1 after sleeping kwarg `millis` (default 5)     |
///
/// `limit` defaults to 3.
#[derive(Clone, Debug, Default)]
pub struct CounterPack;

impl CounterPack {
    pub const FUNCTIONS: &'static [&'static str] = &[
        "step",
        "step_by",
        "end_at",
        "panic_at",
        "regress_at",
        "fail_at",
        "slow",
    ];
}

impl Simpack for CounterPack {
    type State = Tick;

    fn name(&self) -> &str {
        "counter"
    }

    fn create_root(&self) -> Tick {
        Tick::at(0.0)
    }

    fn default_step_function(&self) -> &str {
        "step"
    }

    fn step_functions(&self) -> &[&'static str] {
        Self::FUNCTIONS
    }

    fn step(&self, state: &Tick, profile: &StepProfile) -> Result<Tick, StepError> {
        let limit = profile.kwarg_f64("limit", 3.0);
        let reached = state.clock >= limit;
        match profile.function() {
            "step" => Ok(state.next(1.0)),
            "step_by" => {
                let amount = profile.arg_f64(0, profile.kwarg_f64("amount", 1.0));
                Ok(state.next(amount))
            }
            "end_at" if reached => Err(StepError::WorldEnded),
            "panic_at" if reached => panic!("counter panicked at clock {}", state.clock),
            "regress_at" if reached => Ok(state.next(-1.0)),
            "fail_at" if reached => Err(StepError::Failed {
                reason: format!("counter failed at clock {}", state.clock),
            }),
            "end_at" | "panic_at" | "regress_at" | "fail_at" => Ok(state.next(1.0)),
            "slow" => {
                let millis = profile.kwarg_f64("millis", 5.0).max(0.0);
                thread::sleep(Duration::from_millis(millis as u64));
                Ok(state.next(1.0))
            }
            other => Err(StepError::UnknownStepFunction {
                name: other.to_owned(),
            }),
        }
    }
}

/// History-dependent fixture: next clock = sum of all clocks so far + 1.
///
/// From a root at clock 0 the branch runs 1, 2, 4, 8, 16, ...
#[derive(Clone, Debug, Default)]
pub struct HistorySumPack;

impl Simpack for HistorySumPack {
    type State = Tick;

    fn name(&self) -> &str {
        "history-sum"
    }

    fn create_root(&self) -> Tick {
        Tick::at(0.0)
    }

    fn default_step_function(&self) -> &str {
        "sum"
    }

    fn step_functions(&self) -> &[&'static str] {
        &["sum"]
    }

    fn history_dependent(&self) -> bool {
        true
    }

    fn history_step(
        &self,
        history: &dyn HistoryAccess<Tick>,
        _profile: &StepProfile,
    ) -> Result<Tick, StepError> {
        let mut sum = 0.0;
        for index in 0..history.len() {
            sum += history.get(index)?.clock;
        }
        let last = history.last_state()?;
        // Exercise clock lookup too: the tail must be addressable exactly.
        history.state_by_clock(last.clock, Rounding::Exact)?;
        Ok(Tick {
            clock: sum + 1.0,
            steps: last.steps + 1,
        })
    }
}

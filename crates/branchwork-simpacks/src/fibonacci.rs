//! History-dependent sequences.
//!
//! The successor of a term depends on earlier terms of the same branch,
//! which are read through [`HistoryAccess`]. A fork that edits a term
//! therefore continues from the edited value, while its siblings keep
//! their own past.

use serde::{Deserialize, Serialize};

use branchwork_core::{HistoryAccess, HistoryError, Rounding, SimState, Simpack, StepError, StepProfile};

/// One term of a sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    /// Position in the sequence; doubles as the clock.
    pub index: u64,
    /// The term's value. Saturates instead of overflowing.
    pub value: u64,
}

impl SimState for Term {
    fn clock(&self) -> f64 {
        self.index as f64
    }
}

/// History-dependent simpack.
///
/// | function | next value                                                  |
/// |----------|-------------------------------------------------------------|
/// | `next`   | sum of the last two terms (a missing term counts as 0)      |
/// | `lagged` | last term plus the term `lag` (kwarg, default 2) clocks back |
/// | `capped` | as `next`; the world ends once a value reaches `cap` (default 1000) |
#[derive(Clone, Copy, Debug, Default)]
pub struct Fibonacci;

impl Fibonacci {
    /// Simpack name.
    pub const NAME: &'static str = "fibonacci";

    const FUNCTIONS: &'static [&'static str] = &["next", "lagged", "capped"];

    fn successor(last: &Term, addend: u64) -> Term {
        Term {
            index: last.index + 1,
            value: last.value.saturating_add(addend),
        }
    }

    fn before_last(history: &dyn HistoryAccess<Term>) -> Result<u64, HistoryError> {
        match history.len() {
            0 | 1 => Ok(0),
            n => history.get(n - 2).map(|t| t.value),
        }
    }

    /// Value `lag` clocks before the tail, or 0 before the branch started.
    fn lagged(history: &dyn HistoryAccess<Term>, last: &Term, lag: f64) -> Result<u64, HistoryError> {
        match history.state_by_clock(last.clock() - lag, Rounding::Low) {
            Ok(term) => Ok(term.value),
            Err(HistoryError::BeforeStart { .. }) => Ok(0),
            Err(e) => Err(e),
        }
    }
}

impl Simpack for Fibonacci {
    type State = Term;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn create_root(&self) -> Term {
        Term { index: 0, value: 1 }
    }

    fn default_step_function(&self) -> &str {
        "next"
    }

    fn step_functions(&self) -> &[&'static str] {
        Self::FUNCTIONS
    }

    fn history_dependent(&self) -> bool {
        true
    }

    fn history_step(
        &self,
        history: &dyn HistoryAccess<Term>,
        profile: &StepProfile,
    ) -> Result<Term, StepError> {
        let last = history.last_state()?;
        match profile.function() {
            "next" => Ok(Self::successor(last, Self::before_last(history)?)),
            "lagged" => {
                let lag = profile.kwarg_f64("lag", 2.0);
                Ok(Self::successor(last, Self::lagged(history, last, lag)?))
            }
            "capped" => {
                let cap = profile.kwarg_f64("cap", 1000.0) as u64;
                if last.value >= cap {
                    return Err(StepError::WorldEnded);
                }
                Ok(Self::successor(last, Self::before_last(history)?))
            }
            other => Err(StepError::UnknownStepFunction {
                name: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchwork_core::{BufferedHistory, StepCall};

    fn run(function: &str, call: StepCall, steps: usize) -> Vec<u64> {
        let pack = Fibonacci;
        let profile = StepProfile::build(function, call);
        let mut history = BufferedHistory::from_states(vec![pack.create_root()]);
        for _ in 0..steps {
            let next = pack.history_step(&history, &profile).unwrap();
            history.push(next);
        }
        history.into_states().into_iter().map(|t| t.value).collect()
    }

    #[test]
    fn next_is_fibonacci() {
        assert_eq!(run("next", StepCall::new(), 7), vec![1, 1, 2, 3, 5, 8, 13, 21]);
    }

    #[test]
    fn lag_zero_doubles() {
        let values = run("lagged", StepCall::new().kwarg("lag", 0), 4);
        assert_eq!(values, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn lag_one_matches_next() {
        let lagged = run("lagged", StepCall::new().kwarg("lag", 1), 6);
        assert_eq!(lagged, run("next", StepCall::new(), 6));
    }

    #[test]
    fn default_lag_reaches_two_back() {
        // Terms before the root count as 0.
        let values = run("lagged", StepCall::new(), 6);
        assert_eq!(values, vec![1, 1, 1, 2, 3, 4, 6]);
    }

    #[test]
    fn cap_ends_the_world() {
        let pack = Fibonacci;
        let profile = StepProfile::build("capped", StepCall::new().kwarg("cap", 5));
        let history = BufferedHistory::from_states(vec![
            Term { index: 0, value: 3 },
            Term { index: 1, value: 5 },
        ]);
        assert_eq!(pack.history_step(&history, &profile), Err(StepError::WorldEnded));
    }

    #[test]
    fn stateless_step_is_unsupported() {
        let pack = Fibonacci;
        let err = pack
            .step(&pack.create_root(), &StepProfile::new("next"))
            .unwrap_err();
        assert!(matches!(err, StepError::Unsupported { .. }));
    }
}

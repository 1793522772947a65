//! Read-only, clock-indexed access to a branch's committed past.
//!
//! [`HistoryAccess`] is what history-dependent step functions see. The
//! engine provides two implementations: a tree-backed view used by the
//! synchronous paths, and [`BufferedHistory`], an owned copy used by
//! background workers that cannot touch the tree.

use crate::error::HistoryError;
use crate::simpack::SimState;

/// How [`HistoryAccess::state_by_clock`] resolves a clock that falls
/// between two recorded states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Rounding {
    /// Only a state with exactly the requested clock.
    Exact,
    /// The latest state at or before the requested clock.
    Low,
    /// The earliest state at or after the requested clock.
    High,
    /// Whichever neighbour is nearer; ties go to the earlier state.
    #[default]
    Closest,
}

/// Bounded, read-only window over one branch's history.
///
/// Index 0 is the oldest state (the branch root); the last index is the
/// tail. The tail's clock is the ceiling: nothing beyond it is visible.
pub trait HistoryAccess<S: SimState> {
    /// Number of visible states.
    fn len(&self) -> usize;

    /// State at position `index`, counted from the root.
    fn get(&self, index: usize) -> Result<&S, HistoryError>;

    /// Whether no states are visible.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The tail state.
    fn last_state(&self) -> Result<&S, HistoryError> {
        match self.len() {
            0 => Err(HistoryError::Empty),
            n => self.get(n - 1),
        }
    }

    /// Clock of the tail state.
    fn ceiling(&self) -> Result<f64, HistoryError> {
        self.last_state().map(|s| s.clock())
    }

    /// State located by clock.
    ///
    /// Fails with [`HistoryError::OutOfBounds`] when `clock` exceeds the
    /// ceiling, regardless of `rounding`.
    fn state_by_clock(&self, clock: f64, rounding: Rounding) -> Result<&S, HistoryError> {
        let len = self.len();
        if len == 0 {
            return Err(HistoryError::Empty);
        }
        let ceiling = self.get(len - 1)?.clock();
        if clock > ceiling {
            return Err(HistoryError::OutOfBounds {
                requested: clock,
                ceiling,
            });
        }
        let floor = self.get(0)?.clock();
        if clock < floor {
            return match rounding {
                Rounding::Exact => Err(HistoryError::NoExactMatch { requested: clock }),
                Rounding::Low => Err(HistoryError::BeforeStart {
                    requested: clock,
                    floor,
                }),
                Rounding::High | Rounding::Closest => self.get(0),
            };
        }

        // Largest index whose clock is <= `clock`. Clocks strictly
        // increase along a branch, so binary search applies.
        let (mut lo, mut hi) = (0usize, len - 1);
        while lo < hi {
            let mid = lo + (hi - lo).div_ceil(2);
            if self.get(mid)?.clock() <= clock {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        let low = self.get(lo)?;
        if low.clock() == clock {
            return Ok(low);
        }
        match rounding {
            Rounding::Exact => Err(HistoryError::NoExactMatch { requested: clock }),
            Rounding::Low => Ok(low),
            Rounding::High => self.get(lo + 1),
            Rounding::Closest => {
                let high = self.get(lo + 1)?;
                if high.clock() - clock < clock - low.clock() {
                    Ok(high)
                } else {
                    Ok(low)
                }
            }
        }
    }
}

/// Owned history: a committed prefix plus states produced since.
///
/// Background crunchers receive a copy of the branch up to their job's
/// node and append every state they produce, so the step function sees
/// the same history it would see in the tree.
#[derive(Clone, Debug)]
pub struct BufferedHistory<S> {
    states: Vec<S>,
}

impl<S: SimState> BufferedHistory<S> {
    /// Wrap an existing prefix, oldest first.
    pub fn from_states(states: Vec<S>) -> Self {
        Self { states }
    }

    /// Append a newly produced state as the new tail.
    pub fn push(&mut self, state: S) {
        self.states.push(state);
    }

    /// Consume the history, returning its states oldest first.
    pub fn into_states(self) -> Vec<S> {
        self.states
    }
}

impl<S: SimState> HistoryAccess<S> for BufferedHistory<S> {
    fn len(&self) -> usize {
        self.states.len()
    }

    fn get(&self, index: usize) -> Result<&S, HistoryError> {
        self.states.get(index).ok_or(HistoryError::IndexOutOfRange {
            index,
            len: self.states.len(),
        })
    }
}

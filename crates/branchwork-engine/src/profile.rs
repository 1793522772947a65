//! Crunching profiles: a step profile plus a clock target that only rises.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use branchwork_core::StepProfile;

/// The step profile a job is crunched with and the clock it must reach.
///
/// The target is shared: clones observe each other's raises, which is how
/// a thread cruncher sees a higher target without any message. It is
/// stored as `f64` bits and raised with a compare-and-swap loop, so it is
/// never lowered even under concurrent raises. `f64::INFINITY` means
/// crunch until stopped.
#[derive(Clone)]
pub struct CrunchingProfile {
    step_profile: StepProfile,
    target: Arc<AtomicU64>,
}

impl CrunchingProfile {
    /// Profile crunching toward `target`.
    pub fn new(step_profile: StepProfile, target: f64) -> Self {
        Self {
            step_profile,
            target: Arc::new(AtomicU64::new(target.to_bits())),
        }
    }

    /// Profile with no clock target.
    pub fn unbounded(step_profile: StepProfile) -> Self {
        Self::new(step_profile, f64::INFINITY)
    }

    /// The step profile every step runs with.
    pub fn step_profile(&self) -> &StepProfile {
        &self.step_profile
    }

    /// Current clock target.
    pub fn target(&self) -> f64 {
        f64::from_bits(self.target.load(Ordering::Acquire))
    }

    /// Whether the target is unbounded.
    pub fn is_unbounded(&self) -> bool {
        self.target() == f64::INFINITY
    }

    /// Set the target to `max(current, target)`.
    ///
    /// Returns `true` if the target moved. NaN is ignored.
    pub fn raise_target(&self, target: f64) -> bool {
        if target.is_nan() {
            return false;
        }
        self.target
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (target > f64::from_bits(bits)).then_some(target.to_bits())
            })
            .is_ok()
    }

    /// Whether a branch at `clock` has reached the target.
    pub fn is_reached(&self, clock: f64) -> bool {
        clock >= self.target()
    }
}

impl fmt::Debug for CrunchingProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrunchingProfile")
            .field("step_profile", &self.step_profile)
            .field("target", &self.target())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn profile(target: f64) -> CrunchingProfile {
        CrunchingProfile::new(StepProfile::new("step"), target)
    }

    #[test]
    fn raise_never_lowers() {
        let p = profile(5.0);
        assert!(!p.raise_target(3.0));
        assert_eq!(p.target(), 5.0);
        assert!(p.raise_target(8.0));
        assert_eq!(p.target(), 8.0);
        assert!(!p.raise_target(f64::NAN));
        assert_eq!(p.target(), 8.0);
    }

    #[test]
    fn clones_share_target() {
        let p = profile(1.0);
        let seen_by_worker = p.clone();
        p.raise_target(4.0);
        assert_eq!(seen_by_worker.target(), 4.0);
        assert!(seen_by_worker.is_reached(4.0));
        assert!(!seen_by_worker.is_reached(3.9));
    }

    #[test]
    fn unbounded_is_never_reached() {
        let p = CrunchingProfile::unbounded(StepProfile::new("step"));
        assert!(p.is_unbounded());
        assert!(!p.is_reached(f64::MAX));
        assert!(!p.raise_target(1e300));
    }

    #[test]
    fn concurrent_raises_keep_the_maximum() {
        let p = profile(0.0);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let p = p.clone();
                thread::spawn(move || {
                    for j in 0..100 {
                        p.raise_target(f64::from(i * 100 + j));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(p.target(), 799.0);
    }
}

//! Reference simulation packages for branchwork.
//!
//! Each simpack exercises a different part of the engine:
//!
//! - [`RandomWalk`]: stateless stepping, seeded randomness, world endings
//! - [`Prisoner`]: a larger state (an iterated prisoner's dilemma with
//!   natural selection) and randomized roots
//! - [`Fibonacci`]: history-dependent stepping through
//!   [`HistoryAccess`](branchwork_core::HistoryAccess)
//!
//! The `branchwork-worker` binary in this crate hosts any of them behind a
//! process cruncher; [`SIMPACKS`] lists the names it accepts.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fibonacci;
pub mod prisoner;
pub mod random_walk;

pub use fibonacci::{Fibonacci, Term};
pub use prisoner::{Move, Player, Prisoner, Strategy, Tournament};
pub use random_walk::{RandomWalk, Walker};

/// Names of the simpacks the worker binary can host.
pub const SIMPACKS: &[&str] = &[RandomWalk::NAME, Prisoner::NAME, Fibonacci::NAME];

/// Deterministic per-step RNG derived from a state's seed and step count.
pub(crate) fn step_rng(seed: u64, step: u64) -> rand_chacha::ChaCha8Rng {
    use rand::SeedableRng;
    rand_chacha::ChaCha8Rng::seed_from_u64(seed ^ step.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

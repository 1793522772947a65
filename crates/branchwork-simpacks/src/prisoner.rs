//! Iterated prisoner's dilemma with natural selection.
//!
//! Every round the players are shuffled into pairs and play one game each.
//! Every `cull_every` rounds the lowest scorer is replaced by a newcomer
//! using the top scorer's strategy, so successful strategies spread
//! through the population over the branch.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use branchwork_core::{SimState, Simpack, StepError, StepProfile};

use crate::step_rng;

/// A move in one game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Move {
    /// Stay silent.
    Cooperate,
    /// Betray the other player.
    Defect,
}

/// How a player picks its move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Always cooperates.
    Angel,
    /// Always defects.
    Devil,
    /// Cooperates first, then repeats the last move it faced.
    TitForTat,
}

impl Strategy {
    const ALL: [Strategy; 3] = [Strategy::Angel, Strategy::Devil, Strategy::TitForTat];
}

/// One member of the population.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// The player's strategy.
    pub strategy: Strategy,
    /// Points accumulated so far.
    pub points: i64,
    /// The last move an opponent played against this player.
    pub last_seen: Option<Move>,
}

impl Player {
    fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            points: 0,
            last_seen: None,
        }
    }

    fn choose(&self) -> Move {
        match self.strategy {
            Strategy::Angel => Move::Cooperate,
            Strategy::Devil => Move::Defect,
            Strategy::TitForTat => self.last_seen.unwrap_or(Move::Cooperate),
        }
    }
}

/// Population state after some number of rounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    /// Rounds played; doubles as the clock.
    pub round: u64,
    /// The population, in a stable order.
    pub players: Vec<Player>,
    /// Seed of the pairing stream.
    pub seed: u64,
}

impl Tournament {
    /// Number of players using `strategy`.
    pub fn count(&self, strategy: Strategy) -> usize {
        self.players.iter().filter(|p| p.strategy == strategy).count()
    }

    /// Whether every player uses the same strategy.
    pub fn is_dominated(&self) -> bool {
        match self.players.first() {
            Some(first) => self.players.iter().all(|p| p.strategy == first.strategy),
            None => true,
        }
    }
}

impl SimState for Tournament {
    fn clock(&self) -> f64 {
        self.round as f64
    }
}

/// Points for `(mine, theirs)`.
pub fn payoff(mine: Move, theirs: Move) -> i64 {
    match (mine, theirs) {
        (Move::Cooperate, Move::Cooperate) => 3,
        (Move::Cooperate, Move::Defect) => 0,
        (Move::Defect, Move::Cooperate) => 5,
        (Move::Defect, Move::Defect) => 1,
    }
}

/// Prisoner's dilemma simpack.
///
/// Step functions: `play` (one round) and `play_until_dominant` (as `play`,
/// but the world ends once one strategy has taken over). Both accept the
/// kwarg `cull_every` (default 10).
#[derive(Clone, Copy, Debug)]
pub struct Prisoner {
    /// Population size of [`create_root`](Simpack::create_root).
    pub population: usize,
}

impl Default for Prisoner {
    fn default() -> Self {
        Self { population: 21 }
    }
}

impl Prisoner {
    /// Simpack name.
    pub const NAME: &'static str = "prisoner";

    const FUNCTIONS: &'static [&'static str] = &["play", "play_until_dominant"];

    fn play(state: &Tournament, cull_every: u64) -> Tournament {
        let mut next = state.clone();
        next.round += 1;

        let mut rng = step_rng(state.seed, state.round);
        let mut order: Vec<usize> = (0..next.players.len()).collect();
        order.shuffle(&mut rng);
        for pair in order.chunks_exact(2) {
            let (a, b) = (pair[0], pair[1]);
            let move_a = next.players[a].choose();
            let move_b = next.players[b].choose();
            next.players[a].points += payoff(move_a, move_b);
            next.players[b].points += payoff(move_b, move_a);
            next.players[a].last_seen = Some(move_b);
            next.players[b].last_seen = Some(move_a);
        }

        if cull_every > 0 && next.round % cull_every == 0 {
            Self::cull(&mut next.players);
        }
        next
    }

    /// Replace the first lowest scorer with a copy of the first top
    /// scorer's strategy.
    fn cull(players: &mut [Player]) {
        let loser = players
            .iter()
            .enumerate()
            .min_by_key(|(i, p)| (p.points, *i))
            .map(|(i, _)| i);
        let winner = players
            .iter()
            .enumerate()
            .max_by_key(|(i, p)| (p.points, std::cmp::Reverse(*i)))
            .map(|(_, p)| p.strategy);
        if let (Some(loser), Some(strategy)) = (loser, winner) {
            players[loser] = Player::new(strategy);
        }
    }
}

impl Simpack for Prisoner {
    type State = Tournament;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn create_root(&self) -> Tournament {
        Tournament {
            round: 0,
            players: Strategy::ALL
                .iter()
                .cycle()
                .take(self.population)
                .map(|s| Player::new(*s))
                .collect(),
            seed: 0,
        }
    }

    fn create_messy_root(&self, rng: &mut dyn RngCore) -> Tournament {
        let population = rng.gen_range(self.population / 2..=self.population * 3 / 2).max(2);
        Tournament {
            round: 0,
            players: (0..population)
                .map(|_| Player::new(Strategy::ALL[rng.gen_range(0..Strategy::ALL.len())]))
                .collect(),
            seed: rng.next_u64(),
        }
    }

    fn default_step_function(&self) -> &str {
        "play"
    }

    fn step_functions(&self) -> &[&'static str] {
        Self::FUNCTIONS
    }

    fn step(&self, state: &Tournament, profile: &StepProfile) -> Result<Tournament, StepError> {
        let cull_every = profile.kwarg_f64("cull_every", 10.0).max(0.0) as u64;
        match profile.function() {
            "play" => Ok(Self::play(state, cull_every)),
            "play_until_dominant" if state.is_dominated() => Err(StepError::WorldEnded),
            "play_until_dominant" => Ok(Self::play(state, cull_every)),
            other => Err(StepError::UnknownStepFunction {
                name: other.to_owned(),
            }),
        }
    }
}

// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Game state and the pure decisions taken on inbound events.
//!
//! Decisions read a state snapshot and return an outcome plus an optional
//! [`Mutation`]; applying the mutation is a separate, explicit step. The state
//! itself is only reachable through [`SharedGameState`], so pause, move and war
//! handlers running on different delivery loops never touch it concurrently.

use crate::{
    game::{GameError, Location, Player, Unit, UnitRank},
    routing::{ArmyMove, PlayingState, RecognitionOfWar},
};
use std::sync::{Arc, Mutex, PoisonError};

/// A change to apply to the game state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    SetPaused(bool),
    /// Remove every unit of the local player at the location.
    RemoveUnitsIn(Location),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The move is our own, echoed back by the topic exchange.
    SamePlayer,
    Safe,
    /// The mover now shares a location with us.
    MakeWar,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarOutcome {
    /// The war concerns another defender.
    NotInvolved,
    /// The armies no longer share a location.
    NoUnits,
    OpponentWon { winner: String, loser: String },
    YouWon { winner: String, loser: String },
    Draw { attacker: String, defender: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    player: Player,
    paused: bool,
}

impl GameState {
    pub fn new(username: &str) -> GameState {
        GameState {
            player: Player::new(username),
            paused: false,
        }
    }

    pub fn username(&self) -> &str {
        &self.player.username
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::SetPaused(paused) => self.paused = paused,
            Mutation::RemoveUnitsIn(location) => {
                self.player.units.retain(|_, u| u.location != location)
            }
        }
    }

    /// Adds a unit for the local player.
    ///
    /// # Parameters
    /// * `location` - Where the unit is placed
    /// * `rank` - Rank of the new unit
    ///
    /// # Returns
    /// The id of the new unit, or `GameError::Paused` while the game is paused
    pub fn spawn(&mut self, location: Location, rank: UnitRank) -> Result<u32, GameError> {
        if self.paused {
            return Err(GameError::Paused);
        }

        let id = self.player.units.keys().next_back().map_or(1, |last| last + 1);
        self.player.units.insert(id, Unit { id, rank, location });
        Ok(id)
    }

    /// Moves the given units of the local player.
    ///
    /// Either every unit moves or none does.
    ///
    /// # Parameters
    /// * `to` - Destination
    /// * `ids` - Ids of the units to move
    ///
    /// # Returns
    /// * `Ok(ArmyMove)` - The move to broadcast
    /// * `Err(GameError::Paused)` - The game is paused
    /// * `Err(GameError::UnitNotFound)` - One of the ids is unknown
    pub fn move_units(&mut self, to: Location, ids: &[u32]) -> Result<ArmyMove, GameError> {
        if self.paused {
            return Err(GameError::Paused);
        }
        if let Some(missing) = ids.iter().find(|id| !self.player.units.contains_key(*id)) {
            return Err(GameError::UnitNotFound(*missing));
        }

        let mut units = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(unit) = self.player.units.get_mut(id) {
                unit.location = to;
                units.push(*unit);
            }
        }

        Ok(ArmyMove {
            player: self.player.clone(),
            units,
            to_location: to,
        })
    }
}

/// Pause or resume the local player.
pub fn handle_pause(_state: &GameState, ps: &PlayingState) -> Option<Mutation> {
    Some(Mutation::SetPaused(ps.is_paused))
}

/// Classifies a move broadcast by any player.
///
/// # Parameters
/// * `state` - Local state
/// * `mv` - The move, carrying the mover's whole army
///
/// # Returns
/// The outcome and no mutation; a war is only recognized here, fought later
pub fn handle_move(state: &GameState, mv: &ArmyMove) -> (MoveOutcome, Option<Mutation>) {
    if mv.player.username == state.player.username {
        return (MoveOutcome::SamePlayer, None);
    }

    match state.player.overlapping_location(&mv.player) {
        Some(_) => (MoveOutcome::MakeWar, None),
        None => (MoveOutcome::Safe, None),
    }
}

/// Fights a war addressed to the local player.
///
/// The strongest side in the overlapping location wins. A draw or a loss
/// costs the local player every unit there.
///
/// # Parameters
/// * `state` - Local state of the defender
/// * `war` - The war recognition
///
/// # Returns
/// The outcome and the mutation to apply once the result is logged
pub fn handle_war(state: &GameState, war: &RecognitionOfWar) -> (WarOutcome, Option<Mutation>) {
    if war.defender.username != state.player.username {
        return (WarOutcome::NotInvolved, None);
    }

    let Some(location) = war.attacker.overlapping_location(&state.player) else {
        return (WarOutcome::NoUnits, None);
    };

    let attacker = war.attacker.username.clone();
    let defender = state.player.username.clone();
    let attacker_power = war.attacker.power_in(location);
    let defender_power = state.player.power_in(location);

    let outcome = if attacker_power > defender_power {
        WarOutcome::OpponentWon {
            winner: attacker,
            loser: defender,
        }
    } else if defender_power > attacker_power {
        WarOutcome::YouWon {
            winner: defender,
            loser: attacker,
        }
    } else {
        WarOutcome::Draw { attacker, defender }
    };

    let mutation = match outcome {
        WarOutcome::YouWon { .. } => None,
        _ => Some(Mutation::RemoveUnitsIn(location)),
    };

    (outcome, mutation)
}

/// The only handle on a [`GameState`]; every access is a scoped closure.
#[derive(Debug, Clone)]
pub struct SharedGameState {
    inner: Arc<Mutex<GameState>>,
}

impl SharedGameState {
    pub fn new(state: GameState) -> SharedGameState {
        SharedGameState {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut GameState) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *guard)
    }

    /// Runs a pure decision and applies its mutation under one lock.
    ///
    /// # Parameters
    /// * `decide` - Reads the state and returns an outcome plus an optional
    ///   mutation
    ///
    /// # Returns
    /// The outcome of `decide`
    pub fn decide<O>(&self, decide: impl FnOnce(&GameState) -> (O, Option<Mutation>)) -> O {
        self.with(|state| {
            let (outcome, mutation) = decide(state);
            if let Some(mutation) = mutation {
                state.apply(mutation);
            }
            outcome
        })
    }

    pub fn snapshot(&self) -> GameState {
        self.with(|state| state.clone())
    }
}

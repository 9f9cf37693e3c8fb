// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Game Layer
//!
//! Players, units and locations, the single-writer game state with its pure
//! decision functions, the handlers that turn decisions into acknowledgments,
//! and the console commands.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error;

pub mod commands;
pub mod handlers;
pub mod state;

pub use commands::{ClientCommand, ServerCommand};
pub use handlers::{MoveHandler, PauseHandler, WarHandler};
pub use state::{GameState, MoveOutcome, Mutation, SharedGameState, WarOutcome};

/// Errors raised by game rules and console input.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GameError {
    #[error("unknown location `{0}`")]
    UnknownLocation(String),

    #[error("unknown unit rank `{0}`")]
    UnknownRank(String),

    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unit `{0}` not found")]
    UnitNotFound(u32),

    #[error("the game is paused")]
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Americas,
    Europe,
    Africa,
    Asia,
    Antarctica,
    Australia,
}

impl Location {
    pub const ALL: [Location; 6] = [
        Location::Americas,
        Location::Europe,
        Location::Africa,
        Location::Asia,
        Location::Antarctica,
        Location::Australia,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Location::Americas => "americas",
            Location::Europe => "europe",
            Location::Africa => "africa",
            Location::Asia => "asia",
            Location::Antarctica => "antarctica",
            Location::Australia => "australia",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::ALL
            .into_iter()
            .find(|loc| loc.as_str() == s)
            .ok_or_else(|| GameError::UnknownLocation(s.to_owned()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitRank {
    Infantry,
    Cavalry,
    Artillery,
}

impl UnitRank {
    /// Fighting power of a unit of this rank.
    pub fn power(&self) -> u32 {
        match self {
            UnitRank::Infantry => 1,
            UnitRank::Cavalry => 5,
            UnitRank::Artillery => 10,
        }
    }
}

impl fmt::Display for UnitRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitRank::Infantry => f.write_str("infantry"),
            UnitRank::Cavalry => f.write_str("cavalry"),
            UnitRank::Artillery => f.write_str("artillery"),
        }
    }
}

impl FromStr for UnitRank {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "infantry" => Ok(UnitRank::Infantry),
            "cavalry" => Ok(UnitRank::Cavalry),
            "artillery" => Ok(UnitRank::Artillery),
            _ => Err(GameError::UnknownRank(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: u32,
    pub rank: UnitRank,
    pub location: Location,
}

/// A player and the units they own, keyed by unit id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Player {
    pub username: String,
    pub units: BTreeMap<u32, Unit>,
}

impl Player {
    pub fn new(username: &str) -> Player {
        Player {
            username: username.to_owned(),
            units: BTreeMap::default(),
        }
    }

    pub fn units_in(&self, location: Location) -> impl Iterator<Item = &Unit> {
        self.units.values().filter(move |u| u.location == location)
    }

    /// Total power of this player's units at `location`.
    pub fn power_in(&self, location: Location) -> u32 {
        self.units_in(location).map(|u| u.rank.power()).sum()
    }

    /// First location where both players have units.
    pub fn overlapping_location(&self, other: &Player) -> Option<Location> {
        self.units
            .values()
            .map(|u| u.location)
            .find(|loc| other.units_in(*loc).next().is_some())
    }
}

// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Console commands, one variant per command.

use crate::game::{GameError, Location, UnitRank};
use std::str::FromStr;

pub const CLIENT_HELP: &str = "\
Possible commands:
* spawn <location> <rank>
    example: spawn europe infantry
* move <location> <unitID> <unitID> <unitID>...
    example: move asia 1
* status
* spam <n>
    example: spam 5
* help
* quit";

pub const SERVER_HELP: &str = "\
Possible commands:
* pause <player>...
* resume <player>...
* help
* quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Spawn { location: Location, rank: UnitRank },
    Move { location: Location, units: Vec<u32> },
    Status,
    Spam(u32),
    Help,
    Quit,
}

impl FromStr for ClientCommand {
    type Err = GameError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();

        match words.as_slice() {
            ["spawn", location, rank] => Ok(ClientCommand::Spawn {
                location: location.parse()?,
                rank: rank.parse()?,
            }),
            ["spawn", ..] => Err(GameError::Usage("spawn <location> <rank>")),
            ["move", location, ids @ ..] if !ids.is_empty() => Ok(ClientCommand::Move {
                location: location.parse()?,
                units: ids
                    .iter()
                    .map(|id| {
                        id.parse::<u32>()
                            .map_err(|_| GameError::Usage("move <location> <unitID>..."))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            }),
            ["move", ..] => Err(GameError::Usage("move <location> <unitID>...")),
            ["status"] => Ok(ClientCommand::Status),
            ["spam", n] => n
                .parse()
                .map(ClientCommand::Spam)
                .map_err(|_| GameError::Usage("spam <n>")),
            ["spam", ..] => Err(GameError::Usage("spam <n>")),
            ["help"] => Ok(ClientCommand::Help),
            ["quit"] => Ok(ClientCommand::Quit),
            [other, ..] => Err(GameError::UnknownCommand((*other).to_owned())),
            [] => Err(GameError::UnknownCommand(String::new())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Pause(Vec<String>),
    Resume(Vec<String>),
    Help,
    Quit,
}

impl FromStr for ServerCommand {
    type Err = GameError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let owned = |players: &[&str]| -> Vec<String> {
            players.iter().map(|p| (*p).to_owned()).collect()
        };

        match words.as_slice() {
            ["pause", players @ ..] if !players.is_empty() => {
                Ok(ServerCommand::Pause(owned(players)))
            }
            ["pause"] => Err(GameError::Usage("pause <player>...")),
            ["resume", players @ ..] if !players.is_empty() => {
                Ok(ServerCommand::Resume(owned(players)))
            }
            ["resume"] => Err(GameError::Usage("resume <player>...")),
            ["help"] => Ok(ServerCommand::Help),
            ["quit"] => Ok(ServerCommand::Quit),
            [other, ..] => Err(GameError::UnknownCommand((*other).to_owned())),
            [] => Err(GameError::UnknownCommand(String::new())),
        }
    }
}

// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Routing Vocabulary
//!
//! Exchange names, routing-key prefixes and the wire types exchanged by
//! servers and clients. Keys follow `<prefix>.<token>` where the token is a
//! player name, or `*` in a binding pattern.

use crate::{
    codec::{BincodeCodec, JsonCodec, WireMessage},
    exchange::ExchangeDefinition,
    game::{Location, Player, Unit},
};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Direct exchange for control messages
pub const EXCHANGE_PERIL_DIRECT: &str = "peril_direct";
/// Topic exchange for gameplay and log events
pub const EXCHANGE_PERIL_TOPIC: &str = "peril_topic";
/// Dead-letter exchange attached to every queue
pub const EXCHANGE_PERIL_DLX: &str = "peril_dlx";

pub const PAUSE_KEY: &str = "pause";
pub const ARMY_MOVES_PREFIX: &str = "army_moves";
pub const WAR_RECOGNITIONS_PREFIX: &str = "war_recognitions";
pub const GAME_LOG_SLUG: &str = "game_logs";

/// Shared durable queue for war recognitions
pub const WAR_QUEUE: &str = "war";

/// Requeue bound on [`WAR_QUEUE`]. Players requeue every war they do not
/// defend, so a war waiting for an offline defender must never be discarded.
pub const WAR_QUEUE_MAX_REQUEUES: Option<u32> = None;

/// `<prefix>.<token>`
pub fn routing_key(prefix: &str, token: &str) -> String {
    format!("{}.{}", prefix, token)
}

/// Binding pattern matching every token under `prefix`.
pub fn binding_pattern(prefix: &str) -> String {
    routing_key(prefix, "*")
}

/// Exchanges the game expects to exist, declared once by the server.
pub fn exchanges() -> Vec<ExchangeDefinition> {
    vec![
        ExchangeDefinition::new(EXCHANGE_PERIL_DIRECT).direct().durable(),
        ExchangeDefinition::new(EXCHANGE_PERIL_TOPIC).topic().durable(),
        ExchangeDefinition::new(EXCHANGE_PERIL_DLX).fanout().durable(),
    ]
}

/// Pause control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayingState {
    #[serde(rename = "IsPaused")]
    pub is_paused: bool,
}

impl WireMessage for PlayingState {
    type Codec = JsonCodec;
}

/// A player moving units to a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmyMove {
    pub player: Player,
    pub units: Vec<Unit>,
    pub to_location: Location,
}

impl WireMessage for ArmyMove {
    type Codec = JsonCodec;
}

/// Two players' armies met on the same location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionOfWar {
    pub attacker: Player,
    pub defender: Player,
}

impl WireMessage for RecognitionOfWar {
    type Codec = JsonCodec;
}

/// Free-text log record, only exchanged between peril processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameLog {
    pub current_time: SystemTime,
    pub message: String,
    pub username: String,
}

impl WireMessage for GameLog {
    type Codec = BincodeCodec;
}

impl GameLog {
    pub fn new(username: &str, message: impl Into<String>) -> GameLog {
        GameLog {
            current_time: SystemTime::now(),
            message: message.into(),
            username: username.to_owned(),
        }
    }
}

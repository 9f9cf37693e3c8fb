// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Delivery handlers of a game client.
//!
//! Each handler runs a pure decision against the shared state and maps the
//! outcome to an [`AckDecision`]. Follow-up events are published from the
//! handler; a failed follow-up publish asks for a redelivery.

use crate::{
    ack::AckDecision,
    game::state::{
        handle_move, handle_pause, handle_war, MoveOutcome, SharedGameState, WarOutcome,
    },
    handler::Handler,
    publisher::{MessageSink, RabbitMQPublisher},
    routing::{
        routing_key, ArmyMove, GameLog, PlayingState, RecognitionOfWar, EXCHANGE_PERIL_TOPIC,
        GAME_LOG_SLUG, WAR_RECOGNITIONS_PREFIX,
    },
};
use async_trait::async_trait;
use lapin::Channel;
use std::sync::Arc;
use tracing::{error, info};

pub struct PauseHandler {
    state: SharedGameState,
}

impl PauseHandler {
    pub fn new(state: SharedGameState) -> PauseHandler {
        PauseHandler { state }
    }
}

#[async_trait]
impl Handler<PlayingState> for PauseHandler {
    async fn handle(&self, ps: PlayingState) -> AckDecision {
        self.state.decide(|s| ((), handle_pause(s, &ps)));

        if ps.is_paused {
            info!("==> pausing game");
        } else {
            info!("==> resuming game");
        }

        AckDecision::Accept
    }
}

pub struct MoveHandler<S: ?Sized = Channel> {
    state: SharedGameState,
    publisher: Arc<RabbitMQPublisher<S>>,
}

impl<S: MessageSink + ?Sized> MoveHandler<S> {
    pub fn new(state: SharedGameState, publisher: Arc<RabbitMQPublisher<S>>) -> MoveHandler<S> {
        MoveHandler { state, publisher }
    }
}

#[async_trait]
impl<S> Handler<ArmyMove> for MoveHandler<S>
where
    S: MessageSink + ?Sized + 'static,
{
    async fn handle(&self, mv: ArmyMove) -> AckDecision {
        info!(
            player = mv.player.username,
            units = mv.units.len(),
            to = %mv.to_location,
            "move detected"
        );

        match self.state.decide(|s| handle_move(s, &mv)) {
            MoveOutcome::SamePlayer | MoveOutcome::Safe => AckDecision::Accept,
            MoveOutcome::MakeWar => {
                let defender = self.state.with(|s| s.player().clone());
                let key = routing_key(WAR_RECOGNITIONS_PREFIX, &defender.username);
                info!(attacker = mv.player.username, "you are at war");

                let war = RecognitionOfWar {
                    attacker: mv.player,
                    defender,
                };

                match self.publisher.publish(EXCHANGE_PERIL_TOPIC, &key, &war).await {
                    Ok(_) => AckDecision::Accept,
                    Err(err) => {
                        error!(error = err.to_string(), "error publishing war recognition");
                        AckDecision::RetryRequeue
                    }
                }
            }
        }
    }
}

pub struct WarHandler<S: ?Sized = Channel> {
    state: SharedGameState,
    publisher: Arc<RabbitMQPublisher<S>>,
}

impl<S: MessageSink + ?Sized> WarHandler<S> {
    pub fn new(state: SharedGameState, publisher: Arc<RabbitMQPublisher<S>>) -> WarHandler<S> {
        WarHandler { state, publisher }
    }
}

#[async_trait]
impl<S> Handler<RecognitionOfWar> for WarHandler<S>
where
    S: MessageSink + ?Sized + 'static,
{
    async fn handle(&self, war: RecognitionOfWar) -> AckDecision {
        // losses are applied only once the log is out, so a retry decides
        // the same war again
        let (outcome, mutation, username) = self.state.with(|s| {
            let (outcome, mutation) = handle_war(s, &war);
            (outcome, mutation, s.username().to_owned())
        });

        let message = match outcome {
            WarOutcome::NotInvolved => return AckDecision::RetryRequeue,
            WarOutcome::NoUnits => return AckDecision::Discard,
            WarOutcome::OpponentWon { winner, loser } | WarOutcome::YouWon { winner, loser } => {
                format!("{} won a war against {}", winner, loser)
            }
            WarOutcome::Draw { attacker, defender } => {
                format!("A war between {} and {} resulted in a draw", attacker, defender)
            }
        };
        info!("{}", message);

        let log = GameLog::new(&username, message);
        let key = routing_key(GAME_LOG_SLUG, &username);

        match self.publisher.publish(EXCHANGE_PERIL_TOPIC, &key, &log).await {
            Ok(_) => {
                if let Some(mutation) = mutation {
                    self.state.with(|s| s.apply(mutation));
                }
                AckDecision::Accept
            }
            Err(err) => {
                error!(error = err.to_string(), "error publishing game log");
                AckDecision::RetryRequeue
            }
        }
    }
}

// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Peril client: one player, reacting to pauses, moves and wars while the
//! console spawns and moves units.
//!
//! Run with: `cargo run --bin peril-client`

use clap::Parser;
use futures_util::future::select_all;
use peril::{
    channel::AmqpConnection,
    configs::BrokerArgs,
    dispatcher::{RabbitMQDispatcher, Subscription},
    errors::AmqpError,
    game::{
        commands::CLIENT_HELP, ClientCommand, GameState, MoveHandler, PauseHandler,
        SharedGameState, WarHandler,
    },
    publisher::RabbitMQPublisher,
    queue::QueueDurability,
    routing::{
        binding_pattern, routing_key, ArmyMove, GameLog, PlayingState, RecognitionOfWar,
        ARMY_MOVES_PREFIX, EXCHANGE_PERIL_DIRECT, EXCHANGE_PERIL_TOPIC, GAME_LOG_SLUG,
        PAUSE_KEY, WAR_QUEUE, WAR_QUEUE_MAX_REQUEUES, WAR_RECOGNITIONS_PREFIX,
    },
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SPAM_LINES: [&str; 4] = [
    "Never interrupt your enemy when he is making a mistake.",
    "The hardest thing of all for a soldier is to retreat.",
    "All warfare is based on deception.",
    "Victorious warriors win first and then go to war.",
];

#[derive(Parser, Debug)]
#[command(name = "peril-client")]
#[command(about = "Peril game client")]
struct Args {
    #[command(flatten)]
    broker: BrokerArgs,

    /// Player name. Asked on the console when missing.
    #[arg(long, env = "PERIL_USERNAME")]
    username: Option<String>,
}

async fn subscribe_all(
    dispatcher: &RabbitMQDispatcher,
    state: &SharedGameState,
    publisher: &Arc<RabbitMQPublisher>,
    username: &str,
) -> anyhow::Result<Vec<Subscription>> {
    let pause_queue = routing_key(PAUSE_KEY, username);
    let pause = dispatcher
        .subscribe::<PlayingState, _>(
            EXCHANGE_PERIL_DIRECT,
            &pause_queue,
            &pause_queue,
            QueueDurability::Transient,
            PauseHandler::new(state.clone()),
        )
        .await?;

    let moves = dispatcher
        .subscribe::<ArmyMove, _>(
            EXCHANGE_PERIL_TOPIC,
            &routing_key(ARMY_MOVES_PREFIX, username),
            &binding_pattern(ARMY_MOVES_PREFIX),
            QueueDurability::Transient,
            MoveHandler::new(state.clone(), publisher.clone()),
        )
        .await?;

    // wars for other players keep cycling until their defender shows up
    let wars = dispatcher
        .clone()
        .max_requeues(WAR_QUEUE_MAX_REQUEUES)
        .subscribe::<RecognitionOfWar, _>(
            EXCHANGE_PERIL_TOPIC,
            WAR_QUEUE,
            &binding_pattern(WAR_RECOGNITIONS_PREFIX),
            QueueDurability::Durable,
            WarHandler::new(state.clone(), publisher.clone()),
        )
        .await?;

    Ok(vec![pause, moves, wars])
}

/// Resolves once the first delivery loop ends.
async fn first_stopped(subscriptions: &mut [Subscription]) -> Result<(), AmqpError> {
    let joins = subscriptions.iter_mut().map(|s| Box::pin(s.join()));
    let (result, index, _) = select_all(joins).await;
    warn!(index, "subscription stopped");
    result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("peril=info".parse()?))
        .init();

    let args = Args::parse();
    let cfg = args.broker.into_configs("peril-client");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let username = match args.username {
        Some(name) => name,
        None => {
            println!("Please enter your username:");
            let Some(name) = lines.next_line().await? else {
                return Ok(());
            };
            name.trim().to_owned()
        }
    };
    if username.is_empty() || username.contains(['.', '*', '#']) {
        anyhow::bail!("invalid username `{}`", username);
    }
    info!(username, "Peril client starting...");

    let conn = AmqpConnection::connect(&cfg).await?;
    let state = SharedGameState::new(GameState::new(&username));

    // Handlers and the console publish from separate channels.
    let handler_publisher = RabbitMQPublisher::new(conn.open_channel().await?);
    let console_publisher = RabbitMQPublisher::new(conn.open_channel().await?);

    let dispatcher = RabbitMQDispatcher::new(conn.clone(), &cfg);
    let mut subscriptions =
        subscribe_all(&dispatcher, &state, &handler_publisher, &username).await?;

    println!("{}", CLIENT_HELP);

    let mut failure = None;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            result = first_stopped(&mut subscriptions) => {
                failure = result.err();
                None
            }
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<ClientCommand>() {
            Ok(command) => command,
            Err(err) => {
                warn!("{}", err);
                continue;
            }
        };

        match command {
            ClientCommand::Spawn { location, rank } => {
                match state.with(|s| s.spawn(location, rank)) {
                    Ok(id) => println!("Spawned a(n) {} in {} with id {}", rank, location, id),
                    Err(err) => warn!("{}", err),
                }
            }
            ClientCommand::Move { location, units } => {
                let mv = match state.with(|s| s.move_units(location, &units)) {
                    Ok(mv) => mv,
                    Err(err) => {
                        warn!("{}", err);
                        continue;
                    }
                };

                let key = routing_key(ARMY_MOVES_PREFIX, &username);
                match console_publisher.publish(EXCHANGE_PERIL_TOPIC, &key, &mv).await {
                    Ok(_) => println!("Moved {} unit(s) to {}", mv.units.len(), location),
                    Err(err) => error!(error = err.to_string(), "error publishing move"),
                }
            }
            ClientCommand::Status => {
                let snapshot = state.snapshot();
                println!("Player: {}", snapshot.username());
                if snapshot.is_paused() {
                    println!("The game is paused.");
                }
                for unit in snapshot.player().units.values() {
                    println!("* {}: {}, {}", unit.id, unit.location, unit.rank);
                }
            }
            ClientCommand::Spam(n) => {
                let key = routing_key(GAME_LOG_SLUG, &username);
                for message in SPAM_LINES.iter().cycle().take(n as usize) {
                    let log = GameLog::new(&username, *message);
                    let published = console_publisher.publish(EXCHANGE_PERIL_TOPIC, &key, &log);
                    if let Err(err) = published.await {
                        error!(error = err.to_string(), "error publishing game log");
                        break;
                    }
                }
            }
            ClientCommand::Help => println!("{}", CLIENT_HELP),
            ClientCommand::Quit => break,
        }
    }

    info!("Peril client shutting down");
    for subscription in &subscriptions {
        subscription.abort();
    }
    conn.close().await?;

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Peril server: provisions the exchanges, records game logs and pauses or
//! resumes players from the console.
//!
//! Run with: `cargo run --bin peril-server`

use clap::Parser;
use peril::{
    ack::AckDecision,
    channel::AmqpConnection,
    configs::BrokerArgs,
    dispatcher::RabbitMQDispatcher,
    exchange::provision_exchanges,
    game::{commands::SERVER_HELP, ServerCommand},
    publisher::RabbitMQPublisher,
    queue::QueueDurability,
    routing::{
        self, binding_pattern, routing_key, GameLog, PlayingState, EXCHANGE_PERIL_DIRECT,
        EXCHANGE_PERIL_TOPIC, GAME_LOG_SLUG, PAUSE_KEY,
    },
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "peril-server")]
#[command(about = "Peril game server")]
struct Args {
    #[command(flatten)]
    broker: BrokerArgs,
}

async fn set_paused(publisher: &RabbitMQPublisher, players: &[String], is_paused: bool) {
    let state = PlayingState { is_paused };

    for player in players {
        let key = routing_key(PAUSE_KEY, player);
        match publisher.publish(EXCHANGE_PERIL_DIRECT, &key, &state).await {
            Ok(_) => info!(player, is_paused, "playing state sent"),
            Err(err) => error!(error = err.to_string(), player, "error sending playing state"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("peril=info".parse()?))
        .init();

    let args = Args::parse();
    let cfg = args.broker.into_configs("peril-server");
    info!("Peril server starting...");

    let conn = AmqpConnection::connect(&cfg).await?;

    let admin = conn.open_channel().await?;
    provision_exchanges(&admin, &routing::exchanges()).await?;

    let publisher = RabbitMQPublisher::new(conn.open_channel().await?);
    let dispatcher = RabbitMQDispatcher::new(conn.clone(), &cfg);

    let mut logs = dispatcher
        .subscribe::<GameLog, _>(
            EXCHANGE_PERIL_TOPIC,
            GAME_LOG_SLUG,
            &binding_pattern(GAME_LOG_SLUG),
            QueueDurability::Durable,
            |log: GameLog| {
                info!(username = log.username, "{}", log.message);
                AckDecision::Accept
            },
        )
        .await?;
    info!(queue = logs.queue().name, "recording game logs");

    println!("{}", SERVER_HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut failure = None;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            result = logs.join() => {
                warn!("game log subscription stopped");
                failure = result.err();
                None
            }
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ServerCommand>() {
            Ok(ServerCommand::Pause(players)) => set_paused(&publisher, &players, true).await,
            Ok(ServerCommand::Resume(players)) => set_paused(&publisher, &players, false).await,
            Ok(ServerCommand::Help) => println!("{}", SERVER_HELP),
            Ok(ServerCommand::Quit) => break,
            Err(err) => warn!("{}", err),
        }
    }

    info!("Peril server shutting down");
    logs.abort();
    conn.close().await?;

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

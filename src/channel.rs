// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel Management
//!
//! One connection is shared by the whole process. Every subscription and every
//! independent publishing path opens its own channel on it, so a channel error,
//! a prefetch limit or a crashed delivery loop stays local to its owner.

use crate::{configs::Configs, errors::AmqpError};
use lapin::{types::LongString, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{debug, error};

/// The process-wide broker connection.
#[derive(Clone)]
pub struct AmqpConnection {
    conn: Arc<Connection>,
}

impl AmqpConnection {
    /// Connects to RabbitMQ using the parameters in `cfg`.
    ///
    /// The connection is named after `cfg.app.name` so it can be told apart in
    /// the management UI.
    ///
    /// # Example
    /// ```no_run
    /// # async fn run() -> Result<(), peril::errors::AmqpError> {
    /// let cfg = peril::configs::Configs::default();
    /// let conn = peril::channel::AmqpConnection::connect(&cfg).await?;
    /// let channel = conn.open_channel().await?;
    /// # Ok(()) }
    /// ```
    pub async fn connect(cfg: &Configs) -> Result<AmqpConnection, AmqpError> {
        debug!("creating amqp connection...");
        let options = ConnectionProperties::default()
            .with_connection_name(LongString::from(cfg.app.name.clone()));

        let conn = match Connection::connect(&cfg.amqp_uri(), options).await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(AmqpError::ConnectionError)
            }
        }?;
        debug!("amqp connected");

        Ok(AmqpConnection {
            conn: Arc::new(conn),
        })
    }

    /// Opens a new channel multiplexed over the shared connection.
    pub async fn open_channel(&self) -> Result<Arc<Channel>, AmqpError> {
        debug!("creating amqp channel...");
        match self.conn.create_channel().await {
            Ok(c) => {
                debug!(channel = c.id(), "channel created");
                Ok(Arc::new(c))
            }
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError)
            }
        }
    }

    /// Closes the connection.
    ///
    /// Every channel is closed with it and every delivery loop ends. In-flight
    /// deliveries are not drained; the broker redelivers them to the next
    /// consumer of their queue.
    pub async fn close(&self) -> Result<(), AmqpError> {
        match self.conn.close(200, "bye").await {
            Ok(_) => {
                debug!("amqp connection closed");
                Ok(())
            }
            Err(err) => {
                error!(error = err.to_string(), "error closing the connection");
                Err(AmqpError::ConnectionError)
            }
        }
    }
}

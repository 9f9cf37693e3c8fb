// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! Encodes a value with the codec of its wire type, tags the payload with the
//! codec's content type and sends it, fire-and-forget, to an exchange. No
//! publisher confirms are requested and no retry is attempted: a failure is
//! returned to the caller, who owns the retry decision.

use crate::{
    codec::{Codec, WireMessage},
    errors::AmqpError,
    otel,
};
use async_trait::async_trait;
use lapin::{
    options::BasicPublishOptions,
    types::{FieldTable, ShortString},
    BasicProperties, Channel,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

/// A message ready to leave the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub exchange: String,
    pub routing_key: String,
    pub content_type: &'static str,
    pub payload: Vec<u8>,
}

/// Transport write of an [`Envelope`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, envelope: Envelope) -> Result<(), AmqpError>;
}

#[async_trait]
impl MessageSink for Channel {
    async fn send(&self, envelope: Envelope) -> Result<(), AmqpError> {
        match self
            .basic_publish(
                &envelope.exchange,
                &envelope.routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &envelope.payload,
                BasicProperties::default()
                    .with_content_type(ShortString::from(envelope.content_type))
                    .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
                    .with_headers(FieldTable::from(otel::inject_current())),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    exchange = envelope.exchange,
                    key = envelope.routing_key,
                    "error publishing message"
                );
                Err(AmqpError::PublishingError(envelope.routing_key))
            }
            _ => Ok(()),
        }
    }
}

/// Publisher bound to one channel.
///
/// Writes on the channel are serialized, so a publisher can be shared between
/// tasks without interleaving frames of concurrent publishes.
pub struct RabbitMQPublisher<S: ?Sized = Channel> {
    write: Mutex<()>,
    sink: Arc<S>,
}

impl<S> RabbitMQPublisher<S>
where
    S: MessageSink + ?Sized,
{
    /// Creates a new publisher writing to `sink`.
    pub fn new(sink: Arc<S>) -> Arc<RabbitMQPublisher<S>> {
        Arc::new(RabbitMQPublisher {
            write: Mutex::new(()),
            sink,
        })
    }

    /// Publishes `value` to `exchange` under `routing_key`.
    ///
    /// # Returns
    /// `SerializePayloadError` if the value cannot be encoded, in which case
    /// nothing is sent, or `PublishingError` if the transport write fails.
    pub async fn publish<T>(
        &self,
        exchange: &str,
        routing_key: &str,
        value: &T,
    ) -> Result<(), AmqpError>
    where
        T: WireMessage + Sync,
    {
        let codec = T::Codec::default();
        let payload = codec.encode(value).inspect_err(|err| {
            error!(error = err.to_string(), key = routing_key, "error encoding message");
        })?;

        let envelope = Envelope {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            content_type: codec.content_type(),
            payload,
        };

        let _guard = self.write.lock().await;
        self.sink.send(envelope).await?;

        debug!(exchange, key = routing_key, "message published");
        Ok(())
    }
}

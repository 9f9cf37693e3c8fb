// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Peril Transport
//!
//! This module provides the error type shared by every transport operation.
//! The `AmqpError` enum groups transport failures (connection and channel),
//! topology failures (declare and bind conflicts), serialization failures and
//! acknowledgment failures.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Transport and topology variants are fatal to the affected channel and are
/// surfaced to the caller. Serialization variants never leave the delivery
/// loop: a payload that fails to decode is discarded on the spot.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// The queue already exists with incompatible settings
    #[error("queue `{0}` already declared with different settings")]
    ConfigConflict(String),

    /// Error binding a queue to an exchange
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error declaring a consumer
    #[error("failure to declare consumer `{0}`")]
    ConsumerDeclarationError(String),

    /// Error publishing a message
    #[error("failure to publish `{0}`")]
    PublishingError(String),

    /// Error encoding a value into a payload
    #[error("failure to serialize payload `{0}`")]
    SerializePayloadError(String),

    /// Error parsing a message payload
    #[error("failure to parse payload `{0}`")]
    ParsePayloadError(String),

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// The broker stream of a consumer failed
    #[error("delivery stream of `{0}` failed")]
    DeliveryStreamError(String),

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// A delivery was resolved a second time
    #[error("delivery `{0}` already resolved")]
    AlreadyResolved(u64),
}

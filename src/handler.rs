// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delivery Handlers
//!
//! The application side of a subscription. The dispatcher decodes each
//! delivery, passes the value to a [`Handler`] and resolves the delivery with
//! the [`AckDecision`] it returns.

use crate::ack::AckDecision;
use async_trait::async_trait;

/// Application entry point for decoded deliveries of type `T`.
///
/// Every business outcome must be mapped to an [`AckDecision`]; a handler
/// that cannot classify an outcome returns `AckDecision::default()`, which
/// discards the message. Deliveries are at-least-once, so a handler may see
/// the same event again after returning `RetryRequeue`.
///
/// Plain closures `Fn(T) -> AckDecision` are handlers too.
#[async_trait]
pub trait Handler<T: Send + 'static>: Send + Sync {
    async fn handle(&self, value: T) -> AckDecision;
}

#[async_trait]
impl<T, F> Handler<T> for F
where
    T: Send + 'static,
    F: Fn(T) -> AckDecision + Send + Sync,
{
    async fn handle(&self, value: T) -> AckDecision {
        self(value)
    }
}

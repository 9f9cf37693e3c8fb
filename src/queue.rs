// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Management for RabbitMQ
//!
//! Queues come in two durability classes. Durable queues survive broker
//! restarts and are shared between consumers. Transient queues belong to the
//! connection that declared them and disappear with it. Every queue carries
//! the dead-letter exchange argument so a discarded delivery is routed instead
//! of silently dropped.

use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use std::collections::BTreeMap;

/// Header field naming the dead-letter exchange of a queue
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";

/// Durability class of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueDurability {
    /// Persists across restarts, never auto-deleted, shared.
    Durable,
    /// Auto-deleted and exclusive to the declaring connection.
    Transient,
}

/// Definition of a RabbitMQ queue derived from its durability class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) exclusive: bool,
    pub(crate) dead_letter_exchange: String,
}

impl QueueDefinition {
    /// Creates the definition of `name` for the given durability class.
    ///
    /// # Parameters
    /// * `name` - The name of the queue
    /// * `durability` - Durable or transient
    /// * `dlx` - Dead-letter exchange attached to the queue
    pub fn new(name: &str, durability: QueueDurability, dlx: &str) -> QueueDefinition {
        let durable = durability == QueueDurability::Durable;

        QueueDefinition {
            name: name.to_owned(),
            durable,
            delete: !durable,
            exclusive: !durable,
            dead_letter_exchange: dlx.to_owned(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn durability(&self) -> QueueDurability {
        if self.durable {
            QueueDurability::Durable
        } else {
            QueueDurability::Transient
        }
    }

    /// Declaration arguments sent along with `queue.declare`.
    pub fn arguments(&self) -> FieldTable {
        let mut args = BTreeMap::new();
        args.insert(
            ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
            AMQPValue::LongString(LongString::from(self.dead_letter_exchange.clone())),
        );

        FieldTable::from(args)
    }
}

/// Configuration for binding a queue to an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub(crate) queue_name: String,
    pub(crate) exchange_name: String,
    pub(crate) routing_key: String,
}

impl QueueBinding {
    /// Creates a new binding for `queue`, with empty exchange and routing key.
    pub fn new(queue: &str) -> QueueBinding {
        QueueBinding {
            queue_name: queue.to_owned(),
            exchange_name: String::new(),
            routing_key: String::new(),
        }
    }

    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange_name = exchange.to_owned();
        self
    }

    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }
}

/// A queue as it exists on the broker after declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredQueue {
    pub name: String,
    pub durability: QueueDurability,
    pub message_count: u32,
    pub consumer_count: u32,
}

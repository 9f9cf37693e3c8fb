// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module declares queues and binds them to pre-existing exchanges.
//!
//! The main components are:
//! - `TopologyChannel` trait: the broker calls topology management relies on
//! - `AmqpTopology`: declare-and-bind with a process-wide registry that keeps a
//!   queue name tied to exactly one configuration

use crate::{
    errors::AmqpError,
    queue::{DeclaredQueue, QueueBinding, QueueDefinition, QueueDurability},
};
use async_trait::async_trait;
use lapin::{
    options::{QueueBindOptions, QueueDeclareOptions},
    protocol::{AMQPErrorKind, AMQPSoftError},
    types::FieldTable,
    Channel,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, error, warn};

#[cfg(test)]
use mockall::automock;

/// Broker operations needed to provision a queue.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TopologyChannel: Send + Sync {
    /// Declares the queue described by `def`.
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<DeclaredQueue, AmqpError>;

    /// Binds a queue to an exchange under a routing key.
    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError>;
}

/// A conflicting `queue.declare` makes the broker answer 406 PRECONDITION_FAILED.
fn is_precondition_failed(err: &lapin::Error) -> bool {
    match err {
        lapin::Error::ProtocolError(amqp) => matches!(
            amqp.kind(),
            AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED)
        ),
        _ => false,
    }
}

#[async_trait]
impl TopologyChannel for Channel {
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<DeclaredQueue, AmqpError> {
        match self
            .queue_declare(
                &def.name,
                QueueDeclareOptions {
                    passive: false,
                    durable: def.durable,
                    exclusive: def.exclusive,
                    auto_delete: def.delete,
                    nowait: false,
                },
                def.arguments(),
            )
            .await
        {
            Ok(queue) => {
                debug!("queue: {} was created", def.name);
                Ok(DeclaredQueue {
                    name: queue.name().to_string(),
                    durability: def.durability(),
                    message_count: queue.message_count(),
                    consumer_count: queue.consumer_count(),
                })
            }
            Err(err) if is_precondition_failed(&err) => {
                error!(
                    error = err.to_string(),
                    queue = def.name,
                    "queue exists with different settings"
                );
                Err(AmqpError::ConfigConflict(def.name.clone()))
            }
            Err(err) => {
                error!(error = err.to_string(), queue = def.name, "error to declare the queue");
                Err(AmqpError::DeclareQueueError(def.name.clone()))
            }
        }
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        match self
            .queue_bind(
                &binding.queue_name,
                &binding.exchange_name,
                &binding.routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(AmqpError::BindingExchangeToQueueError(
                    binding.exchange_name.clone(),
                    binding.queue_name.clone(),
                ))
            }
            _ => Ok(()),
        }
    }
}

type Registry = HashMap<String, (QueueDefinition, QueueBinding)>;

/// Queue provisioning shared by every subscription of the process.
///
/// Clones share the same registry, so a queue declared through one clone is
/// checked for conflicts by all others.
#[derive(Clone)]
pub struct AmqpTopology {
    dead_letter_exchange: String,
    declared: Arc<Mutex<Registry>>,
}

impl AmqpTopology {
    /// Creates a topology manager attaching `dead_letter_exchange` to every queue.
    pub fn new(dead_letter_exchange: &str) -> AmqpTopology {
        AmqpTopology {
            dead_letter_exchange: dead_letter_exchange.to_owned(),
            declared: Arc::new(Mutex::new(HashMap::default())),
        }
    }

    /// Declares `queue_name` with settings derived from `durability` and binds
    /// it to `exchange` under `routing_key`.
    ///
    /// Repeating the call with identical arguments is a no-op. A queue name that
    /// was already declared with another durability or binding fails with
    /// [`AmqpError::ConfigConflict`] before the broker is contacted. The
    /// exchange must already exist.
    pub async fn declare_and_bind<C>(
        &self,
        channel: &C,
        exchange: &str,
        queue_name: &str,
        routing_key: &str,
        durability: QueueDurability,
    ) -> Result<DeclaredQueue, AmqpError>
    where
        C: TopologyChannel + ?Sized,
    {
        let def = QueueDefinition::new(queue_name, durability, &self.dead_letter_exchange);
        let binding = QueueBinding::new(queue_name)
            .exchange(exchange)
            .routing_key(routing_key);

        self.check_conflict(&def, &binding)?;

        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            queue_name, exchange, routing_key
        );

        let queue = channel.declare_queue(&def).await?;
        channel.bind_queue(&binding).await?;

        self.check_conflict(&def, &binding)?;
        self.declared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(def.name.clone(), (def, binding));

        Ok(queue)
    }

    fn check_conflict(
        &self,
        def: &QueueDefinition,
        binding: &QueueBinding,
    ) -> Result<(), AmqpError> {
        let declared = self.declared.lock().unwrap_or_else(PoisonError::into_inner);

        match declared.get(&def.name) {
            Some((known_def, known_binding)) if known_def != def || known_binding != binding => {
                warn!(queue = def.name, "conflicting queue configuration");
                Err(AmqpError::ConfigConflict(def.name.clone()))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    fn declared(name: &str, durability: QueueDurability) -> DeclaredQueue {
        DeclaredQueue {
            name: name.to_owned(),
            durability,
            message_count: 0,
            consumer_count: 0,
        }
    }

    #[tokio::test]
    async fn declares_then_binds() {
        let mut channel = MockTopologyChannel::new();
        channel
            .expect_declare_queue()
            .withf(|def| {
                def.name == "war" && def.durable && def.dead_letter_exchange == "peril_dlx"
            })
            .times(1)
            .returning(|_| Ok(declared("war", QueueDurability::Durable)));
        channel
            .expect_bind_queue()
            .with(eq(QueueBinding::new("war")
                .exchange("peril_topic")
                .routing_key("war_recognitions.*")))
            .times(1)
            .returning(|_| Ok(()));

        let topology = AmqpTopology::new("peril_dlx");
        let queue = topology
            .declare_and_bind(
                &channel,
                "peril_topic",
                "war",
                "war_recognitions.*",
                QueueDurability::Durable,
            )
            .await
            .unwrap();

        assert_eq!(queue.name, "war");
        assert_eq!(queue.durability, QueueDurability::Durable);
    }

    #[tokio::test]
    async fn identical_redeclare_is_a_noop() {
        let mut channel = MockTopologyChannel::new();
        channel
            .expect_declare_queue()
            .times(2)
            .returning(|def| Ok(declared(&def.name, def.durability())));
        channel.expect_bind_queue().times(2).returning(|_| Ok(()));

        let topology = AmqpTopology::new("peril_dlx");
        let first = topology
            .declare_and_bind(
                &channel,
                "peril_direct",
                "pause.alice",
                "pause.alice",
                QueueDurability::Transient,
            )
            .await
            .unwrap();
        let second = topology
            .declare_and_bind(
                &channel,
                "peril_direct",
                "pause.alice",
                "pause.alice",
                QueueDurability::Transient,
            )
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn conflicting_durability_fails_every_time() {
        let mut channel = MockTopologyChannel::new();
        channel
            .expect_declare_queue()
            .times(1)
            .returning(|def| Ok(declared(&def.name, def.durability())));
        channel.expect_bind_queue().times(1).returning(|_| Ok(()));

        let topology = AmqpTopology::new("peril_dlx");
        topology
            .declare_and_bind(
                &channel,
                "peril_topic",
                "game_logs",
                "game_logs.*",
                QueueDurability::Durable,
            )
            .await
            .unwrap();

        for _ in 0..2 {
            let err = topology
                .declare_and_bind(
                    &channel,
                    "peril_topic",
                    "game_logs",
                    "game_logs.*",
                    QueueDurability::Transient,
                )
                .await
                .unwrap_err();
            assert_eq!(err, AmqpError::ConfigConflict("game_logs".to_owned()));
        }
    }

    #[tokio::test]
    async fn conflicting_binding_fails() {
        let mut channel = MockTopologyChannel::new();
        channel
            .expect_declare_queue()
            .times(1)
            .returning(|def| Ok(declared(&def.name, def.durability())));
        channel.expect_bind_queue().times(1).returning(|_| Ok(()));

        let topology = AmqpTopology::new("peril_dlx");
        topology
            .declare_and_bind(
                &channel,
                "peril_topic",
                "war",
                "war_recognitions.*",
                QueueDurability::Durable,
            )
            .await
            .unwrap();

        let err = topology
            .clone()
            .declare_and_bind(
                &channel,
                "peril_topic",
                "war",
                "army_moves.*",
                QueueDurability::Durable,
            )
            .await
            .unwrap_err();
        assert_eq!(err, AmqpError::ConfigConflict("war".to_owned()));
    }

    #[tokio::test]
    async fn broker_conflict_is_surfaced_and_not_recorded() {
        let mut channel = MockTopologyChannel::new();
        channel
            .expect_declare_queue()
            .times(2)
            .returning(|def| Err(AmqpError::ConfigConflict(def.name.clone())));
        channel.expect_bind_queue().never();

        let topology = AmqpTopology::new("peril_dlx");
        for _ in 0..2 {
            let err = topology
                .declare_and_bind(
                    &channel,
                    "peril_topic",
                    "war",
                    "war_recognitions.*",
                    QueueDurability::Transient,
                )
                .await
                .unwrap_err();
            assert_eq!(err, AmqpError::ConfigConflict("war".to_owned()));
        }
    }

    #[tokio::test]
    async fn bind_failure_is_propagated() {
        let mut channel = MockTopologyChannel::new();
        channel
            .expect_declare_queue()
            .returning(|def| Ok(declared(&def.name, def.durability())));
        channel.expect_bind_queue().returning(|b| {
            Err(AmqpError::BindingExchangeToQueueError(
                b.exchange_name.clone(),
                b.queue_name.clone(),
            ))
        });

        let topology = AmqpTopology::new("peril_dlx");
        let err = topology
            .declare_and_bind(
                &channel,
                "missing",
                "war",
                "war_recognitions.*",
                QueueDurability::Durable,
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AmqpError::BindingExchangeToQueueError("missing".to_owned(), "war".to_owned())
        );
    }
}

// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Dispatcher
//!
//! A subscription owns a channel, a prefetch window and one delivery loop.
//! Handler calls are sequential within a subscription and concurrent across
//! subscriptions. Once `prefetch` deliveries are outstanding the broker stops
//! sending more until one of them is resolved, which is the only backpressure
//! the transport applies.

use crate::{
    ack::RedeliveryTracker,
    channel::AmqpConnection,
    codec::WireMessage,
    configs::Configs,
    consumer::{consume, Inbound},
    errors::AmqpError,
    handler::Handler,
    queue::{DeclaredQueue, QueueDurability},
    topology::AmqpTopology,
};
use futures_util::StreamExt;
use lapin::{
    options::{BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
};
use opentelemetry::global;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

/// Handle on a running subscription.
pub struct Subscription {
    queue: DeclaredQueue,
    task: Option<JoinHandle<Result<(), AmqpError>>>,
}

impl Subscription {
    pub fn queue(&self) -> &DeclaredQueue {
        &self.queue
    }

    /// Waits for the delivery loop to end.
    ///
    /// Takes `&mut self` so the caller can race it against other work and
    /// still abort the subscription afterwards.
    ///
    /// # Returns
    /// * `Ok(())` - The broker closed the consumer or the loop was aborted
    /// * `Err(AmqpError::DeliveryStreamError)` - The consumer stream failed
    /// * `Err(AmqpError::InternalError)` - The loop panicked
    pub async fn join(&mut self) -> Result<(), AmqpError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };

        let result = task.await;
        self.task = None;

        match result {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Ok(()),
            Err(err) => {
                error!(
                    error = err.to_string(),
                    queue = self.queue.name,
                    "delivery loop panicked"
                );
                Err(AmqpError::InternalError)
            }
        }
    }

    /// Stops the delivery loop. Unresolved deliveries are redelivered by the
    /// broker once the channel is gone.
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Creates subscriptions on a shared connection.
#[derive(Clone)]
pub struct RabbitMQDispatcher {
    conn: AmqpConnection,
    topology: AmqpTopology,
    prefetch: u16,
    max_requeues: Option<u32>,
}

impl RabbitMQDispatcher {
    /// Creates a new dispatcher.
    ///
    /// # Parameters
    /// * `conn` - Connection every subscription opens its channel on
    /// * `cfg` - Source of the dead-letter exchange, prefetch and requeue bound
    ///
    /// # Returns
    /// A dispatcher with no running subscription
    pub fn new(conn: AmqpConnection, cfg: &Configs) -> Self {
        RabbitMQDispatcher {
            conn,
            topology: AmqpTopology::new(&cfg.dead_letter_exchange),
            prefetch: cfg.prefetch,
            max_requeues: cfg.max_requeues,
        }
    }

    /// Overrides the requeue bound for subscriptions created from here on.
    pub fn max_requeues(mut self, max: Option<u32>) -> Self {
        self.max_requeues = max;
        self
    }

    /// Subscribes `handler` to a queue bound to `exchange`.
    ///
    /// Opens a dedicated channel, declares and binds the queue, sets the
    /// prefetch window and starts the delivery loop. Topology and transport
    /// errors are returned before any delivery is consumed; a failure of the
    /// running loop is reported by [`Subscription::join`].
    ///
    /// # Parameters
    /// * `exchange` - Exchange the queue is bound to
    /// * `queue_name` - Queue to declare and consume
    /// * `routing_key` - Binding key, a pattern on topic exchanges
    /// * `durability` - Durability class of the queue
    /// * `handler` - Receives every decoded delivery
    ///
    /// # Returns
    /// The running subscription
    pub async fn subscribe<T, H>(
        &self,
        exchange: &str,
        queue_name: &str,
        routing_key: &str,
        durability: QueueDurability,
        handler: H,
    ) -> Result<Subscription, AmqpError>
    where
        T: WireMessage,
        H: Handler<T> + 'static,
    {
        let channel = self.conn.open_channel().await?;

        let queue = self
            .topology
            .declare_and_bind(channel.as_ref(), exchange, queue_name, routing_key, durability)
            .await?;

        if let Err(err) = channel
            .basic_qos(self.prefetch, BasicQosOptions { global: false })
            .await
        {
            error!(error = err.to_string(), "error to configure qos");
            return Err(AmqpError::QoSDeclarationError(queue_name.to_owned()));
        }

        let mut consumer = match channel
            .basic_consume(
                queue_name,
                &format!("{}-{}", queue_name, Uuid::new_v4()),
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                Err(AmqpError::ConsumerDeclarationError(queue_name.to_owned()))
            }
            Ok(c) => Ok(c),
        }?;

        let max_requeues = self.max_requeues;
        let queue_owned = queue_name.to_owned();

        let task = tokio::spawn(async move {
            // the consumer only lives as long as its channel
            let _channel = channel;
            let tracer = global::tracer("amqp consumer");
            let codec = T::Codec::default();
            let mut tracker = RedeliveryTracker::new(max_requeues);

            while let Some(result) = consumer.next().await {
                match result {
                    Ok(delivery) => {
                        let inbound = Inbound::from(&delivery);
                        if let Err(err) = consume::<T, _, _, _>(
                            &tracer,
                            &codec,
                            &handler,
                            &inbound,
                            &delivery.acker,
                            &mut tracker,
                        )
                        .await
                        {
                            error!(error = err.to_string(), "error consume msg");
                        }
                    }

                    Err(err) => {
                        error!(error = err.to_string(), queue = queue_owned, "errors consume msg");
                        return Err(AmqpError::DeliveryStreamError(queue_owned));
                    }
                }
            }

            debug!(queue = queue_owned, "delivery loop finished");
            Ok(())
        });

        Ok(Subscription {
            queue,
            task: Some(task),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription<F>(task: F) -> Subscription
    where
        F: std::future::Future<Output = Result<(), AmqpError>> + Send + 'static,
    {
        Subscription {
            queue: DeclaredQueue {
                name: "war".to_owned(),
                durability: QueueDurability::Durable,
                message_count: 0,
                consumer_count: 0,
            },
            task: Some(tokio::spawn(task)),
        }
    }

    #[tokio::test]
    async fn join_reports_a_failed_delivery_stream() {
        let mut sub = subscription(async {
            Err::<(), _>(AmqpError::DeliveryStreamError("war".to_owned()))
        });

        assert_eq!(
            sub.join().await,
            Err(AmqpError::DeliveryStreamError("war".to_owned()))
        );
        // the loop is gone, joining again returns at once
        assert_eq!(sub.join().await, Ok(()));
        sub.abort();
    }

    #[tokio::test]
    async fn aborted_loop_joins_cleanly() {
        let mut sub = subscription(std::future::pending());

        sub.abort();

        assert_eq!(sub.join().await, Ok(()));
    }

    #[tokio::test]
    async fn panicking_loop_is_an_internal_error() {
        let mut sub = subscription(async {
            let blow_up = true;
            if blow_up {
                panic!("handler blew up");
            }
            Ok::<(), AmqpError>(())
        });

        assert_eq!(sub.join().await, Err(AmqpError::InternalError));
    }

    #[tokio::test]
    async fn join_can_race_other_work_and_resume() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let mut sub = subscription(async move {
            let _ = rx.await;
            Ok::<(), AmqpError>(())
        });

        tokio::select! {
            _ = sub.join() => panic!("loop should still be running"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => {}
        }

        let _ = tx.send(());
        assert_eq!(sub.join().await, Ok(()));
    }
}

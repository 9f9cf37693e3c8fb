// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Consumer
//!
//! Processing of one delivery: decode, hand over to the handler, and resolve
//! the delivery with exactly one broker action. A payload that does not decode
//! is discarded right away and never reaches the handler, so poison messages
//! cannot loop through the queue.

use crate::{
    ack::{AckDecision, Acknowledger, DeliveryState, DeliveryTicket, RedeliveryTracker},
    codec::Codec,
    errors::AmqpError,
    handler::Handler,
    otel,
};
use lapin::{message::Delivery, protocol::basic::AMQPProperties};
use opentelemetry::{
    global::BoxedTracer,
    trace::{Span, Status},
};
use std::borrow::Cow;
use tracing::{debug, error, warn};

/// The parts of a broker delivery the consumer looks at.
pub(crate) struct Inbound<'d> {
    pub(crate) delivery_tag: u64,
    pub(crate) routing_key: &'d str,
    pub(crate) redelivered: bool,
    pub(crate) data: &'d [u8],
    pub(crate) properties: &'d AMQPProperties,
}

impl<'d> From<&'d Delivery> for Inbound<'d> {
    fn from(delivery: &'d Delivery) -> Inbound<'d> {
        Inbound {
            delivery_tag: delivery.delivery_tag,
            routing_key: delivery.routing_key.as_str(),
            redelivered: delivery.redelivered,
            data: &delivery.data,
            properties: &delivery.properties,
        }
    }
}

impl Inbound<'_> {
    fn message_id(&self) -> Option<&str> {
        self.properties.message_id().as_ref().map(|id| id.as_str())
    }
}

/// Consumes one delivery and returns the terminal state it reached.
///
/// # Returns
/// The terminal [`DeliveryState`], or the broker error raised while acking or
/// nacking. A failed broker call leaves the delivery unacknowledged; the broker
/// redelivers it once the channel goes away.
pub(crate) async fn consume<T, C, H, A>(
    tracer: &BoxedTracer,
    codec: &C,
    handler: &H,
    inbound: &Inbound<'_>,
    acker: &A,
    tracker: &mut RedeliveryTracker,
) -> Result<DeliveryState, AmqpError>
where
    T: Send + 'static,
    C: Codec<T> + ?Sized,
    H: Handler<T> + ?Sized,
    A: Acknowledger + ?Sized,
{
    let (_ctx, mut span) = otel::new_span(inbound.properties, tracer, inbound.routing_key);
    let mut ticket = DeliveryTicket::new(inbound.delivery_tag);

    debug!(
        key = inbound.routing_key,
        delivery_tag = inbound.delivery_tag,
        redelivered = inbound.redelivered,
        "received"
    );

    if let Some(content_type) = inbound.properties.content_type() {
        if content_type.as_str() != codec.content_type() {
            warn!(
                expected = codec.content_type(),
                received = content_type.as_str(),
                "content type does not match the queue codec"
            );
        }
    }

    let decision = match codec.decode(inbound.data) {
        Ok(value) => {
            let decision = handler.handle(value).await;
            tracker.review(inbound.message_id(), inbound.redelivered, decision)
        }
        Err(err) => {
            warn!(
                error = err.to_string(),
                "removing message from queue - reason: payload does not decode"
            );
            span.record_error(&err);
            tracker.review(inbound.message_id(), inbound.redelivered, AckDecision::Discard)
        }
    };

    match ticket.resolve(acker, decision).await {
        Ok(state) => {
            match state {
                DeliveryState::Accepted => span.set_status(Status::Ok),
                DeliveryState::Requeued => span.set_status(Status::Error {
                    description: Cow::from("msg requeued"),
                }),
                _ => span.set_status(Status::Error {
                    description: Cow::from("msg discarded"),
                }),
            }
            Ok(state)
        }
        Err(err) => {
            error!(error = err.to_string(), "error resolving delivery");
            span.record_error(&err);
            span.set_status(Status::Error {
                description: Cow::from("error to resolve msg"),
            });
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ack::MockAcknowledger,
        codec::JsonCodec,
        configs::Configs,
        game::{GameState, Location, Player, SharedGameState, Unit, UnitRank, WarHandler},
        publisher::{MockMessageSink, RabbitMQPublisher},
        routing::{RecognitionOfWar, WAR_QUEUE_MAX_REQUEUES},
    };
    use lapin::{protocol::basic::AMQPProperties, types::ShortString};
    use mockall::predicate::eq;
    use opentelemetry::global;
    use serde::{Deserialize, Serialize};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pause {
        #[serde(rename = "IsPaused")]
        is_paused: bool,
    }

    fn inbound<'d>(data: &'d [u8], props: &'d AMQPProperties, redelivered: bool) -> Inbound<'d> {
        Inbound {
            delivery_tag: 7,
            routing_key: "pause.alice",
            redelivered,
            data,
            properties: props,
        }
    }

    fn props(id: &str) -> AMQPProperties {
        AMQPProperties::default()
            .with_content_type(ShortString::from("application/json"))
            .with_message_id(ShortString::from(id))
    }

    #[tokio::test]
    async fn accepted_value_is_acked() {
        let mut acker = MockAcknowledger::new();
        acker.expect_ack().times(1).returning(|| Ok(()));
        acker.expect_nack().never();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let handler = move |value: Pause| {
            assert!(value.is_paused);
            counter.fetch_add(1, Ordering::SeqCst);
            AckDecision::Accept
        };

        let props = props("m1");
        let state = consume::<Pause, _, _, _>(
            &global::tracer("test"),
            &JsonCodec,
            &handler,
            &inbound(br#"{"IsPaused":true}"#, &props, false),
            &acker,
            &mut RedeliveryTracker::new(Some(3)),
        )
        .await
        .unwrap();

        assert_eq!(state, DeliveryState::Accepted);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn poison_payload_is_discarded_without_calling_handler() {
        let mut acker = MockAcknowledger::new();
        acker.expect_ack().never();
        acker.expect_nack().with(eq(false)).times(1).returning(|_| Ok(()));

        let handler = |_: Pause| -> AckDecision { panic!("handler must not run") };

        let props = props("m2");
        let state = consume::<Pause, _, _, _>(
            &global::tracer("test"),
            &JsonCodec,
            &handler,
            &inbound(b"\x00\x01garbage", &props, false),
            &acker,
            &mut RedeliveryTracker::new(None),
        )
        .await
        .unwrap();

        assert_eq!(state, DeliveryState::Discarded);
    }

    #[tokio::test]
    async fn retry_requeues_until_the_bound() {
        let mut tracker = RedeliveryTracker::new(Some(1));
        let handler = |_: Pause| AckDecision::RetryRequeue;
        let props = props("m3");

        let mut first = MockAcknowledger::new();
        first.expect_nack().with(eq(true)).times(1).returning(|_| Ok(()));
        let state = consume::<Pause, _, _, _>(
            &global::tracer("test"),
            &JsonCodec,
            &handler,
            &inbound(br#"{"IsPaused":false}"#, &props, false),
            &first,
            &mut tracker,
        )
        .await
        .unwrap();
        assert_eq!(state, DeliveryState::Requeued);

        let mut second = MockAcknowledger::new();
        second.expect_nack().with(eq(false)).times(1).returning(|_| Ok(()));
        let state = consume::<Pause, _, _, _>(
            &global::tracer("test"),
            &JsonCodec,
            &handler,
            &inbound(br#"{"IsPaused":false}"#, &props, true),
            &second,
            &mut tracker,
        )
        .await
        .unwrap();
        assert_eq!(state, DeliveryState::Discarded);
    }

    #[tokio::test]
    async fn broker_failure_is_reported() {
        let mut acker = MockAcknowledger::new();
        acker
            .expect_ack()
            .times(1)
            .returning(|| Err(AmqpError::AckMessageError));

        let props = props("m4");
        let err = consume::<Pause, _, _, _>(
            &global::tracer("test"),
            &JsonCodec,
            &|_: Pause| AckDecision::Accept,
            &inbound(br#"{"IsPaused":true}"#, &props, false),
            &acker,
            &mut RedeliveryTracker::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(err, AmqpError::AckMessageError);
    }

    #[tokio::test]
    async fn war_for_an_absent_defender_outlives_the_default_bound() {
        let mut sink = MockMessageSink::new();
        sink.expect_send().never();

        // bob is online, alice is not
        let handler = WarHandler::new(
            SharedGameState::new(GameState::new("bob")),
            RabbitMQPublisher::new(Arc::new(sink)),
        );
        let mut alice = Player::new("alice");
        alice.units.insert(
            1,
            Unit {
                id: 1,
                rank: UnitRank::Infantry,
                location: Location::Asia,
            },
        );
        let war = RecognitionOfWar {
            attacker: Player::new("carol"),
            defender: alice,
        };
        let payload = serde_json::to_vec(&war).unwrap();
        let props = props("war-1");

        let mut tracker = RedeliveryTracker::new(WAR_QUEUE_MAX_REQUEUES);
        let default_bound = Configs::default().max_requeues.unwrap_or_default();

        for attempt in 0..default_bound * 4 {
            let mut acker = MockAcknowledger::new();
            acker.expect_ack().never();
            acker.expect_nack().with(eq(true)).times(1).returning(|_| Ok(()));

            let state = consume::<RecognitionOfWar, _, _, _>(
                &global::tracer("test"),
                &JsonCodec,
                &handler,
                &inbound(&payload, &props, attempt > 0),
                &acker,
                &mut tracker,
            )
            .await
            .unwrap();

            assert_eq!(state, DeliveryState::Requeued);
        }
    }
}

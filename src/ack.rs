// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Acknowledgment Policy
//!
//! A handler resolves every delivery with an [`AckDecision`]. The decision is
//! mapped onto exactly one broker primitive:
//!
//! | Decision       | Broker action          | Terminal state |
//! |----------------|------------------------|----------------|
//! | `Accept`       | `basic.ack`            | `Accepted`     |
//! | `RetryRequeue` | `basic.nack` requeue   | `Requeued`     |
//! | `Discard`      | `basic.nack` no requeue| `Discarded`    |
//!
//! A requeued message comes back as a new delivery; the [`RedeliveryTracker`]
//! bounds how many times that can happen to the same message.

use crate::errors::AmqpError;
use async_trait::async_trait;
use lapin::{
    acker::Acker,
    options::{BasicAckOptions, BasicNackOptions},
};
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tracing::{debug, error, warn};

#[cfg(test)]
use mockall::automock;

/// The outcome a handler assigns to a delivery.
///
/// Defaults to `Discard`, the resolution for anything a handler cannot
/// classify.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AckDecision {
    /// Processed; remove the message from the queue.
    Accept,
    /// Not processed yet; make the message eligible for redelivery.
    RetryRequeue,
    /// Drop the message, routing it to the dead-letter exchange.
    #[default]
    Discard,
}

/// Lifecycle of one delivery instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Received,
    Accepted,
    Requeued,
    Discarded,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryState::Received)
    }
}

impl From<AckDecision> for DeliveryState {
    fn from(decision: AckDecision) -> DeliveryState {
        match decision {
            AckDecision::Accept => DeliveryState::Accepted,
            AckDecision::RetryRequeue => DeliveryState::Requeued,
            AckDecision::Discard => DeliveryState::Discarded,
        }
    }
}

/// Broker side of a single delivery.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), AmqpError>;

    async fn nack(&self, requeue: bool) -> Result<(), AmqpError>;
}

#[async_trait]
impl Acknowledger for Acker {
    async fn ack(&self) -> Result<(), AmqpError> {
        Acker::ack(self, BasicAckOptions { multiple: false })
            .await
            .map(|_| ())
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling ack msg");
                AmqpError::AckMessageError
            })
    }

    async fn nack(&self, requeue: bool) -> Result<(), AmqpError> {
        Acker::nack(
            self,
            BasicNackOptions {
                multiple: false,
                requeue,
            },
        )
        .await
        .map(|_| ())
        .map_err(|err| {
            error!(error = err.to_string(), requeue, "error whiling nack msg");
            AmqpError::NackMessageError
        })
    }
}

/// Tracks one delivery from `Received` to its single terminal state.
#[derive(Debug)]
pub struct DeliveryTicket {
    delivery_tag: u64,
    state: DeliveryState,
}

impl DeliveryTicket {
    /// Opens a ticket in `Received` for the delivery `delivery_tag`.
    pub fn new(delivery_tag: u64) -> DeliveryTicket {
        DeliveryTicket {
            delivery_tag,
            state: DeliveryState::Received,
        }
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    /// Applies a decision and moves the ticket to the matching terminal state.
    ///
    /// A ticket that already reached a terminal state refuses a second
    /// resolution without touching the broker. A failed broker call leaves the
    /// ticket in `Received`.
    ///
    /// # Parameters
    /// * `acker` - Broker side of the delivery
    /// * `decision` - Outcome assigned by the handler
    ///
    /// # Returns
    /// * `Ok(DeliveryState)` - The terminal state reached
    /// * `Err(AmqpError::AlreadyResolved)` - The ticket was already resolved
    /// * `Err(AmqpError::AckMessageError)` / `Err(AmqpError::NackMessageError)` -
    ///   The broker call failed
    pub async fn resolve<A>(
        &mut self,
        acker: &A,
        decision: AckDecision,
    ) -> Result<DeliveryState, AmqpError>
    where
        A: Acknowledger + ?Sized,
    {
        if self.state.is_terminal() {
            warn!(delivery_tag = self.delivery_tag, "delivery already resolved");
            return Err(AmqpError::AlreadyResolved(self.delivery_tag));
        }

        match decision {
            AckDecision::Accept => acker.ack().await?,
            AckDecision::RetryRequeue => acker.nack(true).await?,
            AckDecision::Discard => acker.nack(false).await?,
        }

        self.state = decision.into();
        debug!(delivery_tag = self.delivery_tag, state = ?self.state, "delivery resolved");

        Ok(self.state)
    }
}

/// How long a requeue count survives without its message coming back.
pub const DEFAULT_REQUEUE_TTL: Duration = Duration::from_secs(600);

/// Message ids tracked before stale entries are swept.
pub const DEFAULT_TRACKED_IDS: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct RequeueCount {
    count: u32,
    last_seen: Instant,
}

/// Counts requeues per message id and turns a retry into a discard once a
/// message has been requeued `max_requeues` times.
///
/// Counts are kept only while a bound is set. Entries whose message has not
/// come back within the TTL are swept once the table reaches its capacity,
/// and the least recently seen entry makes room when nothing is stale.
#[derive(Debug)]
pub struct RedeliveryTracker {
    max_requeues: Option<u32>,
    ttl: Duration,
    capacity: usize,
    requeues: HashMap<String, RequeueCount>,
}

impl Default for RedeliveryTracker {
    fn default() -> Self {
        RedeliveryTracker::new(None)
    }
}

impl RedeliveryTracker {
    /// Creates a tracker with the default TTL and capacity.
    ///
    /// # Parameters
    /// * `max_requeues` - Requeues allowed per message. `None` never converts
    ///   a retry and keeps no counts.
    ///
    /// # Returns
    /// An empty tracker
    pub fn new(max_requeues: Option<u32>) -> RedeliveryTracker {
        RedeliveryTracker {
            max_requeues,
            ttl: DEFAULT_REQUEUE_TTL,
            capacity: DEFAULT_TRACKED_IDS,
            requeues: HashMap::default(),
        }
    }

    /// Sets how long a count is kept for a message that does not come back.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets how many message ids are tracked at most.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Adjusts the handler's decision for one delivery and records the
    /// outcome.
    ///
    /// A message seen for the first time starts its count from zero even if
    /// an old entry is still around.
    ///
    /// # Parameters
    /// * `message_id` - The `message_id` property, if the publisher set one
    /// * `redelivered` - The broker's redelivered flag
    /// * `decision` - What the handler returned
    ///
    /// # Returns
    /// The decision to apply, `Discard` once a retry exceeds the bound
    pub fn review(
        &mut self,
        message_id: Option<&str>,
        redelivered: bool,
        decision: AckDecision,
    ) -> AckDecision {
        self.review_at(Instant::now(), message_id, redelivered, decision)
    }

    fn review_at(
        &mut self,
        now: Instant,
        message_id: Option<&str>,
        redelivered: bool,
        decision: AckDecision,
    ) -> AckDecision {
        let (Some(id), Some(max)) = (message_id, self.max_requeues) else {
            return decision;
        };

        if !redelivered {
            self.requeues.remove(id);
        }

        if decision != AckDecision::RetryRequeue {
            self.requeues.remove(id);
            return decision;
        }

        if !self.requeues.contains_key(id) {
            self.evict(now);
        }

        let entry = self.requeues.entry(id.to_owned()).or_insert(RequeueCount {
            count: 0,
            last_seen: now,
        });
        if entry.count >= max {
            warn!(message_id = id, requeues = entry.count, "too many attempts, discarding");
            self.requeues.remove(id);
            return AckDecision::Discard;
        }

        entry.count += 1;
        entry.last_seen = now;
        AckDecision::RetryRequeue
    }

    fn evict(&mut self, now: Instant) {
        if self.requeues.len() < self.capacity {
            return;
        }

        let ttl = self.ttl;
        self.requeues
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) < ttl);

        while self.requeues.len() >= self.capacity {
            let oldest = self
                .requeues
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    debug!(message_id = id, "dropping requeue count");
                    self.requeues.remove(&id);
                }
                None => break,
            }
        }
    }

    /// Number of requeues recorded for `message_id`.
    pub fn requeues(&self, message_id: &str) -> u32 {
        self.requeues
            .get(message_id)
            .map(|entry| entry.count)
            .unwrap_or_default()
    }

    /// Number of message ids currently tracked.
    pub fn tracked(&self) -> usize {
        self.requeues.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn unclassified_outcome_defaults_to_discard() {
        assert_eq!(AckDecision::default(), AckDecision::Discard);
    }

    #[tokio::test]
    async fn accept_acks() {
        let mut acker = MockAcknowledger::new();
        acker.expect_ack().times(1).returning(|| Ok(()));
        acker.expect_nack().never();

        let mut ticket = DeliveryTicket::new(1);
        let state = ticket.resolve(&acker, AckDecision::Accept).await.unwrap();

        assert_eq!(state, DeliveryState::Accepted);
    }

    #[tokio::test]
    async fn retry_nacks_with_requeue() {
        let mut acker = MockAcknowledger::new();
        acker.expect_nack().with(eq(true)).times(1).returning(|_| Ok(()));

        let mut ticket = DeliveryTicket::new(2);
        let state = ticket.resolve(&acker, AckDecision::RetryRequeue).await.unwrap();

        assert_eq!(state, DeliveryState::Requeued);
    }

    #[tokio::test]
    async fn discard_nacks_without_requeue() {
        let mut acker = MockAcknowledger::new();
        acker.expect_nack().with(eq(false)).times(1).returning(|_| Ok(()));

        let mut ticket = DeliveryTicket::new(3);
        let state = ticket.resolve(&acker, AckDecision::Discard).await.unwrap();

        assert_eq!(state, DeliveryState::Discarded);
    }

    #[tokio::test]
    async fn a_delivery_resolves_once() {
        let mut acker = MockAcknowledger::new();
        acker.expect_ack().times(1).returning(|| Ok(()));
        acker.expect_nack().never();

        let mut ticket = DeliveryTicket::new(4);
        ticket.resolve(&acker, AckDecision::Accept).await.unwrap();

        let err = ticket.resolve(&acker, AckDecision::Discard).await.unwrap_err();
        assert_eq!(err, AmqpError::AlreadyResolved(4));
        assert_eq!(ticket.state(), DeliveryState::Accepted);
    }

    #[tokio::test]
    async fn failed_ack_keeps_the_delivery_open() {
        let mut acker = MockAcknowledger::new();
        acker
            .expect_ack()
            .times(1)
            .returning(|| Err(AmqpError::AckMessageError));

        let mut ticket = DeliveryTicket::new(5);
        let err = ticket.resolve(&acker, AckDecision::Accept).await.unwrap_err();

        assert_eq!(err, AmqpError::AckMessageError);
        assert_eq!(ticket.state(), DeliveryState::Received);
    }

    #[test]
    fn retries_turn_into_discard_past_the_bound() {
        let mut tracker = RedeliveryTracker::new(Some(2));
        let retry = AckDecision::RetryRequeue;

        assert_eq!(tracker.review(Some("m1"), false, retry), AckDecision::RetryRequeue);
        assert_eq!(tracker.review(Some("m1"), true, retry), AckDecision::RetryRequeue);
        assert_eq!(tracker.requeues("m1"), 2);
        assert_eq!(tracker.review(Some("m1"), true, retry), AckDecision::Discard);
        assert_eq!(tracker.requeues("m1"), 0);
    }

    #[test]
    fn accept_clears_the_count() {
        let mut tracker = RedeliveryTracker::new(Some(2));

        tracker.review(Some("m1"), false, AckDecision::RetryRequeue);
        assert_eq!(
            tracker.review(Some("m1"), true, AckDecision::Accept),
            AckDecision::Accept
        );
        assert_eq!(tracker.requeues("m1"), 0);
    }

    #[test]
    fn fresh_delivery_restarts_the_count() {
        let mut tracker = RedeliveryTracker::new(Some(1));

        tracker.review(Some("m1"), false, AckDecision::RetryRequeue);
        assert_eq!(
            tracker.review(Some("m1"), false, AckDecision::RetryRequeue),
            AckDecision::RetryRequeue
        );
    }

    #[test]
    fn unbounded_and_anonymous_messages_pass_through() {
        let mut unbounded = RedeliveryTracker::new(None);
        for _ in 0..100 {
            assert_eq!(
                unbounded.review(Some("m1"), true, AckDecision::RetryRequeue),
                AckDecision::RetryRequeue
            );
        }
        assert_eq!(unbounded.tracked(), 0);

        let mut bounded = RedeliveryTracker::new(Some(0));
        assert_eq!(
            bounded.review(None, true, AckDecision::RetryRequeue),
            AckDecision::RetryRequeue
        );
    }

    #[test]
    fn abandoned_ids_do_not_pile_up() {
        let mut tracker = RedeliveryTracker::new(Some(5)).capacity(8);

        for n in 0..1000 {
            let id = format!("m{}", n);
            tracker.review(Some(&id), false, AckDecision::RetryRequeue);
            assert!(tracker.tracked() <= 8);
        }

        // the most recent ids are the ones kept
        assert_eq!(tracker.requeues("m999"), 1);
        assert_eq!(tracker.requeues("m0"), 0);
    }

    #[test]
    fn stale_counts_are_swept_before_live_ones() {
        let ttl = Duration::from_secs(60);
        let mut tracker = RedeliveryTracker::new(Some(5)).ttl(ttl).capacity(3);
        let start = Instant::now();
        let retry = AckDecision::RetryRequeue;

        tracker.review_at(start, Some("old-1"), false, retry);
        tracker.review_at(start, Some("old-2"), false, retry);
        let later = start + ttl / 2;
        tracker.review_at(later, Some("live"), false, retry);

        let after_ttl = start + ttl + Duration::from_secs(1);
        tracker.review_at(after_ttl, Some("new"), false, retry);

        assert_eq!(tracker.tracked(), 2);
        assert_eq!(tracker.requeues("live"), 1);
        assert_eq!(tracker.requeues("new"), 1);
        assert_eq!(tracker.requeues("old-1"), 0);
    }

    #[test]
    fn a_message_that_keeps_coming_back_keeps_its_count() {
        let mut tracker = RedeliveryTracker::new(Some(3)).capacity(2);
        let retry = AckDecision::RetryRequeue;
        let start = Instant::now();
        let tick = |n: u64| start + Duration::from_secs(n);

        tracker.review_at(tick(0), Some("hot"), false, retry);
        tracker.review_at(tick(1), Some("hot"), true, retry);
        tracker.review_at(tick(2), Some("cold"), false, retry);
        tracker.review_at(tick(3), Some("hot"), true, retry);
        tracker.review_at(tick(4), Some("colder"), false, retry);

        assert_eq!(tracker.requeues("cold"), 0);
        assert_eq!(tracker.requeues("hot"), 3);
        assert_eq!(
            tracker.review_at(tick(5), Some("hot"), true, retry),
            AckDecision::Discard
        );
    }
}

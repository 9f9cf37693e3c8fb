// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Management for RabbitMQ
//!
//! Exchanges are the routing namespaces messages are published to. The queue
//! topology never creates them implicitly: they are provisioned once, at
//! startup, through [`provision_exchanges`].

use crate::errors::AmqpError;
use lapin::{options::ExchangeDeclareOptions, types::FieldTable, Channel};
use tracing::{debug, error};

/// Represents the types of exchanges used by the game.
///
/// - Direct: routes on an exact match of the routing key
/// - Topic: routes on a `.`-separated pattern where `*` matches exactly one
///   token and `#` matches zero or more
/// - Fanout: routes to every bound queue, used for the dead-letter exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Topic,
    Fanout,
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
        }
    }
}

impl ExchangeKind {
    /// Tells whether a binding `pattern` on an exchange of this kind receives
    /// messages published under `key`.
    pub fn routes(&self, pattern: &str, key: &str) -> bool {
        match self {
            ExchangeKind::Direct => pattern == key,
            ExchangeKind::Fanout => true,
            ExchangeKind::Topic => {
                let pattern: Vec<&str> = pattern.split('.').collect();
                let key: Vec<&str> = key.split('.').collect();
                topic_match(&pattern, &key)
            }
        }
    }
}

fn topic_match(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.first(), key.first()) {
        (None, None) => true,
        (Some(&"#"), _) => {
            topic_match(&pattern[1..], key) || (!key.is_empty() && topic_match(pattern, &key[1..]))
        }
        (Some(&"*"), Some(_)) => topic_match(&pattern[1..], &key[1..]),
        (Some(p), Some(k)) if p == k => topic_match(&pattern[1..], &key[1..]),
        _ => false,
    }
}

/// Definition of a RabbitMQ exchange.
#[derive(Debug, Clone)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) durable: bool,
}

impl ExchangeDefinition {
    /// Creates a new, non-durable, direct exchange definition.
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Direct,
            durable: false,
        }
    }

    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn direct(self) -> Self {
        self.kind(ExchangeKind::Direct)
    }

    pub fn topic(self) -> Self {
        self.kind(ExchangeKind::Topic)
    }

    pub fn fanout(self) -> Self {
        self.kind(ExchangeKind::Fanout)
    }

    /// Makes the exchange durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Declares every exchange in `defs` on `channel`.
///
/// Declaring an exchange that already exists with the same settings is a no-op
/// on the broker side, so this is safe to run on every startup.
pub async fn provision_exchanges(
    channel: &Channel,
    defs: &[ExchangeDefinition],
) -> Result<(), AmqpError> {
    for exch in defs {
        debug!("creating exchange: {}", exch.name);

        match channel
            .exchange_declare(
                &exch.name,
                exch.kind.into(),
                ExchangeDeclareOptions {
                    passive: false,
                    durable: exch.durable,
                    auto_delete: false,
                    internal: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = exch.name,
                    "error to declare the exchange"
                );
                Err(AmqpError::DeclareExchangeError(exch.name.clone()))
            }
            _ => Ok(()),
        }?;

        debug!("exchange: {} was created", exch.name);
    }

    Ok(())
}

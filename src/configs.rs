// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Transport Configuration
//!
//! Connection parameters and the transport-wide knobs shared by every
//! subscription: dead-letter exchange, prefetch bound and redelivery bound.

use crate::routing::EXCHANGE_PERIL_DLX;
use clap::Args;

/// Application identity, used as the AMQP connection name.
#[derive(Debug, Clone)]
pub struct AppConfigs {
    pub name: String,
}

/// RabbitMQ connection parameters.
#[derive(Debug, Clone)]
pub struct RabbitMQConfigs {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
}

impl Default for RabbitMQConfigs {
    fn default() -> Self {
        RabbitMQConfigs {
            host: "localhost".to_owned(),
            port: 5672,
            user: "guest".to_owned(),
            password: "guest".to_owned(),
            vhost: "/".to_owned(),
        }
    }
}

/// Top level configuration.
#[derive(Debug, Clone)]
pub struct Configs {
    pub app: AppConfigs,
    pub rabbitmq: RabbitMQConfigs,
    /// Dead-letter exchange attached to every declared queue.
    pub dead_letter_exchange: String,
    /// Maximum number of unacknowledged deliveries per subscription.
    pub prefetch: u16,
    /// Requeues allowed per message before a retry becomes a discard.
    /// `None` requeues forever.
    pub max_requeues: Option<u32>,
}

impl Default for Configs {
    fn default() -> Self {
        Configs {
            app: AppConfigs {
                name: "peril".to_owned(),
            },
            rabbitmq: RabbitMQConfigs::default(),
            dead_letter_exchange: EXCHANGE_PERIL_DLX.to_owned(),
            prefetch: 10,
            max_requeues: Some(5),
        }
    }
}

impl Configs {
    pub fn app_name(mut self, name: &str) -> Self {
        self.app.name = name.to_owned();
        self
    }

    pub fn prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn max_requeues(mut self, max: Option<u32>) -> Self {
        self.max_requeues = max;
        self
    }

    /// Builds the `amqp://` URI. The vhost is percent-encoded so the default
    /// `/` vhost becomes `%2f`.
    pub fn amqp_uri(&self) -> String {
        let vhost = self.rabbitmq.vhost.replace('%', "%25").replace('/', "%2f");

        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.rabbitmq.user,
            self.rabbitmq.password,
            self.rabbitmq.host,
            self.rabbitmq.port,
            vhost
        )
    }
}

/// Broker flags shared by the binaries, each with an environment fallback.
#[derive(Args, Debug, Clone)]
pub struct BrokerArgs {
    #[arg(long, env = "RABBITMQ_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long, env = "RABBITMQ_PORT", default_value_t = 5672)]
    pub port: u16,

    #[arg(long, env = "RABBITMQ_USER", default_value = "guest")]
    pub user: String,

    #[arg(long, env = "RABBITMQ_PASSWORD", default_value = "guest")]
    pub password: String,

    #[arg(long, env = "RABBITMQ_VHOST", default_value = "/")]
    pub vhost: String,

    /// Unacknowledged deliveries allowed per subscription.
    #[arg(long, env = "PERIL_PREFETCH", default_value_t = 10)]
    pub prefetch: u16,

    /// Requeues allowed per message, 0 for no bound.
    #[arg(long, env = "PERIL_MAX_REQUEUES", default_value_t = 5)]
    pub max_requeues: u32,
}

impl BrokerArgs {
    pub fn into_configs(self, app_name: &str) -> Configs {
        let max_requeues = (self.max_requeues > 0).then_some(self.max_requeues);

        let mut cfg = Configs::default()
            .app_name(app_name)
            .prefetch(self.prefetch)
            .max_requeues(max_requeues);
        cfg.rabbitmq = RabbitMQConfigs {
            host: self.host,
            port: self.port,
            user: self.user,
            password: self.password,
            vhost: self.vhost,
        };

        cfg
    }
}

// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use serde::{de::DeserializeOwned, Serialize};

use crate::codec::Codec;
use crate::errors::AmqpError;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Self-describing JSON codec, for values exchanged between producers and
/// consumers that evolve independently.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn content_type(&self) -> &'static str {
        JSON_CONTENT_TYPE
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>, AmqpError> {
        serde_json::to_vec(value).map_err(|e| AmqpError::SerializePayloadError(e.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> Result<T, AmqpError> {
        serde_json::from_slice(payload).map_err(|e| AmqpError::ParsePayloadError(e.to_string()))
    }
}

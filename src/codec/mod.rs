// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Payload Codecs
//!
//! A codec turns a typed value into an opaque payload plus a content-type tag
//! and back. Each wire type picks its codec statically through
//! [`WireMessage::Codec`]; the content type of an incoming payload is never
//! used to choose how to decode it.

use crate::errors::AmqpError;
use serde::{de::DeserializeOwned, Serialize};

pub mod bincode;
pub mod json;

pub use self::bincode::BincodeCodec;
pub use self::json::JsonCodec;

/// Encode/decode capability for values of type `T`.
pub trait Codec<T>: Send + Sync {
    /// Content-type tag stamped on every published payload.
    fn content_type(&self) -> &'static str;

    /// Encode a value into bytes
    fn encode(&self, value: &T) -> Result<Vec<u8>, AmqpError>;

    /// Decode bytes into a value
    fn decode(&self, payload: &[u8]) -> Result<T, AmqpError>;
}

/// A type that travels over the broker, bound to exactly one codec.
pub trait WireMessage: Serialize + DeserializeOwned + Send + Sized + 'static {
    type Codec: Codec<Self> + Default + 'static;
}

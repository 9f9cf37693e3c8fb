// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use serde::{de::DeserializeOwned, Serialize};

use crate::codec::Codec;
use crate::errors::AmqpError;

/// Content type for bincode payloads
pub const BINCODE_CONTENT_TYPE: &str = "application/x-bincode";

/// Compact binary codec, only for values exchanged between instances of this
/// same program since the format carries no schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl<T> Codec<T> for BincodeCodec
where
    T: Serialize + DeserializeOwned,
{
    fn content_type(&self) -> &'static str {
        BINCODE_CONTENT_TYPE
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>, AmqpError> {
        bincode::serialize(value).map_err(|e| AmqpError::SerializePayloadError(e.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> Result<T, AmqpError> {
        bincode::deserialize(payload).map_err(|e| AmqpError::ParsePayloadError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        username: String,
        message: String,
    }

    #[test]
    fn round_trip() {
        let codec = BincodeCodec;
        let record = Record {
            username: "alice".to_owned(),
            message: "alice won a war against bob".to_owned(),
        };

        let bytes = codec.encode(&record).unwrap();
        assert_eq!(Codec::<Record>::decode(&codec, &bytes).unwrap(), record);
    }

    #[test]
    fn truncated_payload_is_a_parse_error() {
        let bytes = BincodeCodec
            .encode(&Record {
                username: "bob".to_owned(),
                message: "hello".to_owned(),
            })
            .unwrap();

        let err = Codec::<Record>::decode(&BincodeCodec, &bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, AmqpError::ParsePayloadError(_)));
    }
}

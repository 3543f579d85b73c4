//! JSON documents carried inside string fields.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::{DecodeError, EncodeError};

/// Transport encoding applied to a serialized JSON document before it is
/// written as a length-delimited string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JsonEncoding {
    /// The serialized document itself.
    Raw,
    /// Standard base64 with padding.
    Base64,
    /// Lowercase hex.
    Hex,
}

impl JsonEncoding {
    /// Serializes `value` and applies the transport encoding.
    pub(crate) fn encode_payload(self, value: &serde_json::Value) -> Result<String, EncodeError> {
        let text = serde_json::to_string(value).map_err(|error| {
            EncodeError::new(format!("failed to serialize JSON value: {}", error))
        })?;
        Ok(match self {
            JsonEncoding::Raw => text,
            JsonEncoding::Base64 => STANDARD.encode(&text),
            JsonEncoding::Hex => hex::encode(&text),
        })
    }

    /// Reverses the transport encoding and parses the document.
    pub(crate) fn decode_payload(self, text: &str) -> Result<serde_json::Value, DecodeError> {
        let document = match self {
            JsonEncoding::Raw => text.as_bytes().to_vec(),
            JsonEncoding::Base64 => STANDARD.decode(text).map_err(|error| {
                DecodeError::new(format!("invalid base64 JSON payload: {}", error))
            })?,
            JsonEncoding::Hex => hex::decode(text).map_err(|error| {
                DecodeError::new(format!("invalid hex JSON payload: {}", error))
            })?,
        };
        serde_json::from_slice(&document)
            .map_err(|error| DecodeError::new(format!("invalid JSON payload: {}", error)))
    }

    /// The default value of a JSON codec: the empty object.
    pub(crate) fn default_value() -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }
}

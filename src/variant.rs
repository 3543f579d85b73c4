//! Discriminated unions over message codecs.

use std::sync::Arc;

use bytes::Bytes;

use crate::message::{message, MessageCodec};
use crate::schema;
use crate::value::{MessageValue, Value};
use crate::{DecodeError, EncodeError};

/// One registered alternative of a discriminated union.
#[derive(Debug, Clone)]
struct VariantCase {
    name: String,
    id: i32,
    codec: MessageCodec,
}

/// Builds a discriminated-union codec over the given alternatives.
///
/// On the wire a variant is the fixed envelope `{ typename: string(1),
/// typeid: int32(2), value: bytes(3) }`, with the alternative's own encoding
/// nested in `value`. The user-facing shape is `{ type: string, value:
/// message }`; the `type` field selects the alternative by name on encode,
/// and decoding routes by `typename`, falling back to `typeid`.
///
/// Encoding a value whose discriminator names no registered alternative
/// fails with an [`EncodeError`]; decoding an envelope that matches none
/// fails with a [`DecodeError`].
pub fn variants<I, S>(cases: I) -> MessageCodec
where
    I: IntoIterator<Item = (S, i32, MessageCodec)>,
    S: Into<String>,
{
    let cases: Arc<Vec<VariantCase>> = Arc::new(
        cases
            .into_iter()
            .map(|(name, id, codec)| VariantCase {
                name: name.into(),
                id,
                codec,
            })
            .collect(),
    );

    let envelope = message([
        ("typename", schema::string(1)),
        ("typeid", schema::int32(2)),
        ("value", schema::bytes(3)),
    ]);

    let encode_cases = Arc::clone(&cases);
    let decode_cases = cases;

    envelope.transform(
        move |value| {
            let Value::Message(message) = value else {
                return Err(EncodeError::new(format!(
                    "expected variant message value, found {}",
                    value.kind()
                )));
            };
            let name = message
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| EncodeError::new("variant value has no type discriminator"))?;
            let case = encode_cases
                .iter()
                .find(|case| case.name == name)
                .ok_or_else(|| {
                    EncodeError::new(format!("variant has no registered codec: {}", name))
                })?;
            let payload = message
                .get("value")
                .ok_or_else(|| EncodeError::new("variant value has no payload"))?;
            let encoded = case.codec.encode(payload)?;
            Ok(Value::Message(
                MessageValue::new()
                    .with("typename", case.name.as_str())
                    .with("typeid", case.id)
                    .with("value", encoded.written_bytes()),
            ))
        },
        move |value| {
            let Value::Message(mut message) = value else {
                return Err(DecodeError::new("expected variant envelope message"));
            };
            let name = message
                .get("typename")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let id = message
                .get("typeid")
                .and_then(Value::as_i32)
                .unwrap_or_default();
            let case = decode_cases
                .iter()
                .find(|case| case.name == name)
                .or_else(|| decode_cases.iter().find(|case| case.id == id))
                .ok_or_else(|| {
                    DecodeError::new(format!(
                        "variant has no registered codec: {:?} ({})",
                        name, id
                    ))
                })?;
            let payload = match message.remove("value") {
                Some(Value::Bytes(bytes)) => bytes,
                Some(_) => return Err(DecodeError::new("variant payload is not bytes")),
                None => Bytes::new(),
            };
            let inner = case.codec.decode(&payload)?;
            Ok(Value::Message(
                MessageValue::new()
                    .with("type", case.name.as_str())
                    .with("value", inner),
            ))
        },
        Value::Message(MessageValue::new()),
    )
}

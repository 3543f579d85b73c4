//! Schema-driven message encoding and decoding.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::buffer::WireBuffer;
use crate::codec::{DecodeFn, EncodeFn};
use crate::encoding::{check_wire_type, DecodeContext, WireType};
use crate::schema::{FieldSchema, Repetition};
use crate::unknown::UnknownFieldList;
use crate::value::{MessageValue, Value};
use crate::{DecodeError, EncodeError};

/// Declares a message codec from named field schemas.
///
/// Field declaration order is encoding order.
///
/// ```
/// use schemabuf::{message, schema};
///
/// let codec = message([
///     ("id", schema::int32(1)),
///     ("name", schema::string(2)),
/// ]);
/// # let _ = codec;
/// ```
///
/// # Panics
///
/// Panics if two fields share a name or a tag.
pub fn message<I, S>(fields: I) -> MessageCodec
where
    I: IntoIterator<Item = (S, FieldSchema)>,
    S: Into<String>,
{
    MessageCodec::new(fields)
}

/// Encodes and decodes messages described by a set of field schemas.
///
/// The codec iterates its fields in declaration order on encode, elides
/// values equal to their codec default, preserves unknown fields across a
/// decode/encode cycle, and can be wrapped with message-level transforms.
#[derive(Clone)]
pub struct MessageCodec {
    fields: IndexMap<String, FieldSchema>,
    by_tag: HashMap<u32, usize>,
    transforms: Vec<ValueTransform>,
}

#[derive(Clone)]
struct ValueTransform {
    encode: Arc<EncodeFn>,
    decode: Arc<DecodeFn>,
    default: Value,
}

impl fmt::Debug for MessageCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageCodec")
            .field("fields", &self.fields)
            .field("transforms", &self.transforms.len())
            .finish()
    }
}

impl MessageCodec {
    /// See [`message`].
    pub fn new<I, S>(fields: I) -> MessageCodec
    where
        I: IntoIterator<Item = (S, FieldSchema)>,
        S: Into<String>,
    {
        let mut named: IndexMap<String, FieldSchema> = IndexMap::new();
        for (name, schema) in fields {
            let name = name.into();
            if named.insert(name.clone(), schema).is_some() {
                panic!("duplicate field name {:?} in message schema", name);
            }
        }

        let mut by_tag = HashMap::with_capacity(named.len());
        for (position, (name, schema)) in named.iter().enumerate() {
            if by_tag.insert(schema.tag(), position).is_some() {
                panic!(
                    "duplicate field tag {} in message schema ({:?})",
                    schema.tag(),
                    name
                );
            }
        }

        MessageCodec {
            fields: named,
            by_tag,
            transforms: Vec::new(),
        }
    }

    /// Iterates the declared fields in encoding order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSchema)> {
        self.fields
            .iter()
            .map(|(name, schema)| (name.as_str(), schema))
    }

    /// Looks up a field schema by name.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    /// Wraps the whole codec with a bijective value mapping: `encode` runs
    /// before encoding and `decode` after decoding. Transforms compose; the
    /// mapping added last runs first on encode and last on decode. Unknown
    /// fields are carried around each mapping, so round-tripping keeps them
    /// even when the mapping rebuilds the message.
    pub fn transform<E, D>(mut self, encode: E, decode: D, default: Value) -> MessageCodec
    where
        E: Fn(&Value) -> Result<Value, EncodeError> + Send + Sync + 'static,
        D: Fn(Value) -> Result<Value, DecodeError> + Send + Sync + 'static,
    {
        self.transforms.push(ValueTransform {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
            default,
        });
        self
    }

    /// A message value with every declared field set to its default.
    pub(crate) fn default_message(&self) -> MessageValue {
        let mut value = MessageValue::new();
        for (name, schema) in self.fields() {
            value.set(name, schema.default_value());
        }
        value
    }

    /// The default value of the codec as a whole: the all-defaults message,
    /// or the outermost transform's declared default.
    pub fn default_value(&self) -> Value {
        match self.transforms.last() {
            Some(transform) => transform.default.clone(),
            None => Value::Message(self.default_message()),
        }
    }

    /// Whether encoding `value` would produce zero bytes.
    pub fn is_default(&self, value: &Value) -> bool {
        let value = match self.apply_encode_transforms(value) {
            Ok(value) => value,
            Err(_) => return false,
        };
        let Value::Message(message) = value.as_ref() else {
            return false;
        };
        message.unknown_fields().is_empty()
            && self.fields().all(|(name, schema)| {
                message
                    .get(name)
                    .map_or(true, |value| schema.codec().is_default(value))
            })
    }

    /// Runs the encode half of every transform, outermost first, carrying
    /// unknown fields around each user mapping.
    pub(crate) fn apply_encode_transforms<'v>(
        &self,
        value: &'v Value,
    ) -> Result<Cow<'v, Value>, EncodeError> {
        let mut value = Cow::Borrowed(value);
        for transform in self.transforms.iter().rev() {
            let (input, unknown) = detach_unknowns(value);
            let mut mapped = (transform.encode)(input.as_ref())?;
            if let Value::Message(message) = &mut mapped {
                message.unknown_fields_mut().absorb(unknown);
            }
            value = Cow::Owned(mapped);
        }
        Ok(value)
    }

    /// Runs the decode half of every transform, innermost first.
    fn apply_decode_transforms(&self, mut value: Value) -> Result<Value, DecodeError> {
        for transform in &self.transforms {
            let unknown = match &mut value {
                Value::Message(message) => mem::take(message.unknown_fields_mut()),
                _ => UnknownFieldList::new(),
            };
            value = (transform.decode)(value)?;
            if let Value::Message(message) = &mut value {
                message.unknown_fields_mut().absorb(unknown);
            }
        }
        Ok(value)
    }

    /// Exact encoded length of `value`, headers and framing included.
    /// Elided default fields contribute nothing.
    pub fn encoded_len(&self, value: &Value) -> Result<usize, EncodeError> {
        let value = self.apply_encode_transforms(value)?;
        self.encoded_len_fields(&value)
    }

    pub(crate) fn encoded_len_fields(&self, value: &Value) -> Result<usize, EncodeError> {
        let message = expect_message(value)?;
        let mut len = 0;
        for (name, schema) in self.fields() {
            let Some(field_value) = message.get(name) else {
                continue;
            };
            if schema.codec().is_default(field_value) {
                continue;
            }
            len += schema.encoded_len(field_value)?;
        }
        Ok(len + message.unknown_fields().encoded_len())
    }

    /// Encodes `value` into a fresh buffer sized by the length predictor;
    /// the writer never backtracks.
    pub fn encode(&self, value: &Value) -> Result<WireBuffer<'static>, EncodeError> {
        let value = self.apply_encode_transforms(value)?;
        let len = self.encoded_len_fields(&value)?;
        let mut buf = WireBuffer::with_capacity(len);
        self.encode_fields(&value, &mut buf)?;
        Ok(buf)
    }

    /// Encodes `value` at the cursor of an existing buffer.
    pub fn encode_into(&self, value: &Value, buf: &mut WireBuffer<'_>) -> Result<(), EncodeError> {
        let value = self.apply_encode_transforms(value)?;
        self.encode_fields(&value, buf)
    }

    /// Writes declared fields in schema order, then unknown fields verbatim.
    pub(crate) fn encode_fields(
        &self,
        value: &Value,
        buf: &mut WireBuffer<'_>,
    ) -> Result<(), EncodeError> {
        let message = expect_message(value)?;
        for (name, schema) in self.fields() {
            let Some(field_value) = message.get(name) else {
                continue;
            };
            if schema.codec().is_default(field_value) {
                continue;
            }
            schema.encode(field_value, buf)?;
        }
        message.unknown_fields().encode(buf)
    }

    /// Decodes a message from raw bytes. The entire input is consumed.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value, DecodeError> {
        let mut buf = WireBuffer::from_slice(bytes);
        self.decode_from(&mut buf)
    }

    /// Decodes a message from the buffer cursor to the end of the readable
    /// payload.
    pub fn decode_from(&self, buf: &mut WireBuffer<'_>) -> Result<Value, DecodeError> {
        self.decode_fields(buf, DecodeContext::default())
    }

    pub(crate) fn decode_fields(
        &self,
        buf: &mut WireBuffer<'_>,
        ctx: DecodeContext,
    ) -> Result<Value, DecodeError> {
        let mut decoded: IndexMap<String, Value> = IndexMap::new();
        let mut unknown = UnknownFieldList::new();

        while buf.has_remaining() {
            let (tag, wire_type) = buf.get_key()?;
            if wire_type.is_group() {
                return Err(DecodeError::new("group wire types are not supported"));
            }
            let Some((name, schema)) = self
                .by_tag
                .get(&tag)
                .and_then(|&position| self.fields.get_index(position))
            else {
                unknown.read_field(tag, wire_type, buf)?;
                continue;
            };

            if wire_type == WireType::LengthDelimited
                && schema.codec().wire_type() != WireType::LengthDelimited
            {
                // A packed block for a numeric codec.
                self.merge_packed(name, schema, &mut decoded, buf, ctx.clone())
                    .map_err(|mut error| {
                        error.push(name);
                        error
                    })?;
            } else {
                check_wire_type(schema.codec().wire_type(), wire_type).map_err(|mut error| {
                    error.push(name);
                    error
                })?;
                let value = schema
                    .codec()
                    .decode_with(buf, ctx.clone())
                    .map_err(|mut error| {
                        error.push(name);
                        error
                    })?;
                merge_value(&mut decoded, name, value);
            }
        }

        // Materialize absent fields and normalize repetition.
        let mut message = MessageValue::new();
        for (name, schema) in self.fields() {
            let value = match decoded.shift_remove(name) {
                None => schema.default_value(),
                Some(Value::List(_)) if schema.repetition() == Repetition::Single => {
                    let mut error =
                        DecodeError::new("multiple values for a field declared single");
                    error.push(name);
                    return Err(error);
                }
                Some(value @ Value::List(_)) => value,
                Some(value) if schema.repetition() != Repetition::Single => {
                    Value::List(vec![value])
                }
                Some(value) => value,
            };
            message.set(name, value);
        }
        *message.unknown_fields_mut() = unknown;

        self.apply_decode_transforms(Value::Message(message))
    }

    fn merge_packed(
        &self,
        name: &str,
        schema: &FieldSchema,
        decoded: &mut IndexMap<String, Value>,
        buf: &mut WireBuffer<'_>,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError> {
        let len = buf.get_varint()?;
        if len > buf.remaining() as u64 {
            return Err(DecodeError::new("buffer underflow"));
        }
        let mut block = buf.slice(len as usize)?;
        while block.has_remaining() {
            let value = schema.codec().decode_with(&mut block, ctx.clone())?;
            merge_value(decoded, name, value);
        }
        Ok(())
    }
}

/// Splits a message value from its unknown fields so user mappings never
/// see them. Non-message values pass through with an empty list.
fn detach_unknowns(value: Cow<'_, Value>) -> (Cow<'_, Value>, UnknownFieldList) {
    match value {
        Cow::Owned(Value::Message(mut message)) => {
            let unknown = mem::take(message.unknown_fields_mut());
            (Cow::Owned(Value::Message(message)), unknown)
        }
        Cow::Borrowed(Value::Message(message)) if !message.unknown_fields().is_empty() => {
            let mut message = message.clone();
            let unknown = mem::take(message.unknown_fields_mut());
            (Cow::Owned(Value::Message(message)), unknown)
        }
        other => (other, UnknownFieldList::new()),
    }
}

/// Wire-order append: a second value for a field promotes it to a list.
fn merge_value(decoded: &mut IndexMap<String, Value>, name: &str, value: Value) {
    match decoded.get_mut(name) {
        None => {
            decoded.insert(name.to_string(), value);
        }
        Some(Value::List(items)) => items.push(value),
        Some(existing) => {
            let first = mem::replace(existing, Value::Bool(false));
            *existing = Value::List(vec![first, value]);
        }
    }
}

fn expect_message(value: &Value) -> Result<&MessageValue, EncodeError> {
    match value {
        Value::Message(message) => Ok(message),
        other => Err(EncodeError::new(format!(
            "expected message value, found {}",
            other.kind()
        ))),
    }
}

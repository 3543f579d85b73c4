//! The composable family of value codecs.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::buffer::WireBuffer;
use crate::encoding::{encoded_len_varint, encoded_len_zigzag64, DecodeContext, WireType};
use crate::json::JsonEncoding;
use crate::message::MessageCodec;
use crate::value::{MessageValue, Value};
use crate::{DecodeError, EncodeError};

pub(crate) type EncodeFn = dyn Fn(&Value) -> Result<Value, EncodeError> + Send + Sync;
pub(crate) type DecodeFn = dyn Fn(Value) -> Result<Value, DecodeError> + Send + Sync;

/// A value codec: one per Protobuf scalar flavor, plus nested messages,
/// JSON strings, and transform wrappers.
///
/// A codec encodes and decodes only value bytes; field headers and
/// repetition are the schema layer's concern. Codecs are immutable and
/// cheap to clone.
#[derive(Clone)]
pub enum Codec {
    Bool,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Float,
    Double,
    /// Open enumeration: any integer is accepted on the wire.
    Enum,
    String,
    Bytes,
    /// A nested message with its own schema.
    Message(Arc<MessageCodec>),
    /// A weak link to a message schema, for self-referential schemas built
    /// with `Arc::new_cyclic`.
    MessageRef(Weak<MessageCodec>),
    /// A JSON document carried in a string field.
    Json(JsonEncoding),
    /// Any codec wrapped with a bijective value mapping.
    Transform(Box<Transform>),
}

/// A bijective value mapping wrapped around a codec.
///
/// The wire bytes are the inner codec's; only the value domain changes.
/// `encode` runs before encoding, `decode` after decoding, and the declared
/// default replaces the inner codec's.
#[derive(Clone)]
pub struct Transform {
    inner: Codec,
    encode: Arc<EncodeFn>,
    decode: Arc<DecodeFn>,
    default: Value,
}

impl Transform {
    /// Wraps `inner` with the given mapping. Usually reached through
    /// [`Codec::transform`] or the schema layer.
    pub fn new<E, D>(inner: Codec, encode: E, decode: D, default: Value) -> Transform
    where
        E: Fn(&Value) -> Result<Value, EncodeError> + Send + Sync + 'static,
        D: Fn(Value) -> Result<Value, DecodeError> + Send + Sync + 'static,
    {
        Transform {
            inner,
            encode: Arc::new(encode),
            decode: Arc::new(decode),
            default,
        }
    }

    /// The wrapped codec.
    pub fn inner(&self) -> &Codec {
        &self.inner
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("inner", &self.inner)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Bool => f.write_str("Bool"),
            Codec::Int32 => f.write_str("Int32"),
            Codec::Int64 => f.write_str("Int64"),
            Codec::Uint32 => f.write_str("Uint32"),
            Codec::Uint64 => f.write_str("Uint64"),
            Codec::Sint32 => f.write_str("Sint32"),
            Codec::Sint64 => f.write_str("Sint64"),
            Codec::Fixed32 => f.write_str("Fixed32"),
            Codec::Fixed64 => f.write_str("Fixed64"),
            Codec::Sfixed32 => f.write_str("Sfixed32"),
            Codec::Sfixed64 => f.write_str("Sfixed64"),
            Codec::Float => f.write_str("Float"),
            Codec::Double => f.write_str("Double"),
            Codec::Enum => f.write_str("Enum"),
            Codec::String => f.write_str("String"),
            Codec::Bytes => f.write_str("Bytes"),
            Codec::Message(codec) => f.debug_tuple("Message").field(codec).finish(),
            Codec::MessageRef(_) => f.write_str("MessageRef(..)"),
            Codec::Json(encoding) => f.debug_tuple("Json").field(encoding).finish(),
            Codec::Transform(transform) => transform.fmt(f),
        }
    }
}

impl Codec {
    /// The wire type emitted for a single value of this codec.
    pub fn wire_type(&self) -> WireType {
        match self {
            Codec::Bool
            | Codec::Int32
            | Codec::Int64
            | Codec::Uint32
            | Codec::Uint64
            | Codec::Sint32
            | Codec::Sint64
            | Codec::Enum => WireType::Varint,
            Codec::Fixed32 | Codec::Sfixed32 | Codec::Float => WireType::ThirtyTwoBit,
            Codec::Fixed64 | Codec::Sfixed64 | Codec::Double => WireType::SixtyFourBit,
            Codec::String
            | Codec::Bytes
            | Codec::Message(_)
            | Codec::MessageRef(_)
            | Codec::Json(_) => WireType::LengthDelimited,
            Codec::Transform(transform) => transform.inner.wire_type(),
        }
    }

    /// The Protobuf default for this codec's value domain.
    pub fn default_value(&self) -> Value {
        match self {
            Codec::Bool => Value::Bool(false),
            Codec::Int32 | Codec::Sint32 | Codec::Sfixed32 | Codec::Enum => Value::Int32(0),
            Codec::Int64 | Codec::Sint64 | Codec::Sfixed64 => Value::Int64(0),
            Codec::Uint32 | Codec::Fixed32 => Value::Uint32(0),
            Codec::Uint64 | Codec::Fixed64 => Value::Uint64(0),
            Codec::Float => Value::Float(0.0),
            Codec::Double => Value::Double(0.0),
            Codec::String => Value::String(String::new()),
            Codec::Bytes => Value::Bytes(bytes::Bytes::new()),
            Codec::Message(codec) => Value::Message(codec.default_message()),
            // Weak links exist to break schema cycles; materializing the
            // linked schema's defaults here would recurse without end, so
            // the default stays shallow.
            Codec::MessageRef(_) => Value::Message(MessageValue::new()),
            Codec::Json(_) => Value::Json(JsonEncoding::default_value()),
            Codec::Transform(transform) => transform.default.clone(),
        }
    }

    /// Whether `value` equals the codec default, in which case a field
    /// holding it is elided from output. Lists are default when empty.
    pub fn is_default(&self, value: &Value) -> bool {
        if let Value::List(items) = value {
            return items.is_empty();
        }
        match self {
            Codec::Bool => matches!(value, Value::Bool(false)),
            Codec::Int32 | Codec::Sint32 | Codec::Sfixed32 | Codec::Enum => {
                matches!(value, Value::Int32(0))
            }
            Codec::Int64 | Codec::Sint64 | Codec::Sfixed64 => matches!(value, Value::Int64(0)),
            Codec::Uint32 | Codec::Fixed32 => matches!(value, Value::Uint32(0)),
            Codec::Uint64 | Codec::Fixed64 => matches!(value, Value::Uint64(0)),
            Codec::Float => matches!(value, Value::Float(v) if *v == 0.0),
            Codec::Double => matches!(value, Value::Double(v) if *v == 0.0),
            Codec::String => matches!(value, Value::String(s) if s.is_empty()),
            Codec::Bytes => matches!(value, Value::Bytes(b) if b.is_empty()),
            Codec::Message(codec) => codec.is_default(value),
            Codec::MessageRef(weak) => weak
                .upgrade()
                .map_or(false, |codec| codec.is_default(value)),
            Codec::Json(_) => {
                matches!(value, Value::Json(v) if v.as_object().map_or(false, |m| m.is_empty()))
            }
            Codec::Transform(transform) => match (transform.encode)(value) {
                Ok(inner) => transform.inner.is_default(&inner),
                Err(_) => false,
            },
        }
    }

    /// Encodes one value at the buffer cursor. Length-delimited codecs write
    /// their framing varint; field headers are the schema layer's concern.
    pub fn encode(&self, value: &Value, buf: &mut WireBuffer<'_>) -> Result<(), EncodeError> {
        match self {
            Codec::Bool => buf.put_varint(u64::from(value.expect_bool()?)),
            Codec::Int32 => buf.put_varint(value.expect_i32()? as i64 as u64),
            Codec::Int64 => buf.put_varint(value.expect_i64()? as u64),
            Codec::Uint32 => buf.put_varint(u64::from(value.expect_u32()?)),
            Codec::Uint64 => buf.put_varint(value.expect_u64()?),
            Codec::Sint32 => {
                let v = value.expect_i32()?;
                buf.put_varint(((v << 1) ^ (v >> 31)) as u32 as u64)
            }
            Codec::Sint64 => buf.put_zigzag(value.expect_i64()?),
            Codec::Fixed32 => buf.put_u32_le(value.expect_u32()?),
            Codec::Fixed64 => buf.put_u64_le(value.expect_u64()?),
            Codec::Sfixed32 => buf.put_i32_le(value.expect_i32()?),
            Codec::Sfixed64 => buf.put_i64_le(value.expect_i64()?),
            Codec::Float => buf.put_f32_le(value.expect_f32()?),
            Codec::Double => buf.put_f64_le(value.expect_f64()?),
            Codec::Enum => buf.put_varint(value.expect_i32()? as i64 as u64),
            Codec::String => buf.put_string(value.expect_str()?),
            Codec::Bytes => buf.put_length_delimited(value.expect_bytes()?),
            Codec::Message(codec) => encode_nested(codec, value, buf),
            Codec::MessageRef(weak) => encode_nested(upgrade_encode(weak)?.as_ref(), value, buf),
            Codec::Json(encoding) => {
                let payload = encoding.encode_payload(value.expect_json()?)?;
                buf.put_string(&payload)
            }
            Codec::Transform(transform) => {
                let inner = (transform.encode)(value)?;
                transform.inner.encode(&inner, buf)
            }
        }
    }

    /// Decodes one value at the buffer cursor.
    pub fn decode(&self, buf: &mut WireBuffer<'_>) -> Result<Value, DecodeError> {
        self.decode_with(buf, DecodeContext::default())
    }

    pub(crate) fn decode_with(
        &self,
        buf: &mut WireBuffer<'_>,
        ctx: DecodeContext,
    ) -> Result<Value, DecodeError> {
        match self {
            Codec::Bool => Ok(Value::Bool(buf.get_varint()? != 0)),
            // The low 32 bits, sign-reinterpreted, per the encoding guide.
            Codec::Int32 => Ok(Value::Int32(buf.get_varint()? as u32 as i32)),
            Codec::Int64 => Ok(Value::Int64(buf.get_varint()? as i64)),
            Codec::Uint32 => Ok(Value::Uint32(buf.get_varint()? as u32)),
            Codec::Uint64 => Ok(Value::Uint64(buf.get_varint()?)),
            Codec::Sint32 => {
                let v = buf.get_varint()? as u32;
                Ok(Value::Int32(((v >> 1) as i32) ^ (-((v & 1) as i32))))
            }
            Codec::Sint64 => Ok(Value::Int64(buf.get_zigzag()?)),
            Codec::Fixed32 => Ok(Value::Uint32(buf.get_u32_le()?)),
            Codec::Fixed64 => Ok(Value::Uint64(buf.get_u64_le()?)),
            Codec::Sfixed32 => Ok(Value::Int32(buf.get_i32_le()?)),
            Codec::Sfixed64 => Ok(Value::Int64(buf.get_i64_le()?)),
            Codec::Float => Ok(Value::Float(buf.get_f32_le()?)),
            Codec::Double => Ok(Value::Double(buf.get_f64_le()?)),
            Codec::Enum => Ok(Value::Int32(buf.get_varint()? as u32 as i32)),
            Codec::String => Ok(Value::String(buf.get_string()?)),
            Codec::Bytes => Ok(Value::Bytes(buf.get_length_delimited()?)),
            Codec::Message(codec) => decode_nested(codec, buf, ctx),
            Codec::MessageRef(weak) => decode_nested(upgrade_decode(weak)?.as_ref(), buf, ctx),
            Codec::Json(encoding) => {
                let text = buf.get_string()?;
                Ok(Value::Json(encoding.decode_payload(&text)?))
            }
            Codec::Transform(transform) => {
                let inner = transform.inner.decode_with(buf, ctx)?;
                (transform.decode)(inner)
            }
        }
    }

    /// Exact number of bytes [`Codec::encode`] will produce for `value`.
    pub fn encoded_len(&self, value: &Value) -> Result<usize, EncodeError> {
        match self {
            Codec::Bool => Ok(encoded_len_varint(u64::from(value.expect_bool()?))),
            Codec::Int32 => Ok(encoded_len_varint(value.expect_i32()? as i64 as u64)),
            Codec::Int64 => Ok(encoded_len_varint(value.expect_i64()? as u64)),
            Codec::Uint32 => Ok(encoded_len_varint(u64::from(value.expect_u32()?))),
            Codec::Uint64 => Ok(encoded_len_varint(value.expect_u64()?)),
            Codec::Sint32 => {
                let v = value.expect_i32()?;
                Ok(encoded_len_varint(((v << 1) ^ (v >> 31)) as u32 as u64))
            }
            Codec::Sint64 => Ok(encoded_len_zigzag64(value.expect_i64()?)),
            Codec::Fixed32 => {
                value.expect_u32()?;
                Ok(4)
            }
            Codec::Fixed64 => {
                value.expect_u64()?;
                Ok(8)
            }
            Codec::Sfixed32 => {
                value.expect_i32()?;
                Ok(4)
            }
            Codec::Sfixed64 => {
                value.expect_i64()?;
                Ok(8)
            }
            Codec::Float => {
                value.expect_f32()?;
                Ok(4)
            }
            Codec::Double => {
                value.expect_f64()?;
                Ok(8)
            }
            Codec::Enum => Ok(encoded_len_varint(value.expect_i32()? as i64 as u64)),
            Codec::String => {
                let len = value.expect_str()?.len();
                Ok(encoded_len_varint(len as u64) + len)
            }
            Codec::Bytes => {
                let len = value.expect_bytes()?.len();
                Ok(encoded_len_varint(len as u64) + len)
            }
            Codec::Message(codec) => {
                let len = codec.encoded_len(value)?;
                Ok(encoded_len_varint(len as u64) + len)
            }
            Codec::MessageRef(weak) => {
                let len = upgrade_encode(weak)?.encoded_len(value)?;
                Ok(encoded_len_varint(len as u64) + len)
            }
            Codec::Json(encoding) => {
                let len = encoding.encode_payload(value.expect_json()?)?.len();
                Ok(encoded_len_varint(len as u64) + len)
            }
            Codec::Transform(transform) => transform.inner.encoded_len(&(transform.encode)(value)?),
        }
    }

    /// Wraps this codec with a bijective value mapping. Transforms compose
    /// by nesting: the outermost mapping runs first on encode and last on
    /// decode.
    pub fn transform<E, D>(self, encode: E, decode: D, default: Value) -> Codec
    where
        E: Fn(&Value) -> Result<Value, EncodeError> + Send + Sync + 'static,
        D: Fn(Value) -> Result<Value, DecodeError> + Send + Sync + 'static,
    {
        Codec::Transform(Box::new(Transform::new(self, encode, decode, default)))
    }
}

fn upgrade_encode(weak: &Weak<MessageCodec>) -> Result<Arc<MessageCodec>, EncodeError> {
    weak.upgrade()
        .ok_or_else(|| EncodeError::new("message schema reference no longer alive"))
}

fn upgrade_decode(weak: &Weak<MessageCodec>) -> Result<Arc<MessageCodec>, DecodeError> {
    weak.upgrade()
        .ok_or_else(|| DecodeError::new("message schema reference no longer alive"))
}

fn encode_nested(
    codec: &MessageCodec,
    value: &Value,
    buf: &mut WireBuffer<'_>,
) -> Result<(), EncodeError> {
    let value = codec.apply_encode_transforms(value)?;
    let len = codec.encoded_len_fields(&value)?;
    buf.put_varint(len as u64)?;
    codec.encode_fields(&value, buf)
}

fn decode_nested(
    codec: &MessageCodec,
    buf: &mut WireBuffer<'_>,
    ctx: DecodeContext,
) -> Result<Value, DecodeError> {
    ctx.limit_reached()?;
    let len = buf.get_varint()?;
    if len > buf.remaining() as u64 {
        return Err(DecodeError::new("buffer underflow"));
    }
    let mut inner = buf.slice(len as usize)?;
    codec.decode_fields(&mut inner, ctx.enter_recursion())
}

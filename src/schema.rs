//! Field schemas and the factory surface for declaring them.
//!
//! A message schema is a set of named [`FieldSchema`] values, each binding a
//! codec to a field number. The constructors here mirror the Protobuf scalar
//! names; the [`repeated`] and [`repeated::expanded`] modules provide the
//! same constructors for repeated fields.

use std::sync::{Arc, Weak};

use crate::buffer::WireBuffer;
use crate::codec::Codec;
use crate::encoding::{encoded_len_varint, key_len, WireType, MAX_TAG, MIN_TAG};
use crate::json::JsonEncoding;
use crate::message::MessageCodec;
use crate::value::Value;
use crate::{DecodeError, EncodeError};

/// How a field repeats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Repetition {
    /// One value per message.
    Single,
    /// Repeated; numeric wire types are packed into a single block.
    Repeated,
    /// Repeated with one tagged element per value.
    Expanded,
}

/// How a field's values are laid out on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EncodeMode {
    Single,
    Packed,
    Expanded,
}

/// A codec bound to a field number, with its repetition and presence policy.
#[derive(Clone, Debug)]
pub struct FieldSchema {
    tag: u32,
    codec: Codec,
    repetition: Repetition,
    required: bool,
}

impl FieldSchema {
    /// Binds `codec` to field number `tag`.
    ///
    /// # Panics
    ///
    /// Panics if `tag` is zero or larger than `2^29 - 1`.
    pub fn new(tag: u32, codec: Codec) -> FieldSchema {
        assert!(
            (MIN_TAG..=MAX_TAG).contains(&tag),
            "field tag out of range: {}",
            tag
        );
        FieldSchema {
            tag,
            codec,
            repetition: Repetition::Single,
            required: false,
        }
    }

    fn with_repetition(tag: u32, codec: Codec, repetition: Repetition) -> FieldSchema {
        let mut schema = FieldSchema::new(tag, codec);
        schema.repetition = repetition;
        schema
    }

    /// Marks the field repeated. Numeric wire types are packed.
    pub fn repeated(mut self) -> FieldSchema {
        self.repetition = Repetition::Repeated;
        self
    }

    /// Marks the field repeated with one tagged element per value.
    pub fn expanded(mut self) -> FieldSchema {
        self.repetition = Repetition::Expanded;
        self
    }

    /// Requires the field to be present after decoding: absent fields are
    /// populated with the codec default. The wire format carries no required
    /// bit, so encoding is unaffected.
    pub fn required(mut self) -> FieldSchema {
        self.required = true;
        self
    }

    /// Wraps the field's codec with a bijective value mapping. See
    /// [`Codec::transform`].
    pub fn transform<E, D>(mut self, encode: E, decode: D, default: Value) -> FieldSchema
    where
        E: Fn(&Value) -> Result<Value, EncodeError> + Send + Sync + 'static,
        D: Fn(Value) -> Result<Value, DecodeError> + Send + Sync + 'static,
    {
        self.codec = self.codec.transform(encode, decode, default);
        self
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn repetition(&self) -> Repetition {
        self.repetition
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub(crate) fn encode_mode(&self) -> EncodeMode {
        match self.repetition {
            Repetition::Single => EncodeMode::Single,
            Repetition::Expanded => EncodeMode::Expanded,
            Repetition::Repeated => match self.codec.wire_type() {
                WireType::Varint | WireType::ThirtyTwoBit | WireType::SixtyFourBit => {
                    EncodeMode::Packed
                }
                _ => EncodeMode::Expanded,
            },
        }
    }

    /// The value a decoder materializes when the field is absent.
    pub(crate) fn default_value(&self) -> Value {
        match self.repetition {
            Repetition::Single => self.codec.default_value(),
            Repetition::Repeated | Repetition::Expanded => Value::List(Vec::new()),
        }
    }

    /// A scalar supplied for a repeated field counts as a one-element list,
    /// symmetric with the decode post-pass.
    fn items<'v>(&self, value: &'v Value) -> &'v [Value] {
        match value {
            Value::List(items) => items,
            other => std::slice::from_ref(other),
        }
    }

    /// Writes the field for a non-default value, headers included.
    pub(crate) fn encode(&self, value: &Value, buf: &mut WireBuffer<'_>) -> Result<(), EncodeError> {
        match self.encode_mode() {
            EncodeMode::Single => {
                buf.put_key(self.tag, self.codec.wire_type())?;
                self.codec.encode(value, buf)
            }
            EncodeMode::Packed => {
                let items = self.items(value);
                if items.is_empty() {
                    return Ok(());
                }
                let len = self.packed_payload_len(items)?;
                buf.put_key(self.tag, WireType::LengthDelimited)?;
                buf.put_varint(len as u64)?;
                for item in items {
                    self.codec.encode(item, buf)?;
                }
                Ok(())
            }
            EncodeMode::Expanded => {
                for item in self.items(value) {
                    buf.put_key(self.tag, self.codec.wire_type())?;
                    self.codec.encode(item, buf)?;
                }
                Ok(())
            }
        }
    }

    fn packed_payload_len(&self, items: &[Value]) -> Result<usize, EncodeError> {
        let mut len = 0;
        for item in items {
            len += self.codec.encoded_len(item)?;
        }
        Ok(len)
    }

    /// Exact number of bytes `encode` will produce, headers included.
    pub(crate) fn encoded_len(&self, value: &Value) -> Result<usize, EncodeError> {
        match self.encode_mode() {
            EncodeMode::Single => Ok(key_len(self.tag) + self.codec.encoded_len(value)?),
            EncodeMode::Packed => {
                let items = self.items(value);
                if items.is_empty() {
                    return Ok(0);
                }
                let len = self.packed_payload_len(items)?;
                Ok(key_len(self.tag) + encoded_len_varint(len as u64) + len)
            }
            EncodeMode::Expanded => {
                let mut total = 0;
                for item in self.items(value) {
                    total += key_len(self.tag) + self.codec.encoded_len(item)?;
                }
                Ok(total)
            }
        }
    }
}

macro_rules! field_ctors {
    ($repetition:expr) => {
        /// A `bool` field.
        pub fn bool(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Bool, $repetition)
        }

        /// An `int32` field.
        pub fn int32(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Int32, $repetition)
        }

        /// An `int64` field.
        pub fn int64(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Int64, $repetition)
        }

        /// A `uint32` field.
        pub fn uint32(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Uint32, $repetition)
        }

        /// A `uint64` field.
        pub fn uint64(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Uint64, $repetition)
        }

        /// A zigzag-encoded `sint32` field.
        pub fn sint32(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Sint32, $repetition)
        }

        /// A zigzag-encoded `sint64` field.
        pub fn sint64(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Sint64, $repetition)
        }

        /// A `fixed32` field.
        pub fn fixed32(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Fixed32, $repetition)
        }

        /// A `fixed64` field.
        pub fn fixed64(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Fixed64, $repetition)
        }

        /// An `sfixed32` field.
        pub fn sfixed32(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Sfixed32, $repetition)
        }

        /// An `sfixed64` field.
        pub fn sfixed64(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Sfixed64, $repetition)
        }

        /// A `float` field.
        pub fn float(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Float, $repetition)
        }

        /// A `double` field.
        pub fn double(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Double, $repetition)
        }

        /// An open enumeration field.
        pub fn enumeration(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Enum, $repetition)
        }

        /// A UTF-8 string field.
        pub fn string(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::String, $repetition)
        }

        /// A raw bytes field.
        pub fn bytes(tag: u32) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Bytes, $repetition)
        }

        /// A nested message field.
        pub fn submessage(tag: u32, codec: impl Into<Arc<MessageCodec>>) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Message(codec.into()), $repetition)
        }

        /// A nested message field referring to a schema still under
        /// construction, for recursive message types built with
        /// `Arc::new_cyclic`.
        pub fn submessage_ref(tag: u32, codec: Weak<MessageCodec>) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::MessageRef(codec), $repetition)
        }

        /// A JSON document field with the given transport encoding.
        pub fn json(tag: u32, encoding: JsonEncoding) -> FieldSchema {
            FieldSchema::with_repetition(tag, Codec::Json(encoding), $repetition)
        }
    };
}

field_ctors!(Repetition::Single);

/// Constructors for repeated fields. Numeric wire types are packed into a
/// single length-delimited block.
pub mod repeated {
    use super::*;

    field_ctors!(Repetition::Repeated);

    /// Constructors for repeated fields encoded one tagged element per
    /// value. This is the only layout for length-delimited codecs.
    pub mod expanded {
        use super::*;

        field_ctors!(Repetition::Expanded);
    }
}

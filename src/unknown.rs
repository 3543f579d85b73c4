//! Preservation of fields that are not part of the receiver's schema.

use bytes::Bytes;

use crate::buffer::WireBuffer;
use crate::encoding::{encoded_len_varint, key_len, WireType};
use crate::{DecodeError, EncodeError};

/// A single field value whose tag was not recognized during decoding.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnknownField {
    /// An unknown field with the `Varint` wire type.
    Varint(u64),
    /// An unknown field with the `SixtyFourBit` wire type.
    SixtyFourBit(u64),
    /// An unknown field with the `LengthDelimited` wire type.
    LengthDelimited(Bytes),
    /// An unknown field with the `ThirtyTwoBit` wire type.
    ThirtyTwoBit(u32),
}

impl UnknownField {
    /// The wire type this value round-trips with.
    pub fn wire_type(&self) -> WireType {
        match self {
            UnknownField::Varint(_) => WireType::Varint,
            UnknownField::SixtyFourBit(_) => WireType::SixtyFourBit,
            UnknownField::LengthDelimited(_) => WireType::LengthDelimited,
            UnknownField::ThirtyTwoBit(_) => WireType::ThirtyTwoBit,
        }
    }
}

/// Unknown fields of a message, in the order they appeared on the wire.
///
/// Re-encoding a decoded message emits these verbatim after the declared
/// fields, which keeps unrecognized data intact across a decode/encode
/// cycle as the Protobuf spec requires. The order is stable but not
/// canonical.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct UnknownFieldList {
    fields: Vec<(u32, UnknownField)>,
}

impl UnknownFieldList {
    /// Creates an empty `UnknownFieldList`.
    pub fn new() -> UnknownFieldList {
        UnknownFieldList::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn push(&mut self, tag: u32, field: UnknownField) {
        self.fields.push((tag, field));
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Iterates the fields in the order they were recorded.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &UnknownField)> {
        self.fields.iter().map(|(tag, field)| (*tag, field))
    }

    /// Appends every field of `other`, keeping this list's order first.
    pub(crate) fn absorb(&mut self, other: UnknownFieldList) {
        self.fields.extend(other.fields);
    }

    /// Reads one value of the given wire type from the buffer and records
    /// it. Group wire types fail rather than guess at framing.
    pub(crate) fn read_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut WireBuffer<'_>,
    ) -> Result<(), DecodeError> {
        let field = match wire_type {
            WireType::Varint => UnknownField::Varint(buf.get_varint()?),
            WireType::SixtyFourBit => UnknownField::SixtyFourBit(buf.get_u64_le()?),
            WireType::LengthDelimited => {
                UnknownField::LengthDelimited(buf.get_length_delimited()?)
            }
            WireType::ThirtyTwoBit => UnknownField::ThirtyTwoBit(buf.get_u32_le()?),
            WireType::StartGroup | WireType::EndGroup => {
                return Err(DecodeError::new("group wire types are not supported"));
            }
        };
        self.fields.push((tag, field));
        Ok(())
    }

    /// Re-emits every recorded field, headers included.
    pub(crate) fn encode(&self, buf: &mut WireBuffer<'_>) -> Result<(), EncodeError> {
        for (tag, field) in self.iter() {
            match field {
                UnknownField::Varint(value) => {
                    buf.put_key(tag, WireType::Varint)?;
                    buf.put_varint(*value)?;
                }
                UnknownField::SixtyFourBit(value) => {
                    buf.put_key(tag, WireType::SixtyFourBit)?;
                    buf.put_u64_le(*value)?;
                }
                UnknownField::LengthDelimited(value) => {
                    buf.put_key(tag, WireType::LengthDelimited)?;
                    buf.put_length_delimited(value)?;
                }
                UnknownField::ThirtyTwoBit(value) => {
                    buf.put_key(tag, WireType::ThirtyTwoBit)?;
                    buf.put_u32_le(*value)?;
                }
            }
        }
        Ok(())
    }

    /// Exact number of bytes `encode` will produce.
    pub(crate) fn encoded_len(&self) -> usize {
        self.iter()
            .map(|(tag, field)| {
                key_len(tag)
                    + match field {
                        UnknownField::Varint(value) => encoded_len_varint(*value),
                        UnknownField::SixtyFourBit(_) => 8,
                        UnknownField::LengthDelimited(value) => {
                            encoded_len_varint(value.len() as u64) + value.len()
                        }
                        UnknownField::ThirtyTwoBit(_) => 4,
                    }
            })
            .sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip_preserves_order() {
        let mut input = WireBuffer::new();
        input.put_key(3, WireType::Varint).unwrap();
        input.put_varint(300).unwrap();
        input.put_key(1, WireType::LengthDelimited).unwrap();
        input.put_length_delimited(b"hi").unwrap();
        input.put_key(2, WireType::ThirtyTwoBit).unwrap();
        input.put_u32_le(7).unwrap();

        let mut list = UnknownFieldList::new();
        input.seek(0).unwrap();
        while input.has_remaining() {
            let (tag, wire_type) = input.get_key().unwrap();
            list.read_field(tag, wire_type, &mut input).unwrap();
        }

        let tags: Vec<u32> = list.iter().map(|(tag, _)| tag).collect();
        assert_eq!(tags, [3, 1, 2]);

        let mut output = WireBuffer::new();
        list.encode(&mut output).unwrap();
        assert_eq!(output.written_bytes(), input.written_bytes());
        assert_eq!(list.encoded_len(), input.len());
    }

    #[test]
    fn groups_are_rejected() {
        let mut list = UnknownFieldList::new();
        let mut buf = WireBuffer::from_slice(&[]);
        list.read_field(1, WireType::StartGroup, &mut buf)
            .expect_err("group accepted");
    }
}

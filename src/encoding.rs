//! Wire-format constants and stateless encoding primitives.

use crate::DecodeError;
use crate::EncodeError;

/// The smallest valid field tag.
pub const MIN_TAG: u32 = 1;
/// The largest valid field tag.
pub const MAX_TAG: u32 = (1 << 29) - 1;

/// Represents the wire type for protobuf encoding.
///
/// The integer value is equivalent with the encoded value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    SixtyFourBit = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    ThirtyTwoBit = 5,
}

impl WireType {
    /// Whether this is one of the deprecated group framing types.
    ///
    /// Groups are recognized on the wire but rejected by every codec
    /// operation.
    pub fn is_group(self) -> bool {
        matches!(self, WireType::StartGroup | WireType::EndGroup)
    }
}

impl TryFrom<u64> for WireType {
    type Error = DecodeError;

    #[inline]
    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::SixtyFourBit),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::ThirtyTwoBit),
            _ => Err(DecodeError::new(format!(
                "invalid wire type value: {}",
                value
            ))),
        }
    }
}

/// Checks that the expected wire type matches the actual wire type,
/// or returns an error result.
#[inline]
pub fn check_wire_type(expected: WireType, actual: WireType) -> Result<(), DecodeError> {
    if expected != actual {
        return Err(DecodeError::new(format!(
            "invalid wire type: {:?} (expected {:?})",
            actual, expected
        )));
    }
    Ok(())
}

/// Returns the encoded length of the value in LEB128 variable length format.
/// The returned value will be between 1 and 10, inclusive.
#[inline]
pub fn encoded_len_varint(value: u64) -> usize {
    // Based on [VarintSize64][1].
    // [1]: https://github.com/google/protobuf/blob/3.3.x/src/google/protobuf/io/coded_stream.h#L1301-L1309
    ((((value | 1).leading_zeros() ^ 63) * 9 + 73) / 64) as usize
}

/// Maps a signed integer onto an unsigned one so that values of small
/// magnitude stay small on the wire.
#[inline]
pub fn encode_zigzag64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`encode_zigzag64`].
#[inline]
pub fn decode_zigzag64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ (-((value & 1) as i64))
}

/// Returns the encoded length of the value in zigzag varint format.
#[inline]
pub fn encoded_len_zigzag64(value: i64) -> usize {
    encoded_len_varint(encode_zigzag64(value))
}

/// Returns the width of an encoded Protobuf field key with the given tag.
/// The returned width will be between 1 and 5 bytes (inclusive).
#[inline]
pub fn key_len(tag: u32) -> usize {
    encoded_len_varint(u64::from(tag << 3))
}

/// Returns the payload length of a packed block of raw values for the given
/// element wire type. Length-delimited and group values cannot be packed.
pub fn packed_len(wire_type: WireType, values: &[u64]) -> Result<usize, EncodeError> {
    match wire_type {
        WireType::Varint => Ok(values.iter().copied().map(encoded_len_varint).sum()),
        WireType::ThirtyTwoBit => Ok(values.len() * 4),
        WireType::SixtyFourBit => Ok(values.len() * 8),
        WireType::LengthDelimited | WireType::StartGroup | WireType::EndGroup => Err(
            EncodeError::new("length-delimited and group values cannot be packed"),
        ),
    }
}

/// Additional information passed to every decode function.
///
/// The context should be passed by value and can be freely cloned. When
/// passing to a function which is decoding a nested object, then use
/// `enter_recursion`.
#[derive(Clone, Debug)]
pub struct DecodeContext {
    /// How many times we can recurse in the current decode stack before we
    /// hit the recursion limit.
    recurse_count: u32,
}

impl Default for DecodeContext {
    #[inline]
    fn default() -> DecodeContext {
        DecodeContext {
            recurse_count: crate::RECURSION_LIMIT,
        }
    }
}

impl DecodeContext {
    /// Call this function before recursively decoding.
    ///
    /// There is no `exit` function since this function creates a new
    /// `DecodeContext` to be used at the next level of recursion. Continue to
    /// use the old context at the previous level of recursion.
    #[inline]
    pub(crate) fn enter_recursion(&self) -> DecodeContext {
        DecodeContext {
            recurse_count: self.recurse_count - 1,
        }
    }

    /// Checks whether the recursion limit has been reached in the stack of
    /// decodes described by this `DecodeContext`.
    ///
    /// Returns `Ok(())` if it is ok to continue recursing.
    /// Returns `Err(DecodeError)` if the recursion limit has been reached.
    #[inline]
    pub(crate) fn limit_reached(&self) -> Result<(), DecodeError> {
        if self.recurse_count == 0 {
            Err(DecodeError::new("recursion limit reached"))
        } else {
            Ok(())
        }
    }
}

//! A seekable byte buffer speaking the Protobuf wire primitives.

use std::cmp;
use std::fmt;

use bytes::Bytes;

use crate::encoding::{decode_zigzag64, encode_zigzag64, WireType, MAX_TAG, MIN_TAG};
use crate::{DecodeError, EncodeError};

/// Maximum length of a length-delimited payload.
const MAX_PAYLOAD_LEN: u64 = u32::MAX as u64;

/// A byte region with a read/write cursor that understands every Protobuf
/// wire primitive: varints, zigzag varints, fixed-width scalars, and
/// length-delimited payloads.
///
/// The buffer either owns growable heap storage or borrows a fixed-capacity
/// region. Three positions describe its state: the cursor (`tell`), the
/// high-watermark of bytes written (`len`), and the region size
/// (`capacity`). Reads stop at the watermark; writes past the capacity grow
/// owned storage and fail on borrowed regions.
pub struct WireBuffer<'a> {
    region: Region<'a>,
    offset: usize,
    written: usize,
}

enum Region<'a> {
    /// Heap-backed storage, grown on demand.
    Owned(Vec<u8>),
    /// A borrowed writable region of fixed capacity.
    Slice(&'a mut [u8]),
    /// A borrowed read-only region; writes fail.
    Shared(&'a [u8]),
}

impl Region<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Region::Owned(vec) => vec,
            Region::Slice(slice) => slice,
            Region::Shared(slice) => slice,
        }
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }
}

impl WireBuffer<'static> {
    /// Creates an empty growable buffer.
    pub fn new() -> WireBuffer<'static> {
        WireBuffer::from_vec(Vec::new())
    }

    /// Creates a growable buffer with `capacity` zeroed bytes preallocated.
    pub fn with_capacity(capacity: usize) -> WireBuffer<'static> {
        WireBuffer {
            region: Region::Owned(vec![0; capacity]),
            offset: 0,
            written: 0,
        }
    }

    /// Creates a growable buffer over an existing payload. The whole vector
    /// is readable.
    pub fn from_vec(bytes: Vec<u8>) -> WireBuffer<'static> {
        let written = bytes.len();
        WireBuffer {
            region: Region::Owned(bytes),
            offset: 0,
            written,
        }
    }

    /// Parses a lowercase or uppercase hex string into an owned buffer.
    pub fn from_hex(hex: &str) -> Result<WireBuffer<'static>, DecodeError> {
        let bytes = hex::decode(hex)
            .map_err(|error| DecodeError::new(format!("invalid hex input: {}", error)))?;
        Ok(WireBuffer::from_vec(bytes))
    }
}

impl Default for WireBuffer<'static> {
    fn default() -> WireBuffer<'static> {
        WireBuffer::new()
    }
}

impl<'a> WireBuffer<'a> {
    /// Creates a read-only buffer over a borrowed payload. Any write fails
    /// with a capacity error.
    pub fn from_slice(bytes: &'a [u8]) -> WireBuffer<'a> {
        WireBuffer {
            written: bytes.len(),
            region: Region::Shared(bytes),
            offset: 0,
        }
    }

    /// Creates a fixed-capacity writable buffer over a borrowed region.
    /// Writes past the end of the region fail instead of growing.
    pub fn from_mut_slice(bytes: &'a mut [u8]) -> WireBuffer<'a> {
        WireBuffer {
            region: Region::Slice(bytes),
            offset: 0,
            written: 0,
        }
    }

    /// Returns the current cursor position.
    pub fn tell(&self) -> usize {
        self.offset
    }

    /// Moves the cursor. Seeking past the end of the region is an error.
    pub fn seek(&mut self, offset: usize) -> Result<(), DecodeError> {
        if offset > self.capacity() {
            return Err(DecodeError::new(format!(
                "seek out of bounds: {} > {}",
                offset,
                self.capacity()
            )));
        }
        self.offset = offset;
        Ok(())
    }

    /// Total size of the underlying region, including unwritten capacity.
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// High-watermark of bytes written to (or initially supplied in) the
    /// buffer.
    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Readable bytes left between the cursor and the written watermark.
    pub fn remaining(&self) -> usize {
        self.written.saturating_sub(self.offset)
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// The entire underlying region, including unwritten capacity.
    pub fn bytes(&self) -> &[u8] {
        self.region.as_slice()
    }

    /// The payload written so far.
    pub fn written_bytes(&self) -> &[u8] {
        &self.region.as_slice()[..self.written]
    }

    /// Lowercase hex rendition of the written payload.
    pub fn to_hex(&self) -> String {
        hex::encode(self.written_bytes())
    }

    /// Consumes the buffer, shrinking its capacity to the written payload.
    pub fn to_shrunk(self) -> WireBuffer<'a> {
        let written = self.written;
        let region = match self.region {
            Region::Owned(mut vec) => {
                vec.truncate(written);
                Region::Owned(vec)
            }
            Region::Slice(slice) => {
                let (head, _) = slice.split_at_mut(written);
                Region::Slice(head)
            }
            Region::Shared(slice) => Region::Shared(&slice[..written]),
        };
        WireBuffer {
            region,
            offset: cmp::min(self.offset, written),
            written,
        }
    }

    /// Produces a sub-buffer over the next `len` readable bytes and advances
    /// this buffer past them. The sub-buffer has capacity `len` and is
    /// independently seekable.
    pub fn slice(&mut self, len: usize) -> Result<WireBuffer<'_>, DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::new("buffer underflow"));
        }
        let start = self.offset;
        self.offset += len;
        let region = match &mut self.region {
            Region::Owned(vec) => Region::Slice(&mut vec[start..start + len]),
            Region::Slice(slice) => Region::Slice(&mut slice[start..start + len]),
            Region::Shared(slice) => Region::Shared(&slice[start..start + len]),
        };
        Ok(WireBuffer {
            region,
            offset: 0,
            written: len,
        })
    }

    /// Makes room for `additional` bytes at the cursor, growing owned
    /// storage as needed. Fixed-capacity regions fail instead.
    fn ensure_capacity(&mut self, additional: usize) -> Result<(), EncodeError> {
        let required = self
            .offset
            .checked_add(additional)
            .ok_or_else(|| EncodeError::new("write length overflows usize"))?;
        match &mut self.region {
            Region::Owned(vec) => {
                if required > vec.len() {
                    let grown = cmp::max(required, vec.len() * 2);
                    vec.resize(grown, 0);
                }
                Ok(())
            }
            Region::Slice(slice) => {
                if required > slice.len() {
                    Err(EncodeError::insufficient_capacity(required, slice.len()))
                } else {
                    Ok(())
                }
            }
            Region::Shared(_) => Err(EncodeError::new("cannot write into a read-only buffer")),
        }
    }

    /// The region about to be overwritten by a `len`-byte write.
    fn writable(&mut self, len: usize) -> Result<&mut [u8], EncodeError> {
        self.ensure_capacity(len)?;
        let start = self.offset;
        match &mut self.region {
            Region::Owned(vec) => Ok(&mut vec[start..start + len]),
            Region::Slice(slice) => Ok(&mut slice[start..start + len]),
            Region::Shared(_) => Err(EncodeError::new("cannot write into a read-only buffer")),
        }
    }

    fn advance_written(&mut self, len: usize) {
        self.offset += len;
        self.written = cmp::max(self.written, self.offset);
    }

    /// Writes raw bytes at the cursor.
    pub fn put_slice(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        self.writable(bytes.len())?.copy_from_slice(bytes);
        self.advance_written(bytes.len());
        Ok(())
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), EncodeError> {
        self.put_slice(&[value])
    }

    /// Encodes an integer into LEB128 variable length format and writes it
    /// at the cursor. Negative values reinterpreted as `u64` always occupy
    /// ten bytes.
    pub fn put_varint(&mut self, mut value: u64) -> Result<(), EncodeError> {
        // Varints are never more than 10 bytes.
        let mut scratch = [0u8; 10];
        let mut len = 0;
        for byte in &mut scratch {
            len += 1;
            if value < 0x80 {
                *byte = value as u8;
                break;
            }
            *byte = ((value & 0x7F) | 0x80) as u8;
            value >>= 7;
        }
        self.put_slice(&scratch[..len])
    }

    /// Writes a zigzag-mapped signed integer as a varint.
    pub fn put_zigzag(&mut self, value: i64) -> Result<(), EncodeError> {
        self.put_varint(encode_zigzag64(value))
    }

    /// Writes a length-delimited payload: a varint length followed by the
    /// raw bytes. Payloads longer than `2^32 - 1` bytes fail.
    pub fn put_length_delimited(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        if bytes.len() as u64 > MAX_PAYLOAD_LEN {
            return Err(EncodeError::new(
                "length-delimited payload exceeds 2^32 - 1 bytes",
            ));
        }
        self.put_varint(bytes.len() as u64)?;
        self.put_slice(bytes)
    }

    /// Writes a length-delimited UTF-8 string.
    pub fn put_string(&mut self, value: &str) -> Result<(), EncodeError> {
        self.put_length_delimited(value.as_bytes())
    }

    /// Writes a Protobuf field key, which consists of a wire type designator
    /// and the field tag.
    pub fn put_key(&mut self, tag: u32, wire_type: WireType) -> Result<(), EncodeError> {
        if !(MIN_TAG..=MAX_TAG).contains(&tag) {
            return Err(EncodeError::new(format!("field tag out of range: {}", tag)));
        }
        let key = (tag << 3) | wire_type as u32;
        self.put_varint(u64::from(key))
    }

    /// The bytes between the cursor and the written watermark.
    fn readable(&self) -> &[u8] {
        &self.region.as_slice()[self.offset..cmp::max(self.written, self.offset)]
    }

    fn read_exact(&mut self, len: usize) -> Result<&[u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::new("buffer underflow"));
        }
        let start = self.offset;
        self.offset += len;
        Ok(&self.region.as_slice()[start..start + len])
    }

    pub fn get_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_exact(1)?[0])
    }

    /// Decodes a LEB128-encoded variable length integer at the cursor.
    pub fn get_varint(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.readable();
        let mut value = 0u64;
        for (count, &byte) in bytes.iter().take(10).enumerate() {
            value |= u64::from(byte & 0x7F) << (count * 7);
            if byte <= 0x7F {
                // The tenth byte may only contribute a single bit.
                if count == 9 && byte >= 0x02 {
                    return Err(DecodeError::new("invalid varint"));
                }
                self.offset += count + 1;
                return Ok(value);
            }
        }
        if bytes.len() < 10 {
            Err(DecodeError::new("buffer underflow"))
        } else {
            Err(DecodeError::new("invalid varint"))
        }
    }

    /// Reads a zigzag-mapped signed integer.
    pub fn get_zigzag(&mut self) -> Result<i64, DecodeError> {
        Ok(decode_zigzag64(self.get_varint()?))
    }

    /// Reads a length-delimited payload: a varint length followed by that
    /// many raw bytes.
    pub fn get_length_delimited(&mut self) -> Result<Bytes, DecodeError> {
        let len = self.get_varint()?;
        if len > self.remaining() as u64 {
            return Err(DecodeError::new("buffer underflow"));
        }
        Ok(Bytes::copy_from_slice(self.read_exact(len as usize)?))
    }

    /// Reads a length-delimited UTF-8 string.
    pub fn get_string(&mut self) -> Result<String, DecodeError> {
        let bytes = self.get_length_delimited()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| DecodeError::new("invalid string value: data is not UTF-8 encoded"))
    }

    /// Decodes a Protobuf field key, which consists of a wire type
    /// designator and the field tag.
    pub fn get_key(&mut self) -> Result<(u32, WireType), DecodeError> {
        let key = self.get_varint()?;
        if key > u64::from(u32::MAX) {
            return Err(DecodeError::new(format!("invalid key value: {}", key)));
        }
        let wire_type = WireType::try_from(key & 0x07)?;
        let tag = (key >> 3) as u32;
        if tag < MIN_TAG {
            return Err(DecodeError::new("invalid tag value: 0"));
        }
        Ok((tag, wire_type))
    }
}

macro_rules! fixed_width {
    ($ty:ty, $width:expr, $put:ident, $get:ident) => {
        impl WireBuffer<'_> {
            #[doc = concat!("Writes a little-endian `", stringify!($ty), "` at the cursor.")]
            pub fn $put(&mut self, value: $ty) -> Result<(), EncodeError> {
                self.put_slice(&value.to_le_bytes())
            }

            #[doc = concat!("Reads a little-endian `", stringify!($ty), "` at the cursor.")]
            pub fn $get(&mut self) -> Result<$ty, DecodeError> {
                let mut bytes = [0u8; $width];
                bytes.copy_from_slice(self.read_exact($width)?);
                Ok(<$ty>::from_le_bytes(bytes))
            }
        }
    };
}

fixed_width!(u32, 4, put_u32_le, get_u32_le);
fixed_width!(i32, 4, put_i32_le, get_i32_le);
fixed_width!(u64, 8, put_u64_le, get_u64_le);
fixed_width!(i64, 8, put_i64_le, get_i64_le);
fixed_width!(f32, 4, put_f32_le, get_f32_le);
fixed_width!(f64, 8, put_f64_le, get_f64_le);

impl fmt::Debug for WireBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireBuffer")
            .field("offset", &self.offset)
            .field("written", &self.written)
            .field("capacity", &self.capacity())
            .finish()
    }
}

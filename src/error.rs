//! Protobuf encoding and decoding errors.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;

/// A Protobuf message decoding error.
///
/// `DecodeError` indicates that the input buffer does not contain a valid
/// Protobuf message. The error details should be considered 'best effort': in
/// general it is not possible to exactly pinpoint why data is malformed.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodeError {
    inner: Box<Inner>,
}

#[derive(Clone, PartialEq, Eq)]
struct Inner {
    /// A 'best effort' root cause description.
    description: Cow<'static, str>,
    /// A stack of field names, innermost first, leading to the failure.
    stack: Vec<String>,
}

impl DecodeError {
    /// Creates a new `DecodeError` with a 'best effort' root cause
    /// description.
    ///
    /// Boxed to keep `Result<T, DecodeError>` small on the happy path.
    #[cold]
    pub fn new(description: impl Into<Cow<'static, str>>) -> DecodeError {
        DecodeError {
            inner: Box::new(Inner {
                description: description.into(),
                stack: Vec::new(),
            }),
        }
    }

    /// Pushes the name of the field that was being decoded when the error
    /// occurred.
    pub fn push(&mut self, field: &str) {
        self.inner.stack.push(field.to_string());
    }
}

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeError")
            .field("description", &self.inner.description)
            .field("stack", &self.inner.stack)
            .finish()
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to decode Protobuf message: ")?;
        for field in self.inner.stack.iter().rev() {
            write!(f, "{}: ", field)?;
        }
        f.write_str(&self.inner.description)
    }
}

impl Error for DecodeError {}

impl From<DecodeError> for std::io::Error {
    fn from(error: DecodeError) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::InvalidData, error)
    }
}

/// A Protobuf message encoding error.
///
/// Encoding fails when a value does not fit its codec (wrong dynamic type,
/// oversized payload, unregistered variant) or when a fixed-capacity buffer
/// runs out of room.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodeError {
    description: Cow<'static, str>,
}

impl EncodeError {
    /// Creates a new `EncodeError`.
    #[cold]
    pub fn new(description: impl Into<Cow<'static, str>>) -> EncodeError {
        EncodeError {
            description: description.into(),
        }
    }

    /// Creates an error for a write that would exceed a fixed-capacity
    /// buffer.
    #[cold]
    pub(crate) fn insufficient_capacity(required: usize, remaining: usize) -> EncodeError {
        EncodeError::new(format!(
            "insufficient buffer capacity (required: {}, remaining: {})",
            required, remaining
        ))
    }
}

impl fmt::Debug for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodeError")
            .field("description", &self.description)
            .finish()
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to encode Protobuf message: {}", self.description)
    }
}

impl Error for EncodeError {}

impl From<EncodeError> for std::io::Error {
    fn from(error: EncodeError) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, error)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_error_push() {
        let mut error = DecodeError::new("invalid varint");
        error.push("value");
        error.push("inner");
        assert_eq!(
            error.to_string(),
            "failed to decode Protobuf message: inner: value: invalid varint"
        );
    }

    #[test]
    fn into_std_io_error() {
        let error = std::io::Error::from(DecodeError::new("buffer underflow"));
        assert_eq!(error.kind(), std::io::ErrorKind::InvalidData);

        let error = std::io::Error::from(EncodeError::new("payload too long"));
        assert_eq!(error.kind(), std::io::ErrorKind::InvalidInput);
    }
}

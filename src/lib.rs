//! A schema-driven Protocol Buffers codec.
//!
//! `schemabuf` encodes and decodes the Protobuf wire format from message
//! schemas declared at runtime, with no `.proto` files and no code
//! generation. A schema binds [`Codec`]s to numbered fields; the same
//! declaration drives encoding, decoding, and exact length prediction.
//!
//! ```
//! use schemabuf::{message, schema, MessageValue, Value};
//!
//! let codec = message([
//!     ("flag", schema::bool(1)),
//!     ("count", schema::int32(2)),
//!     ("values", schema::repeated::int32(3)),
//! ]);
//!
//! let value = Value::Message(
//!     MessageValue::new()
//!         .with("flag", true)
//!         .with("values", Value::list([1, 2, 3])),
//! );
//!
//! // `count` holds its default and is elided from the output.
//! let encoded = codec.encode(&value).unwrap();
//! assert_eq!(encoded.written_bytes(), b"\x08\x01\x1a\x03\x01\x02\x03");
//!
//! let decoded = codec.decode(encoded.written_bytes()).unwrap();
//! let decoded = decoded.as_message().unwrap();
//! assert_eq!(decoded.get("count"), Some(&Value::Int32(0)));
//! ```
//!
//! Fields whose tags are not declared by the schema survive a decode/encode
//! cycle untouched, repeated numeric fields pack by default, and codecs can
//! be wrapped with bijective [`Transform`]s that change the value domain
//! without touching the wire bytes.

mod buffer;
mod codec;
mod error;
mod json;
mod message;
mod unknown;
mod value;
mod variant;

pub mod encoding;
pub mod schema;

pub use crate::buffer::WireBuffer;
pub use crate::codec::{Codec, Transform};
pub use crate::encoding::WireType;
pub use crate::error::{DecodeError, EncodeError};
pub use crate::json::JsonEncoding;
pub use crate::message::{message, MessageCodec};
pub use crate::schema::{FieldSchema, Repetition};
pub use crate::unknown::{UnknownField, UnknownFieldList};
pub use crate::value::{MessageValue, Value};
pub use crate::variant::variants;

// 100 is the default recursion limit in the C++ implementation.
const RECURSION_LIMIT: u32 = 100;

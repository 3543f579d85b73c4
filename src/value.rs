//! Dynamic values produced and consumed by schema-driven codecs.

use bytes::Bytes;
use indexmap::IndexMap;

use crate::unknown::UnknownFieldList;
use crate::EncodeError;

/// A single dynamically-typed Protobuf value.
///
/// Schemas are declared at runtime, so encode and decode operate on this
/// enum rather than on generated structs. The integer variants mirror the
/// four signedness/width flavors of the wire format; repeated fields hold a
/// `List`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Bytes),
    Json(serde_json::Value),
    Message(MessageValue),
    List(Vec<Value>),
}

impl Value {
    /// Builds a list value from anything convertible to values.
    pub fn list<I, T>(items: I) -> Value
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Uint32(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageValue> {
        match self {
            Value::Message(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Uint32(_) => "uint32",
            Value::Uint64(_) => "uint64",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Json(_) => "json",
            Value::Message(_) => "message",
            Value::List(_) => "list",
        }
    }

    fn mismatch(&self, expected: &'static str) -> EncodeError {
        EncodeError::new(format!(
            "expected {} value, found {}",
            expected,
            self.kind()
        ))
    }

    pub(crate) fn expect_bool(&self) -> Result<bool, EncodeError> {
        self.as_bool().ok_or_else(|| self.mismatch("bool"))
    }

    pub(crate) fn expect_i32(&self) -> Result<i32, EncodeError> {
        self.as_i32().ok_or_else(|| self.mismatch("int32"))
    }

    pub(crate) fn expect_i64(&self) -> Result<i64, EncodeError> {
        self.as_i64().ok_or_else(|| self.mismatch("int64"))
    }

    pub(crate) fn expect_u32(&self) -> Result<u32, EncodeError> {
        self.as_u32().ok_or_else(|| self.mismatch("uint32"))
    }

    pub(crate) fn expect_u64(&self) -> Result<u64, EncodeError> {
        self.as_u64().ok_or_else(|| self.mismatch("uint64"))
    }

    pub(crate) fn expect_f32(&self) -> Result<f32, EncodeError> {
        self.as_f32().ok_or_else(|| self.mismatch("float"))
    }

    pub(crate) fn expect_f64(&self) -> Result<f64, EncodeError> {
        self.as_f64().ok_or_else(|| self.mismatch("double"))
    }

    pub(crate) fn expect_str(&self) -> Result<&str, EncodeError> {
        self.as_str().ok_or_else(|| self.mismatch("string"))
    }

    pub(crate) fn expect_bytes(&self) -> Result<&[u8], EncodeError> {
        self.as_bytes().ok_or_else(|| self.mismatch("bytes"))
    }

    pub(crate) fn expect_json(&self) -> Result<&serde_json::Value, EncodeError> {
        self.as_json().ok_or_else(|| self.mismatch("json"))
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Value {
                    Value::$variant(value.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    u32 => Uint32,
    u64 => Uint64,
    f32 => Float,
    f64 => Double,
    String => String,
    &str => String,
    Bytes => Bytes,
    Vec<u8> => Bytes,
    serde_json::Value => Json,
    MessageValue => Message,
    Vec<Value> => List,
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Value {
        Value::Bytes(Bytes::copy_from_slice(value))
    }
}

/// A decoded or to-be-encoded message: named fields in schema order, plus
/// the unknown fields carried along for round-tripping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageValue {
    fields: IndexMap<String, Value>,
    unknown: UnknownFieldList,
}

impl MessageValue {
    pub fn new() -> MessageValue {
        MessageValue::default()
    }

    /// Builder-style field assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> MessageValue {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates the fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Fields present on the wire that the schema did not declare.
    pub fn unknown_fields(&self) -> &UnknownFieldList {
        &self.unknown
    }

    pub fn unknown_fields_mut(&mut self) -> &mut UnknownFieldList {
        &mut self.unknown
    }
}

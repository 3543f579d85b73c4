use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;

use schemabuf::{
    message, schema, variants, JsonEncoding, MessageCodec, MessageValue, Value, WireBuffer,
};

fn roundtrip(codec: &MessageCodec, value: &Value) -> Value {
    let encoded = codec.encode(value).expect("encoding failed");
    assert_eq!(
        codec.encoded_len(value).expect("length prediction failed"),
        encoded.len(),
    );
    codec.decode(encoded.written_bytes()).expect("decoding failed")
}

#[test]
fn single_scalar_fields() {
    let codec = message([("answer", schema::int32(1))]);
    let value = Value::Message(MessageValue::new().with("answer", 42));
    assert_eq!(codec.encode(&value).unwrap().written_bytes(), b"\x08\x2a");

    let codec = message([("name", schema::string(2))]);
    let value = Value::Message(MessageValue::new().with("name", "TEST"));
    assert_eq!(
        codec.encode(&value).unwrap().written_bytes(),
        b"\x12\x04TEST"
    );

    let codec = message([("score", schema::float(3))]);
    let value = Value::Message(MessageValue::new().with("score", 150.0f32));
    assert_eq!(
        codec.encode(&value).unwrap().written_bytes(),
        &[0x1D, 0x00, 0x00, 0x16, 0x43]
    );
}

#[test]
fn packed_repeated_int32() {
    let codec = message([("values", schema::repeated::int32(1))]);
    let value = Value::Message(MessageValue::new().with("values", Value::list([1, 2, 3])));

    let encoded = codec.encode(&value).unwrap().to_shrunk();
    assert_eq!(encoded.len(), 5);
    assert_eq!(encoded.written_bytes(), &[0x0A, 0x03, 0x01, 0x02, 0x03]);

    assert_eq!(roundtrip(&codec, &value), value);
}

#[test]
fn default_fields_are_elided() {
    let codec = message([
        ("flag", schema::bool(1)),
        ("count", schema::int32(2)),
        ("values", schema::repeated::int32(3)),
    ]);
    let value = Value::Message(
        MessageValue::new()
            .with("flag", true)
            .with("values", Value::list([1, 2, 3])),
    );

    let encoded = codec.encode(&value).unwrap();
    assert_eq!(encoded.len(), 7);
    assert_eq!(
        encoded.written_bytes(),
        &[0x08, 0x01, 0x1A, 0x03, 0x01, 0x02, 0x03]
    );

    // The elided field comes back as its default.
    let decoded = codec.decode(encoded.written_bytes()).unwrap();
    let decoded = decoded.as_message().unwrap();
    assert_eq!(decoded.get("count"), Some(&Value::Int32(0)));
}

#[test]
fn all_default_message_encodes_to_nothing() {
    let codec = message([
        ("flag", schema::bool(1)),
        ("name", schema::string(2)),
        ("data", schema::bytes(3)),
        ("values", schema::repeated::double(4)),
    ]);
    let encoded = codec.encode(&codec.default_value()).unwrap();
    assert_eq!(encoded.len(), 0);

    let explicit = Value::Message(
        MessageValue::new()
            .with("flag", false)
            .with("name", "")
            .with("values", Value::List(Vec::new())),
    );
    assert_eq!(codec.encode(&explicit).unwrap().len(), 0);
}

#[test]
fn nested_messages() {
    let codec = message([
        ("name", schema::string(1)),
        (
            "sub1",
            schema::submessage(2, message([("value", schema::int32(1))])),
        ),
        (
            "sub2",
            schema::submessage(3, message([("value", schema::int32(2))])),
        ),
    ]);
    let value = Value::Message(
        MessageValue::new()
            .with("name", "hello")
            .with("sub1", MessageValue::new().with("value", 42))
            .with("sub2", MessageValue::new().with("value", 43)),
    );

    let encoded = codec.encode(&value).unwrap().to_shrunk();
    assert_eq!(encoded.len(), 15);
    assert_eq!(
        encoded.written_bytes(),
        b"\x0a\x05hello\x12\x02\x08\x2a\x1a\x02\x10\x2b"
    );

    let decoded = codec.decode(encoded.written_bytes()).unwrap();
    let decoded = decoded.as_message().unwrap();
    let sub1 = decoded.get("sub1").unwrap().as_message().unwrap();
    assert_eq!(sub1.get("value"), Some(&Value::Int32(42)));
}

#[test]
fn packed_and_expanded_decode_identically() {
    let codec = message([("values", schema::repeated::int32(1))]);
    let expanded_codec = message([("values", schema::repeated::expanded::int32(1))]);
    let value = Value::Message(MessageValue::new().with("values", Value::list([1, 2, 300])));

    let packed = codec.encode(&value).unwrap();
    let expanded = expanded_codec.encode(&value).unwrap();
    assert_ne!(packed.written_bytes(), expanded.written_bytes());

    // The decoder never distinguishes the two layouts.
    assert_eq!(
        codec.decode(packed.written_bytes()).unwrap(),
        codec.decode(expanded.written_bytes()).unwrap(),
    );
    assert_eq!(
        expanded_codec.decode(packed.written_bytes()).unwrap(),
        value
    );
}

#[test]
fn packed_zigzag_roundtrip() {
    let codec = message([("values", schema::repeated::sint64(1))]);
    let value = Value::Message(MessageValue::new().with(
        "values",
        Value::list([0i64, -1, 1, i64::MIN, i64::MAX]),
    ));
    assert_eq!(roundtrip(&codec, &value), value);
}

#[test]
fn packed_fixed_width_roundtrip() {
    let codec = message([
        ("floats", schema::repeated::float(1)),
        ("fixeds", schema::repeated::fixed32(2)),
        ("sfixeds", schema::repeated::sfixed64(3)),
    ]);
    let value = Value::Message(
        MessageValue::new()
            .with("floats", Value::list([0.5f32, -1.5, 150.0]))
            .with("fixeds", Value::list([0u32, 1, u32::MAX]))
            .with("sfixeds", Value::list([i64::MIN, 0, i64::MAX])),
    );
    assert_eq!(roundtrip(&codec, &value), value);
}

#[test]
fn unknown_fields_are_preserved_verbatim() {
    let full = message([
        ("a", schema::int32(1)),
        ("b", schema::string(2)),
        ("c", schema::fixed32(3)),
    ]);
    let value = Value::Message(
        MessageValue::new()
            .with("a", 1)
            .with("b", "hi")
            .with("c", 7u32),
    );
    let bytes = full.encode(&value).unwrap();

    // Decode with a narrower schema: `b` and `c` land in the unknowns.
    let narrow = message([("a", schema::int32(1))]);
    let decoded = narrow.decode(bytes.written_bytes()).unwrap();
    let decoded_message = decoded.as_message().unwrap();
    assert_eq!(decoded_message.get("b"), None);
    assert_eq!(decoded_message.unknown_fields().len(), 2);

    // Re-encoding reproduces the original bytes.
    let reencoded = narrow.encode(&decoded).unwrap();
    assert_eq!(reencoded.written_bytes(), bytes.written_bytes());

    // The full schema accepts the re-encoded form.
    assert_eq!(full.decode(reencoded.written_bytes()).unwrap(), value);
}

#[test]
fn required_fields_default_when_absent() {
    let codec = message([
        ("data", schema::bytes(2).required()),
        ("name", schema::string(1).required()),
    ]);
    let decoded = codec.decode(&[]).unwrap();
    let decoded = decoded.as_message().unwrap();
    assert_eq!(decoded.get("data"), Some(&Value::Bytes(Bytes::new())));
    assert_eq!(decoded.get("name"), Some(&Value::String(String::new())));
}

#[test]
fn repeated_field_with_single_wire_value_becomes_list() {
    let codec = message([("values", schema::repeated::int32(1))]);
    let decoded = codec.decode(&[0x08, 0x2A]).unwrap();
    let decoded = decoded.as_message().unwrap();
    assert_eq!(decoded.get("values"), Some(&Value::list([42])));
}

#[test]
fn single_field_with_repeats_fails() {
    let codec = message([("value", schema::int32(1))]);
    let error = codec.decode(&[0x08, 0x01, 0x08, 0x02]).unwrap_err();
    assert!(error.to_string().contains("value"));
}

#[test]
fn group_wire_types_fail() {
    let codec = message([("value", schema::int32(1))]);
    // Field 1 with the SGROUP wire type.
    codec.decode(&[0x0B]).unwrap_err();
    // Field 9 (unknown) with the EGROUP wire type.
    codec.decode(&[0x4C]).unwrap_err();
}

#[test]
fn truncated_input_fails() {
    let codec = message([("name", schema::string(1))]);
    // Declared length runs past the end of the payload.
    codec.decode(&[0x0A, 0x05, 0x68]).unwrap_err();
    // Header with no value.
    codec.decode(&[0x08]).unwrap_err();
}

#[test]
fn field_transforms_compose() {
    let codec = message([(
        "value",
        schema::int32(1)
            .transform(
                |value| Ok(Value::Int32(value.as_i32().unwrap_or_default() + 1)),
                |value| Ok(Value::Int32(value.as_i32().unwrap_or_default() - 1)),
                Value::Int32(0),
            )
            .transform(
                |value| Ok(Value::Int32(value.as_i32().unwrap_or_default() * 2)),
                |value| Ok(Value::Int32(value.as_i32().unwrap_or_default() / 2)),
                Value::Int32(0),
            ),
    )]);

    let value = Value::Message(MessageValue::new().with("value", 5));
    let encoded = codec.encode(&value).unwrap();
    // The mapping added last runs first on encode: (5 * 2) + 1 = 11.
    assert_eq!(encoded.written_bytes(), &[0x08, 0x0B]);
    assert_eq!(codec.decode(encoded.written_bytes()).unwrap(), value);
}

#[test]
fn message_transform_rewrites_values() {
    let codec = message([
        ("id", schema::int32(1)),
        ("name", schema::string(2)),
        ("score", schema::float(3)),
    ])
    .transform(
        |value| {
            let message = value.as_message().expect("message value");
            let name = message.get("name").and_then(Value::as_str).unwrap_or("");
            let score = message
                .get("score")
                .and_then(Value::as_f32)
                .unwrap_or_default();
            Ok(Value::Message(
                MessageValue::new()
                    .with("id", message.get("id").cloned().unwrap_or(Value::Int32(0)))
                    .with("name", name.to_uppercase())
                    .with("score", score * 100.0),
            ))
        },
        |value| {
            let Value::Message(mut message) = value else {
                return Err(schemabuf::DecodeError::new("expected message"));
            };
            let name = message
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_lowercase();
            let score = message
                .get("score")
                .and_then(Value::as_f32)
                .unwrap_or_default();
            message.set("name", name);
            message.set("score", score / 100.0);
            Ok(Value::Message(message))
        },
        Value::Message(MessageValue::new()),
    );

    let value = Value::Message(
        MessageValue::new()
            .with("id", 42)
            .with("name", "test")
            .with("score", 3.14f32),
    );

    let encoded = codec.encode(&value).unwrap().to_shrunk();
    assert_eq!(
        encoded.written_bytes(),
        &[0x08, 0x2A, 0x12, 0x04, 0x54, 0x45, 0x53, 0x54, 0x1D, 0x00, 0x00, 0x9D, 0x43]
    );

    let decoded = codec.decode(encoded.written_bytes()).unwrap();
    assert_eq!(decoded, value);
}

#[test]
fn message_transforms_keep_unknown_fields() {
    // A transform that rebuilds the message from scratch must not lose
    // unknown fields: they are detached before and re-attached after it.
    let codec = message([("a", schema::int32(1))]).transform(
        |value| {
            let a = value
                .as_message()
                .and_then(|m| m.get("a"))
                .cloned()
                .unwrap_or(Value::Int32(0));
            Ok(Value::Message(MessageValue::new().with("a", a)))
        },
        |value| Ok(value),
        Value::Message(MessageValue::new()),
    );

    let bytes = [0x08, 0x01, 0x12, 0x02, 0x68, 0x69];
    let decoded = codec.decode(&bytes).unwrap();
    assert_eq!(
        decoded.as_message().unwrap().unknown_fields().len(),
        1
    );
    let reencoded = codec.encode(&decoded).unwrap();
    assert_eq!(reencoded.written_bytes(), &bytes);
}

#[test]
fn json_codecs_roundtrip() {
    let document = json!({"name": "probe", "port": 8080, "tags": ["a", "b"]});
    for encoding in [JsonEncoding::Raw, JsonEncoding::Base64, JsonEncoding::Hex] {
        let codec = message([("config", schema::json(1, encoding))]);
        let value = Value::Message(MessageValue::new().with("config", document.clone()));
        assert_eq!(roundtrip(&codec, &value), value);
    }
}

#[test]
fn raw_json_bytes() {
    let codec = message([("config", schema::json(1, JsonEncoding::Raw))]);
    let value = Value::Message(MessageValue::new().with("config", json!({"a": 1})));
    let encoded = codec.encode(&value).unwrap();
    assert_eq!(encoded.written_bytes(), b"\x0a\x07{\"a\":1}");

    // The empty object is the codec default and is elided.
    let empty = Value::Message(MessageValue::new().with("config", json!({})));
    assert_eq!(codec.encode(&empty).unwrap().len(), 0);
}

#[test]
fn variants_route_by_discriminator() {
    let circle = message([("radius", schema::int32(1))]);
    let rect = message([("w", schema::int32(1)), ("h", schema::int32(2))]);
    let shape = variants([("circle", 1, circle), ("rect", 2, rect)]);

    let value = Value::Message(
        MessageValue::new()
            .with("type", "rect")
            .with("value", MessageValue::new().with("w", 3).with("h", 4)),
    );
    let encoded = shape.encode(&value).unwrap();
    let decoded = shape.decode(encoded.written_bytes()).unwrap();

    let decoded = decoded.as_message().unwrap();
    assert_eq!(decoded.get("type"), Some(&Value::String("rect".into())));
    let inner = decoded.get("value").unwrap().as_message().unwrap();
    assert_eq!(inner.get("w"), Some(&Value::Int32(3)));
    assert_eq!(inner.get("h"), Some(&Value::Int32(4)));
}

#[test]
fn unregistered_variant_fails_encoding() {
    let shape = variants([("circle", 1, message([("radius", schema::int32(1))]))]);
    let value = Value::Message(
        MessageValue::new()
            .with("type", "triangle")
            .with("value", MessageValue::new()),
    );
    let error = shape.encode(&value).unwrap_err();
    assert!(error.to_string().contains("triangle"));
}

#[test]
fn recursive_schemas_via_weak_references() {
    let tree: Arc<MessageCodec> = Arc::new_cyclic(|weak| {
        message([
            ("label", schema::string(1)),
            (
                "children",
                schema::repeated::expanded::submessage_ref(2, weak.clone()),
            ),
        ])
    });

    let leaf = MessageValue::new()
        .with("label", "leaf")
        .with("children", Value::List(Vec::new()));
    let value = Value::Message(
        MessageValue::new()
            .with("label", "root")
            .with("children", Value::list([leaf])),
    );

    let encoded = tree.encode(&value).unwrap();
    assert_eq!(
        encoded.written_bytes(),
        b"\x0a\x04root\x12\x06\x0a\x04leaf"
    );
    assert_eq!(tree.decode(encoded.written_bytes()).unwrap(), value);
}

#[test]
fn encode_into_fixed_buffer() {
    let codec = message([("answer", schema::int32(1))]);
    let value = Value::Message(MessageValue::new().with("answer", 42));

    let mut backing = [0u8; 16];
    let mut buf = WireBuffer::from_mut_slice(&mut backing);
    codec.encode_into(&value, &mut buf).unwrap();
    assert_eq!(buf.written_bytes(), b"\x08\x2a");

    let mut tiny = [0u8; 1];
    let mut buf = WireBuffer::from_mut_slice(&mut tiny);
    codec.encode_into(&value, &mut buf).unwrap_err();
}

#[test]
fn hex_helpers() {
    let codec = message([("answer", schema::int32(1))]);
    let value = Value::Message(MessageValue::new().with("answer", 42));
    let encoded = codec.encode(&value).unwrap();
    assert_eq!(encoded.to_hex(), "082a");

    let buf = WireBuffer::from_hex("082a").unwrap();
    assert_eq!(codec.decode(buf.written_bytes()).unwrap(), value);
}

#[test]
fn deeply_nested_input_hits_recursion_limit() {
    // Handcraft 120 levels of nesting, past the decoder's limit of 100.
    let mut bytes: Vec<u8> = Vec::new();
    for _ in 0..120 {
        let mut framed = WireBuffer::new();
        framed.put_slice(&[0x0A]).unwrap();
        framed.put_varint(bytes.len() as u64).unwrap();
        framed.put_slice(&bytes).unwrap();
        bytes = framed.written_bytes().to_vec();
    }

    let tree: Arc<MessageCodec> = Arc::new_cyclic(|weak| {
        message([("child", schema::submessage_ref(1, weak.clone()))])
    });
    let error = tree.decode(&bytes).unwrap_err();
    assert!(error.to_string().contains("recursion limit reached"));
}

#[test]
fn enumeration_fields_are_open() {
    let codec = message([("kind", schema::enumeration(1))]);
    let value = Value::Message(MessageValue::new().with("kind", 1000));
    assert_eq!(roundtrip(&codec, &value), value);

    // A value outside any known range still decodes.
    let decoded = codec.decode(&[0x08, 0xFF, 0x01]).unwrap();
    assert_eq!(
        decoded.as_message().unwrap().get("kind"),
        Some(&Value::Int32(255))
    );
}

#[test]
fn negative_int32_takes_ten_bytes() {
    let codec = message([("value", schema::int32(1))]);
    let value = Value::Message(MessageValue::new().with("value", -1));
    let encoded = codec.encode(&value).unwrap();
    assert_eq!(encoded.len(), 11);
    assert_eq!(roundtrip(&codec, &value), value);
}

#[test]
fn strings_and_bytes_roundtrip() {
    let codec = message([
        ("name", schema::string(1)),
        ("data", schema::bytes(2)),
        ("names", schema::repeated::string(3)),
    ]);
    let value = Value::Message(
        MessageValue::new()
            .with("name", "héllo wörld")
            .with("data", vec![0u8, 1, 2, 255])
            .with("names", Value::list(["a", "", "c"])),
    );
    assert_eq!(roundtrip(&codec, &value), value);
}

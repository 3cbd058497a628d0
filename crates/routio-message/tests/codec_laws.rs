use bytes::Bytes;
use routio_message::{
    decode_message, encode_message, DType, DecodeError, Decode, Dictionary, Encode, FieldTag,
    Header, MessageReader, MessageWriter, Tensor, Timestamp, Typed, TypeSignature, Value,
};

fn roundtrip<T: Encode + Decode>(value: &T) -> T {
    let payload = encode_message(value);
    let mut reader = MessageReader::new(payload);
    let decoded = T::decode(&mut reader).unwrap();
    assert!(reader.is_empty(), "decoder left {} bytes", reader.remaining());
    decoded
}

#[test]
fn primitives_roundtrip_at_their_extremes() {
    for v in [false, true] {
        assert_eq!(roundtrip(&v), v);
    }
    for v in ['a', 'ß', '\u{1F980}', '\0'] {
        assert_eq!(roundtrip(&v), v);
    }
    for v in [i8::MIN, -1, 0, i8::MAX] {
        assert_eq!(roundtrip(&v), v);
    }
    for v in [i16::MIN, 0, i16::MAX] {
        assert_eq!(roundtrip(&v), v);
    }
    for v in [i32::MIN, -42, i32::MAX] {
        assert_eq!(roundtrip(&v), v);
    }
    for v in [i64::MIN, 0, i64::MAX] {
        assert_eq!(roundtrip(&v), v);
    }
    for v in [0u8, u8::MAX] {
        assert_eq!(roundtrip(&v), v);
    }
    for v in [0u16, u16::MAX] {
        assert_eq!(roundtrip(&v), v);
    }
    for v in [0u32, u32::MAX] {
        assert_eq!(roundtrip(&v), v);
    }
    for v in [0u64, u64::MAX] {
        assert_eq!(roundtrip(&v), v);
    }
    for v in [0.0f32, -1.5, f32::MAX, f32::MIN_POSITIVE, f32::INFINITY] {
        assert_eq!(roundtrip(&v), v);
    }
    for v in [0.0f64, std::f64::consts::PI, f64::MIN, f64::NEG_INFINITY] {
        assert_eq!(roundtrip(&v), v);
    }
    assert!(roundtrip(&f64::NAN).is_nan());
    for v in ["", "Hello there", "žluťoučký kůň"] {
        assert_eq!(roundtrip(&v.to_string()), v);
    }
    let raw = Bytes::from_static(&[0, 159, 146, 150, 255]);
    assert_eq!(roundtrip(&raw), raw);
}

#[test]
fn numbers_are_little_endian_with_a_tag() {
    let mut writer = MessageWriter::new();
    writer.write_u32(0x0403_0201).write_i16(-2);
    assert_eq!(
        writer.as_bytes(),
        &[
            FieldTag::U32.as_u8(),
            0x01,
            0x02,
            0x03,
            0x04,
            FieldTag::I16.as_u8(),
            0xfe,
            0xff
        ]
    );
}

#[test]
fn strings_are_length_prefixed_without_terminator() {
    let payload = encode_message("hi");
    assert_eq!(payload.as_ref(), &[FieldTag::String.as_u8(), 2, 0, 0, 0, b'h', b'i']);
}

#[test]
fn fields_read_back_in_call_order() {
    let mut writer = MessageWriter::new();
    writer
        .write_string("sensor-7")
        .write_f64(21.25)
        .write_bool(true)
        .write_u16(512);

    let mut reader = MessageReader::new(writer.finish());
    assert_eq!(reader.read_string().unwrap(), "sensor-7");
    assert_eq!(reader.read_f64().unwrap(), 21.25);
    assert!(reader.read_bool().unwrap());
    assert_eq!(reader.read_u16().unwrap(), 512);
    assert!(reader.is_empty());
}

#[test]
fn reading_past_the_end_is_an_underrun() {
    let mut reader = MessageReader::new(encode_message(&7i32));
    assert_eq!(reader.read_i32().unwrap(), 7);
    assert!(matches!(
        reader.read_i32(),
        Err(DecodeError::Underrun {
            needed: 1,
            remaining: 0
        })
    ));
}

#[test]
fn truncated_field_is_an_underrun_and_leaves_cursor() {
    let payload = encode_message(&7i64);
    let mut reader = MessageReader::new(payload.slice(..5));
    assert!(matches!(
        reader.read_i64(),
        Err(DecodeError::Underrun { needed: 8, .. })
    ));
    assert_eq!(reader.position(), 0);
}

#[test]
fn declared_length_beyond_buffer_is_an_overrun() {
    let mut raw = vec![FieldTag::String.as_u8()];
    raw.extend_from_slice(&100u32.to_le_bytes());
    raw.extend_from_slice(b"short");

    let mut reader = MessageReader::new(raw);
    assert!(matches!(
        reader.read_string(),
        Err(DecodeError::Overrun {
            declared: 100,
            remaining: 5
        })
    ));
    assert_eq!(reader.position(), 0);
}

#[test]
fn wrong_type_is_a_tag_mismatch() {
    let mut reader = MessageReader::new(encode_message(&1.5f32));
    let err = reader.read_i32().unwrap_err();
    assert_eq!(
        err,
        DecodeError::TagMismatch {
            expected: FieldTag::I32,
            found: FieldTag::F32
        }
    );
    // Cursor untouched, the right read still works.
    assert_eq!(reader.read_f32().unwrap(), 1.5);
}

#[test]
fn invalid_utf8_is_rejected_but_bytes_readable() {
    let mut raw = vec![FieldTag::String.as_u8()];
    raw.extend_from_slice(&2u32.to_le_bytes());
    raw.extend_from_slice(&[0xc3, 0x28]);

    let mut reader = MessageReader::new(raw.clone());
    assert_eq!(reader.read_string().unwrap_err(), DecodeError::InvalidUtf8);

    raw[0] = FieldTag::Bytes.as_u8();
    let mut reader = MessageReader::new(raw);
    assert_eq!(reader.read_bytes().unwrap().as_ref(), &[0xc3, 0x28]);
}

#[test]
fn unknown_tag_is_reported() {
    let mut reader = MessageReader::new(vec![0xee, 0, 0, 0, 0]);
    assert_eq!(reader.read_u32().unwrap_err(), DecodeError::UnknownTag(0xee));
}

#[test]
fn builtin_types_roundtrip() {
    let header = Header::new("camera", Timestamp::from_nanos(1_234_567_890));
    assert_eq!(roundtrip(&header), header);

    let mut dict = Dictionary::new();
    dict.insert("unit".into(), "celsius".into());
    dict.insert("location".into(), "lab".into());
    assert_eq!(roundtrip(&dict), dict);
    assert_eq!(roundtrip(&Dictionary::new()), Dictionary::new());

    let mut tensor = Tensor::zeros(DType::U8, vec![100, 100]).unwrap();
    for (i, byte) in tensor.data_mut().iter_mut().enumerate() {
        *byte = (i % 256) as u8;
    }
    assert_eq!(roundtrip(&tensor), tensor);

    let ts = Timestamp::from_nanos(-5);
    assert_eq!(roundtrip(&ts), ts);
}

#[test]
fn header_is_a_plain_string_then_timestamp() {
    let header = Header::new("a", Timestamp::from_nanos(1));
    let mut reader = MessageReader::new(encode_message(&header));
    assert_eq!(reader.read_string().unwrap(), "a");
    assert_eq!(reader.read_timestamp().unwrap(), Timestamp::from_nanos(1));
}

#[test]
fn tensor_with_inconsistent_data_is_rejected() {
    let mut raw = vec![FieldTag::Tensor.as_u8(), DType::F32.as_u8()];
    raw.extend_from_slice(&1u32.to_le_bytes());
    raw.extend_from_slice(&4u64.to_le_bytes());
    raw.extend_from_slice(&[0u8; 12]); // 4 x f32 needs 16

    let mut reader = MessageReader::new(raw);
    assert!(matches!(
        reader.read_tensor(),
        Err(DecodeError::Overrun {
            declared: 16,
            remaining: 12
        })
    ));
    assert_eq!(reader.position(), 0);
}

#[test]
fn repeated_fields_roundtrip() {
    let values = vec![1.0f32, 2.5, -3.0];
    assert_eq!(roundtrip(&values), values);

    let names = vec!["a".to_string(), String::new(), "ccc".to_string()];
    assert_eq!(roundtrip(&names), names);

    let nested = vec![vec![1u8, 2], vec![], vec![3]];
    assert_eq!(roundtrip(&nested), nested);
}

#[test]
fn absurd_repeated_count_is_an_overrun() {
    let mut raw = vec![FieldTag::Repeated.as_u8()];
    raw.extend_from_slice(&u32::MAX.to_le_bytes());
    let mut reader = MessageReader::new(raw);
    assert!(matches!(
        reader.read_repeated::<u8>(),
        Err(DecodeError::Overrun { .. })
    ));
}

#[test]
fn reencoding_fixed_width_message_is_byte_identical() {
    let mut writer = MessageWriter::new();
    writer
        .write_i64(-99)
        .write_f32(0.1)
        .write_u8(3)
        .write_char('x')
        .write_timestamp(Timestamp::from_nanos(42));
    let original = writer.finish();

    let mut reader = MessageReader::new(original.clone());
    let mut again = MessageWriter::new();
    again
        .write_i64(reader.read_i64().unwrap())
        .write_f32(reader.read_f32().unwrap())
        .write_u8(reader.read_u8().unwrap())
        .write_char(reader.read_char().unwrap())
        .write_timestamp(reader.read_timestamp().unwrap());

    assert_eq!(again.finish(), original);
}

#[test]
fn typed_signatures_match_channel_codes() {
    assert_eq!(f32::signature().to_string(), "f");
    assert_eq!(i32::signature().to_string(), "i");
    assert_eq!(String::signature().to_string(), "string");
    assert_eq!(Tensor::signature(), TypeSignature::Tensor);
    assert_eq!(Dictionary::signature(), TypeSignature::Dictionary);
}

#[test]
fn value_reads_by_signature_and_by_tag() {
    let mut writer = MessageWriter::new();
    writer.write_string("Hello there");
    writer.write_repeated(&[1i16, 2]);
    let payload = writer.finish();

    let mut reader = MessageReader::new(payload.clone());
    let first = Value::read(&mut reader, &TypeSignature::String).unwrap();
    assert_eq!(first, Value::String("Hello there".into()));
    let second = Value::read_any(&mut reader).unwrap();
    assert_eq!(second, Value::Repeated(vec![Value::I16(1), Value::I16(2)]));

    let mut rewritten = MessageWriter::new();
    first.write(&mut rewritten);
    second.write(&mut rewritten);
    assert_eq!(rewritten.finish(), payload);
}

#[test]
fn value_rejects_schema_signatures_without_descriptor() {
    let mut reader = MessageReader::new(encode_message(&1u8));
    let sig = TypeSignature::parse("schema:Pose").unwrap();
    assert!(matches!(
        Value::read(&mut reader, &sig),
        Err(DecodeError::ValueMismatch { .. })
    ));
}

#[test]
fn value_json_rendering() {
    let value = Value::Record(vec![
        ("name".into(), Value::String("sensor".into())),
        ("reading".into(), Value::F64(1.5)),
        ("raw".into(), Value::Bytes(Bytes::from_static(b"abc"))),
    ]);
    let json = value.to_json();
    assert_eq!(json["name"], "sensor");
    assert_eq!(json["reading"], 1.5);
    assert_eq!(json["raw"]["bytes"], 3);
    assert_eq!(value.kind_name(), "record");
}

#[test]
fn decode_message_reads_first_value() {
    let decoded: String = decode_message(encode_message("Hello there")).unwrap();
    assert_eq!(decoded, "Hello there");
}

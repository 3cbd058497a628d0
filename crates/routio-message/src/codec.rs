//! Encode/Decode traits and the typed-channel contract.

use bytes::Bytes;

use crate::error::Result;
use crate::reader::MessageReader;
use crate::signature::TypeSignature;
use crate::types::{Dictionary, Header, Tensor, Timestamp};
use crate::writer::MessageWriter;

/// A value that can append itself to a [`MessageWriter`].
pub trait Encode {
    fn encode(&self, writer: &mut MessageWriter);
}

/// A value that can read itself from a [`MessageReader`].
pub trait Decode: Sized {
    fn decode(reader: &mut MessageReader) -> Result<Self>;
}

/// A message type with a fixed channel signature.
///
/// Typed publishers and subscribers use [`Typed::signature`] so both ends
/// of a channel agree on the layout without spelling it out.
pub trait Typed: Encode + Decode {
    fn signature() -> TypeSignature;
}

/// Encode a single value into a standalone payload.
pub fn encode_message<T: Encode + ?Sized>(value: &T) -> Bytes {
    let mut writer = MessageWriter::new();
    value.encode(&mut writer);
    writer.finish()
}

/// Decode a single value from the start of a payload.
pub fn decode_message<T: Decode>(payload: impl Into<Bytes>) -> Result<T> {
    T::decode(&mut MessageReader::new(payload))
}

macro_rules! primitive {
    ($ty:ty, $write:ident, $read:ident, $sig:ident) => {
        impl Encode for $ty {
            fn encode(&self, writer: &mut MessageWriter) {
                writer.$write(*self);
            }
        }

        impl Decode for $ty {
            fn decode(reader: &mut MessageReader) -> Result<Self> {
                reader.$read()
            }
        }

        impl Typed for $ty {
            fn signature() -> TypeSignature {
                TypeSignature::$sig
            }
        }
    };
}

primitive!(bool, write_bool, read_bool, Bool);
primitive!(char, write_char, read_char, Char);
primitive!(i8, write_i8, read_i8, I8);
primitive!(i16, write_i16, read_i16, I16);
primitive!(i32, write_i32, read_i32, I32);
primitive!(i64, write_i64, read_i64, I64);
primitive!(u8, write_u8, read_u8, U8);
primitive!(u16, write_u16, read_u16, U16);
primitive!(u32, write_u32, read_u32, U32);
primitive!(u64, write_u64, read_u64, U64);
primitive!(f32, write_f32, read_f32, F32);
primitive!(f64, write_f64, read_f64, F64);
primitive!(Timestamp, write_timestamp, read_timestamp, Timestamp);

impl Encode for str {
    fn encode(&self, writer: &mut MessageWriter) {
        writer.write_string(self);
    }
}

impl Encode for String {
    fn encode(&self, writer: &mut MessageWriter) {
        writer.write_string(self);
    }
}

impl Decode for String {
    fn decode(reader: &mut MessageReader) -> Result<Self> {
        reader.read_string()
    }
}

impl Typed for String {
    fn signature() -> TypeSignature {
        TypeSignature::String
    }
}

impl Encode for Bytes {
    fn encode(&self, writer: &mut MessageWriter) {
        writer.write_bytes(self);
    }
}

impl Decode for Bytes {
    fn decode(reader: &mut MessageReader) -> Result<Self> {
        reader.read_bytes()
    }
}

impl Typed for Bytes {
    fn signature() -> TypeSignature {
        TypeSignature::Bytes
    }
}

impl Encode for Header {
    fn encode(&self, writer: &mut MessageWriter) {
        writer.write_header(self);
    }
}

impl Decode for Header {
    fn decode(reader: &mut MessageReader) -> Result<Self> {
        reader.read_header()
    }
}

impl Typed for Header {
    fn signature() -> TypeSignature {
        TypeSignature::Header
    }
}

impl Encode for Dictionary {
    fn encode(&self, writer: &mut MessageWriter) {
        writer.write_dictionary(self);
    }
}

impl Decode for Dictionary {
    fn decode(reader: &mut MessageReader) -> Result<Self> {
        reader.read_dictionary()
    }
}

impl Typed for Dictionary {
    fn signature() -> TypeSignature {
        TypeSignature::Dictionary
    }
}

impl Encode for Tensor {
    fn encode(&self, writer: &mut MessageWriter) {
        writer.write_tensor(self);
    }
}

impl Decode for Tensor {
    fn decode(reader: &mut MessageReader) -> Result<Self> {
        reader.read_tensor()
    }
}

impl Typed for Tensor {
    fn signature() -> TypeSignature {
        TypeSignature::Tensor
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, writer: &mut MessageWriter) {
        writer.write_repeated(self);
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, writer: &mut MessageWriter) {
        writer.write_repeated(self);
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(reader: &mut MessageReader) -> Result<Self> {
        reader.read_repeated()
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, writer: &mut MessageWriter) {
        (**self).encode(writer);
    }
}

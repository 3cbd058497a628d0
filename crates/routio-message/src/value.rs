//! Dynamically typed field values.
//!
//! Used where the layout is only known at runtime: schema-driven records
//! and the command-line tools.

use bytes::Bytes;
use serde_json::json;

use crate::error::{DecodeError, Result};
use crate::reader::MessageReader;
use crate::signature::TypeSignature;
use crate::tag::FieldTag;
use crate::types::{Dictionary, Header, Tensor, Timestamp};
use crate::writer::MessageWriter;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Char(char),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Bytes),
    Timestamp(Timestamp),
    Header(Header),
    Dictionary(Dictionary),
    Tensor(Tensor),
    Repeated(Vec<Value>),
    /// Ordered named fields of a structured message.
    Record(Vec<(String, Value)>),
}

impl Value {
    /// Read one value of a builtin signature.
    ///
    /// Schema signatures need a descriptor and are rejected here.
    pub fn read(reader: &mut MessageReader, signature: &TypeSignature) -> Result<Self> {
        Ok(match signature {
            TypeSignature::Bool => Self::Bool(reader.read_bool()?),
            TypeSignature::Char => Self::Char(reader.read_char()?),
            TypeSignature::I8 => Self::I8(reader.read_i8()?),
            TypeSignature::I16 => Self::I16(reader.read_i16()?),
            TypeSignature::I32 => Self::I32(reader.read_i32()?),
            TypeSignature::I64 => Self::I64(reader.read_i64()?),
            TypeSignature::U8 => Self::U8(reader.read_u8()?),
            TypeSignature::U16 => Self::U16(reader.read_u16()?),
            TypeSignature::U32 => Self::U32(reader.read_u32()?),
            TypeSignature::U64 => Self::U64(reader.read_u64()?),
            TypeSignature::F32 => Self::F32(reader.read_f32()?),
            TypeSignature::F64 => Self::F64(reader.read_f64()?),
            TypeSignature::String => Self::String(reader.read_string()?),
            TypeSignature::Bytes => Self::Bytes(reader.read_bytes()?),
            TypeSignature::Timestamp => Self::Timestamp(reader.read_timestamp()?),
            TypeSignature::Header => Self::Header(reader.read_header()?),
            TypeSignature::Dictionary => Self::Dictionary(reader.read_dictionary()?),
            TypeSignature::Tensor => Self::Tensor(reader.read_tensor()?),
            TypeSignature::Schema(id) => {
                return Err(DecodeError::ValueMismatch {
                    expected: signature.to_string(),
                    detail: format!("schema '{id}' needs a descriptor to decode"),
                })
            }
        })
    }

    /// Read whatever field comes next, guided by its tag.
    ///
    /// Headers and records have no tag of their own and come back as their
    /// component fields.
    pub fn read_any(reader: &mut MessageReader) -> Result<Self> {
        let sig = match reader.peek_tag()? {
            FieldTag::Bool => TypeSignature::Bool,
            FieldTag::Char => TypeSignature::Char,
            FieldTag::I8 => TypeSignature::I8,
            FieldTag::I16 => TypeSignature::I16,
            FieldTag::I32 => TypeSignature::I32,
            FieldTag::I64 => TypeSignature::I64,
            FieldTag::U8 => TypeSignature::U8,
            FieldTag::U16 => TypeSignature::U16,
            FieldTag::U32 => TypeSignature::U32,
            FieldTag::U64 => TypeSignature::U64,
            FieldTag::F32 => TypeSignature::F32,
            FieldTag::F64 => TypeSignature::F64,
            FieldTag::String => TypeSignature::String,
            FieldTag::Bytes => TypeSignature::Bytes,
            FieldTag::Timestamp => TypeSignature::Timestamp,
            FieldTag::Dictionary => TypeSignature::Dictionary,
            FieldTag::Tensor => TypeSignature::Tensor,
            FieldTag::Repeated => {
                let start = reader.position();
                let count = reader.begin_repeated()?;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    match Self::read_any(reader) {
                        Ok(item) => items.push(item),
                        Err(err) => {
                            reader.set_position(start);
                            return Err(err);
                        }
                    }
                }
                return Ok(Self::Repeated(items));
            }
        };
        Self::read(reader, &sig)
    }

    /// Append this value to a writer.
    pub fn write(&self, writer: &mut MessageWriter) {
        match self {
            Self::Bool(v) => writer.write_bool(*v),
            Self::Char(v) => writer.write_char(*v),
            Self::I8(v) => writer.write_i8(*v),
            Self::I16(v) => writer.write_i16(*v),
            Self::I32(v) => writer.write_i32(*v),
            Self::I64(v) => writer.write_i64(*v),
            Self::U8(v) => writer.write_u8(*v),
            Self::U16(v) => writer.write_u16(*v),
            Self::U32(v) => writer.write_u32(*v),
            Self::U64(v) => writer.write_u64(*v),
            Self::F32(v) => writer.write_f32(*v),
            Self::F64(v) => writer.write_f64(*v),
            Self::String(v) => writer.write_string(v),
            Self::Bytes(v) => writer.write_bytes(v),
            Self::Timestamp(v) => writer.write_timestamp(*v),
            Self::Header(v) => writer.write_header(v),
            Self::Dictionary(v) => writer.write_dictionary(v),
            Self::Tensor(v) => writer.write_tensor(v),
            Self::Repeated(items) => {
                writer.begin_repeated(items.len());
                for item in items {
                    item.write(writer);
                }
                return;
            }
            Self::Record(fields) => {
                for (_, value) in fields {
                    value.write(writer);
                }
                return;
            }
        };
    }

    /// Short kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Char(_) => "char",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Timestamp(_) => "timestamp",
            Self::Header(_) => "header",
            Self::Dictionary(_) => "dictionary",
            Self::Tensor(_) => "tensor",
            Self::Repeated(_) => "repeated",
            Self::Record(_) => "record",
        }
    }

    /// JSON rendering for tooling output.
    ///
    /// Bytes and tensor data are summarized by length rather than dumped.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(v) => json!(v),
            Self::Char(v) => json!(v.to_string()),
            Self::I8(v) => json!(v),
            Self::I16(v) => json!(v),
            Self::I32(v) => json!(v),
            Self::I64(v) => json!(v),
            Self::U8(v) => json!(v),
            Self::U16(v) => json!(v),
            Self::U32(v) => json!(v),
            Self::U64(v) => json!(v),
            Self::F32(v) => json!(v),
            Self::F64(v) => json!(v),
            Self::String(v) => json!(v),
            Self::Bytes(v) => json!({ "bytes": v.len() }),
            Self::Timestamp(v) => json!({ "nanos": v.as_nanos() }),
            Self::Header(h) => json!({
                "source": h.source,
                "timestamp": { "nanos": h.timestamp.as_nanos() },
            }),
            Self::Dictionary(d) => json!(d),
            Self::Tensor(t) => json!({
                "dtype": t.dtype().name(),
                "shape": t.shape(),
                "bytes": t.data().len(),
            }),
            Self::Repeated(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Self::Record(fields) => {
                let mut map = serde_json::Map::new();
                for (name, value) in fields {
                    map.insert(name.clone(), value.to_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }
}

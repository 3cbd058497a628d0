use std::fmt;
use std::str::FromStr;

use crate::error::{DecodeError, Result};

const SCHEMA_PREFIX: &str = "schema:";
/// Longest signature text a frame header can carry.
const MAX_SIGNATURE_LEN: usize = 255;

/// Identifies the layout of the messages on a channel.
///
/// Two channels with the same name but different signatures are distinct:
/// a subscriber only ever sees frames whose signature matches its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeSignature {
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
    Bytes,
    Timestamp,
    Header,
    Dictionary,
    Tensor,
    /// A structured message described by a compiled schema descriptor.
    Schema(std::string::String),
}

impl TypeSignature {
    /// Parse signature text. Aliases (`i32`, `f32`, `f64`, `s`) map onto
    /// their canonical variant.
    pub fn parse(text: &str) -> Result<Self> {
        let sig = match text {
            "b" => Self::Bool,
            "c" => Self::Char,
            "i8" => Self::I8,
            "i16" => Self::I16,
            "i" | "i32" => Self::I32,
            "i64" => Self::I64,
            "u8" => Self::U8,
            "u16" => Self::U16,
            "u32" => Self::U32,
            "u64" => Self::U64,
            "f" | "f32" => Self::F32,
            "d" | "f64" => Self::F64,
            "string" | "s" => Self::String,
            "bytes" => Self::Bytes,
            "timestamp" => Self::Timestamp,
            "header" => Self::Header,
            "dictionary" => Self::Dictionary,
            "tensor" => Self::Tensor,
            other => match other.strip_prefix(SCHEMA_PREFIX) {
                Some(id) if is_valid_schema_id(id) && other.len() <= MAX_SIGNATURE_LEN => {
                    Self::Schema(id.to_string())
                }
                _ => return Err(DecodeError::InvalidSignature(other.to_string())),
            },
        };
        Ok(sig)
    }

    /// A schema signature for the given descriptor id.
    pub fn schema(id: impl Into<std::string::String>) -> Result<Self> {
        let id = id.into();
        if is_valid_schema_id(&id) && id.len() + SCHEMA_PREFIX.len() <= MAX_SIGNATURE_LEN {
            Ok(Self::Schema(id))
        } else {
            Err(DecodeError::InvalidSignature(format!("{SCHEMA_PREFIX}{id}")))
        }
    }

    /// Canonical signature text as written into frame headers.
    pub fn as_text(&self) -> std::borrow::Cow<'static, str> {
        let code = match self {
            Self::Bool => "b",
            Self::Char => "c",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f",
            Self::F64 => "d",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Timestamp => "timestamp",
            Self::Header => "header",
            Self::Dictionary => "dictionary",
            Self::Tensor => "tensor",
            Self::Schema(id) => return format!("{SCHEMA_PREFIX}{id}").into(),
        };
        code.into()
    }

    /// Schema id for [`TypeSignature::Schema`].
    pub fn schema_id(&self) -> Option<&str> {
        match self {
            Self::Schema(id) => Some(id),
            _ => None,
        }
    }
}

fn is_valid_schema_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'))
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl FromStr for TypeSignature {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

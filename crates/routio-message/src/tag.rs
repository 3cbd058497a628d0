use std::fmt;

use crate::error::{DecodeError, Result};

/// One-byte tag written in front of every encoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldTag {
    Bool = 1,
    Char = 2,
    I8 = 3,
    I16 = 4,
    I32 = 5,
    I64 = 6,
    U8 = 7,
    U16 = 8,
    U32 = 9,
    U64 = 10,
    F32 = 11,
    F64 = 12,
    String = 13,
    Bytes = 14,
    Timestamp = 15,
    Dictionary = 16,
    Tensor = 17,
    Repeated = 18,
}

impl FieldTag {
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            1 => Self::Bool,
            2 => Self::Char,
            3 => Self::I8,
            4 => Self::I16,
            5 => Self::I32,
            6 => Self::I64,
            7 => Self::U8,
            8 => Self::U16,
            9 => Self::U32,
            10 => Self::U64,
            11 => Self::F32,
            12 => Self::F64,
            13 => Self::String,
            14 => Self::Bytes,
            15 => Self::Timestamp,
            16 => Self::Dictionary,
            17 => Self::Tensor,
            18 => Self::Repeated,
            other => return Err(DecodeError::UnknownTag(other)),
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Char => "char",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Timestamp => "timestamp",
            Self::Dictionary => "dictionary",
            Self::Tensor => "tensor",
            Self::Repeated => "repeated",
        }
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

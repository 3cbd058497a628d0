//! Builtin message types.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{DecodeError, Result};

/// Point in time, stored as nanoseconds since the Unix epoch.
///
/// Negative values are instants before the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn to_system_time(self) -> SystemTime {
        let magnitude = Duration::from_nanos(self.0.unsigned_abs());
        if self.0 >= 0 {
            UNIX_EPOCH + magnitude
        } else {
            UNIX_EPOCH - magnitude
        }
    }
}

impl From<SystemTime> for Timestamp {
    /// Saturates at the i64 range (about year 2262).
    fn from(time: SystemTime) -> Self {
        let nanos = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
            Err(before) => i64::try_from(before.duration().as_nanos())
                .map(|n| -n)
                .unwrap_or(i64::MIN),
        };
        Self(nanos)
    }
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> Self {
        ts.to_system_time()
    }
}

/// Message provenance: who sent it and when.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub source: String,
    pub timestamp: Timestamp,
}

impl Header {
    pub fn new(source: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            source: source.into(),
            timestamp,
        }
    }

    /// Header stamped with the current time.
    pub fn now(source: impl Into<String>) -> Self {
        Self::new(source, Timestamp::now())
    }
}

/// Ordered string-to-string map.
pub type Dictionary = BTreeMap<String, String>;

/// Element type of a [`Tensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DType {
    U8 = 1,
    I8 = 2,
    U16 = 3,
    I16 = 4,
    U32 = 5,
    I32 = 6,
    U64 = 7,
    I64 = 8,
    F32 = 9,
    F64 = 10,
}

impl DType {
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            1 => Self::U8,
            2 => Self::I8,
            3 => Self::U16,
            4 => Self::I16,
            5 => Self::U32,
            6 => Self::I32,
            7 => Self::U64,
            8 => Self::I64,
            9 => Self::F32,
            10 => Self::F64,
            other => return Err(DecodeError::InvalidDType(other)),
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U64 => "u64",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

/// N-dimensional numeric array with little-endian element data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl Tensor {
    /// Build a tensor, checking that `data` holds exactly `shape` elements.
    pub fn new(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> Result<Self> {
        let expected = byte_len(dtype, &shape).ok_or_else(|| DecodeError::ShapeMismatch {
            shape: shape.clone(),
            expected: usize::MAX,
            actual: data.len(),
        })?;
        if expected != data.len() {
            return Err(DecodeError::ShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dtype, shape, data })
    }

    /// A zero-filled tensor.
    pub fn zeros(dtype: DType, shape: Vec<usize>) -> Result<Self> {
        let len = byte_len(dtype, &shape).ok_or_else(|| DecodeError::ShapeMismatch {
            shape: shape.clone(),
            expected: usize::MAX,
            actual: 0,
        })?;
        Ok(Self {
            dtype,
            shape,
            data: vec![0; len],
        })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Raw little-endian element bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable element bytes; the length is fixed by the shape.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Number of elements (product of the shape).
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Byte length of a tensor with this shape, `None` on overflow.
pub(crate) fn byte_len(dtype: DType, shape: &[usize]) -> Option<usize> {
    shape
        .iter()
        .try_fold(dtype.size(), |acc, &dim| acc.checked_mul(dim))
}

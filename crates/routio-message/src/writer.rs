use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::Encode;
use crate::tag::FieldTag;
use crate::types::{Dictionary, Header, Tensor, Timestamp};

/// Accumulates tagged fields into a growable buffer, in call order.
///
/// Writes cannot fail. Lengths are u32 on the wire; anything larger cannot
/// fit in a frame either and is rejected when the frame is encoded.
#[derive(Debug, Default, Clone)]
pub struct MessageWriter {
    buf: BytesMut,
}

macro_rules! put_fixed {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $tag:ident, $put:ident) => {
        $(#[$doc])*
        pub fn $name(&mut self, value: $ty) -> &mut Self {
            self.buf.put_u8(FieldTag::$tag.as_u8());
            self.buf.$put(value);
            self
        }
    };
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(FieldTag::Bool.as_u8());
        self.buf.put_u8(u8::from(value));
        self
    }

    /// Chars travel as their 4-byte Unicode scalar value.
    pub fn write_char(&mut self, value: char) -> &mut Self {
        self.buf.put_u8(FieldTag::Char.as_u8());
        self.buf.put_u32_le(u32::from(value));
        self
    }

    put_fixed!(write_i8, i8, I8, put_i8);
    put_fixed!(write_i16, i16, I16, put_i16_le);
    put_fixed!(write_i32, i32, I32, put_i32_le);
    put_fixed!(write_i64, i64, I64, put_i64_le);
    put_fixed!(write_u8, u8, U8, put_u8);
    put_fixed!(write_u16, u16, U16, put_u16_le);
    put_fixed!(write_u32, u32, U32, put_u32_le);
    put_fixed!(write_u64, u64, U64, put_u64_le);
    put_fixed!(write_f32, f32, F32, put_f32_le);
    put_fixed!(write_f64, f64, F64, put_f64_le);

    /// Length-prefixed UTF-8, no terminator.
    pub fn write_string(&mut self, value: &str) -> &mut Self {
        self.buf.put_u8(FieldTag::String.as_u8());
        self.put_len_prefixed(value.as_bytes());
        self
    }

    /// Length-prefixed raw bytes.
    pub fn write_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_u8(FieldTag::Bytes.as_u8());
        self.put_len_prefixed(value);
        self
    }

    pub fn write_timestamp(&mut self, value: Timestamp) -> &mut Self {
        self.buf.put_u8(FieldTag::Timestamp.as_u8());
        self.buf.put_i64_le(value.as_nanos());
        self
    }

    /// Source string followed by timestamp, no envelope of its own.
    pub fn write_header(&mut self, value: &Header) -> &mut Self {
        self.write_string(&value.source);
        self.write_timestamp(value.timestamp)
    }

    pub fn write_dictionary(&mut self, value: &Dictionary) -> &mut Self {
        self.buf.put_u8(FieldTag::Dictionary.as_u8());
        self.buf.put_u32_le(value.len() as u32);
        for (key, val) in value {
            self.put_len_prefixed(key.as_bytes());
            self.put_len_prefixed(val.as_bytes());
        }
        self
    }

    /// dtype, rank (u32), one u64 per dimension, then the element bytes.
    pub fn write_tensor(&mut self, value: &Tensor) -> &mut Self {
        self.buf.put_u8(FieldTag::Tensor.as_u8());
        self.buf.put_u8(value.dtype().as_u8());
        self.buf.put_u32_le(value.shape().len() as u32);
        for &dim in value.shape() {
            self.buf.put_u64_le(dim as u64);
        }
        self.buf.put_slice(value.data());
        self
    }

    /// Element count followed by each element's own encoding.
    pub fn write_repeated<T: Encode>(&mut self, items: &[T]) -> &mut Self {
        self.begin_repeated(items.len());
        for item in items {
            item.encode(self);
        }
        self
    }

    /// Start a repeated field of `count` elements; the caller writes them next.
    pub fn begin_repeated(&mut self, count: usize) -> &mut Self {
        self.buf.put_u8(FieldTag::Repeated.as_u8());
        self.buf.put_u32_le(count as u32);
        self
    }

    /// Append any encodable value.
    pub fn write<T: Encode + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.encode(self);
        self
    }

    fn put_len_prefixed(&mut self, bytes: &[u8]) {
        self.buf.put_u32_le(bytes.len() as u32);
        self.buf.put_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Hand over the encoded payload.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

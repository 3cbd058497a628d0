use bytes::{Buf, Bytes};

use crate::codec::Decode;
use crate::error::{DecodeError, Result};
use crate::tag::FieldTag;
use crate::types::{byte_len, DType, Dictionary, Header, Tensor, Timestamp};

/// Cursor over a received payload.
///
/// Each `read_*` consumes exactly what the matching `write_*` produced and
/// fails with [`DecodeError`] on a tag mismatch or a short buffer. A failed
/// read leaves the cursor where it was.
#[derive(Debug, Clone)]
pub struct MessageReader {
    buf: Bytes,
    pos: usize,
}

macro_rules! get_fixed {
    ($name:ident, $ty:ty, $tag:ident, $width:expr, $get:ident) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let mut body = self.field(FieldTag::$tag, $width)?;
            Ok(body.$get())
        }
    };
}

impl MessageReader {
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self {
            buf: buf.into(),
            pos: 0,
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Offset of the cursor from the start of the payload.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor back to a position previously returned by
    /// [`MessageReader::position`].
    pub(crate) fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.buf.len());
    }

    /// The whole payload, independent of the cursor.
    pub fn payload(&self) -> &Bytes {
        &self.buf
    }

    /// Tag of the next field without consuming it.
    pub fn peek_tag(&self) -> Result<FieldTag> {
        match self.buf.get(self.pos) {
            Some(&tag) => FieldTag::from_u8(tag),
            None => Err(DecodeError::Underrun {
                needed: 1,
                remaining: 0,
            }),
        }
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        let body = self.field(FieldTag::Bool, 1)?;
        Ok(body[0] != 0)
    }

    pub fn read_char(&mut self) -> Result<char> {
        let start = self.pos;
        let mut body = self.field(FieldTag::Char, 4)?;
        let code = body.get_u32_le();
        char::from_u32(code).ok_or_else(|| {
            self.pos = start;
            DecodeError::InvalidChar(code)
        })
    }

    get_fixed!(read_i8, i8, I8, 1, get_i8);
    get_fixed!(read_i16, i16, I16, 2, get_i16_le);
    get_fixed!(read_i32, i32, I32, 4, get_i32_le);
    get_fixed!(read_i64, i64, I64, 8, get_i64_le);
    get_fixed!(read_u8, u8, U8, 1, get_u8);
    get_fixed!(read_u16, u16, U16, 2, get_u16_le);
    get_fixed!(read_u32, u32, U32, 4, get_u32_le);
    get_fixed!(read_u64, u64, U64, 8, get_u64_le);
    get_fixed!(read_f32, f32, F32, 4, get_f32_le);
    get_fixed!(read_f64, f64, F64, 8, get_f64_le);

    /// Read a string field, validating UTF-8.
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.pos;
        self.expect_tag(FieldTag::String)?;
        let raw = self.len_prefixed().inspect_err(|_| self.pos = start)?;
        String::from_utf8(raw.to_vec()).map_err(|_| {
            self.pos = start;
            DecodeError::InvalidUtf8
        })
    }

    /// Read a bytes field without copying.
    pub fn read_bytes(&mut self) -> Result<Bytes> {
        let start = self.pos;
        self.expect_tag(FieldTag::Bytes)?;
        self.len_prefixed().inspect_err(|_| self.pos = start)
    }

    pub fn read_timestamp(&mut self) -> Result<Timestamp> {
        let mut body = self.field(FieldTag::Timestamp, 8)?;
        Ok(Timestamp::from_nanos(body.get_i64_le()))
    }

    pub fn read_header(&mut self) -> Result<Header> {
        let start = self.pos;
        let source = self.read_string()?;
        let timestamp = self.read_timestamp().inspect_err(|_| self.pos = start)?;
        Ok(Header { source, timestamp })
    }

    pub fn read_dictionary(&mut self) -> Result<Dictionary> {
        let start = self.pos;
        self.read_dictionary_body()
            .inspect_err(|_| self.pos = start)
    }

    fn read_dictionary_body(&mut self) -> Result<Dictionary> {
        self.expect_tag(FieldTag::Dictionary)?;
        let count = self.take_u32()? as usize;
        // Each entry needs at least two length prefixes.
        self.check_count(count, 8)?;
        let mut dict = Dictionary::new();
        for _ in 0..count {
            let key = utf8(self.len_prefixed()?)?;
            let value = utf8(self.len_prefixed()?)?;
            dict.insert(key, value);
        }
        Ok(dict)
    }

    pub fn read_tensor(&mut self) -> Result<Tensor> {
        let start = self.pos;
        self.read_tensor_body().inspect_err(|_| self.pos = start)
    }

    fn read_tensor_body(&mut self) -> Result<Tensor> {
        self.expect_tag(FieldTag::Tensor)?;
        let dtype = DType::from_u8(self.take(1)?[0])?;
        let rank = self.take_u32()? as usize;
        self.check_count(rank, 8)?;
        let mut shape = Vec::with_capacity(rank);
        for _ in 0..rank {
            let mut raw = self.take(8)?;
            let dim = raw.get_u64_le();
            let dim = usize::try_from(dim).map_err(|_| DecodeError::Overrun {
                declared: usize::MAX,
                remaining: self.remaining(),
            })?;
            shape.push(dim);
        }
        let len = byte_len(dtype, &shape).ok_or(DecodeError::Overrun {
            declared: usize::MAX,
            remaining: self.remaining(),
        })?;
        if len > self.remaining() {
            return Err(DecodeError::Overrun {
                declared: len,
                remaining: self.remaining(),
            });
        }
        let data = self.take(len)?.to_vec();
        Tensor::new(dtype, shape, data)
    }

    /// Read a repeated field of decodable elements.
    pub fn read_repeated<T: Decode>(&mut self) -> Result<Vec<T>> {
        let start = self.pos;
        self.read_repeated_body()
            .inspect_err(|_| self.pos = start)
    }

    fn read_repeated_body<T: Decode>(&mut self) -> Result<Vec<T>> {
        let count = self.begin_repeated()?;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(T::decode(self)?);
        }
        Ok(items)
    }

    /// Read the header of a repeated field and return its element count.
    pub fn begin_repeated(&mut self) -> Result<usize> {
        let start = self.pos;
        self.expect_tag(FieldTag::Repeated)?;
        let count = self.take_u32().inspect_err(|_| self.pos = start)? as usize;
        // Every element carries at least its tag byte.
        self.check_count(count, 1).inspect_err(|_| self.pos = start)?;
        Ok(count)
    }

    /// Read any decodable value.
    pub fn read<T: Decode>(&mut self) -> Result<T> {
        T::decode(self)
    }

    /// Consume a tag plus a fixed-width body; rewinds on failure.
    fn field(&mut self, tag: FieldTag, width: usize) -> Result<Bytes> {
        let start = self.pos;
        self.expect_tag(tag)?;
        self.take(width).inspect_err(|_| self.pos = start)
    }

    fn expect_tag(&mut self, expected: FieldTag) -> Result<()> {
        let found = self.peek_tag()?;
        if found != expected {
            return Err(DecodeError::TagMismatch { expected, found });
        }
        self.pos += 1;
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<Bytes> {
        if n > self.remaining() {
            return Err(DecodeError::Underrun {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = self.buf.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(out)
    }

    fn take_u32(&mut self) -> Result<u32> {
        let mut raw = self.take(4)?;
        Ok(raw.get_u32_le())
    }

    fn len_prefixed(&mut self) -> Result<Bytes> {
        let len = self.take_u32()? as usize;
        if len > self.remaining() {
            return Err(DecodeError::Overrun {
                declared: len,
                remaining: self.remaining(),
            });
        }
        self.take(len)
    }

    /// Reject counts that cannot possibly fit in what is left.
    fn check_count(&self, count: usize, min_item_size: usize) -> Result<()> {
        match count.checked_mul(min_item_size) {
            Some(needed) if needed <= self.remaining() => Ok(()),
            _ => Err(DecodeError::Overrun {
                declared: count,
                remaining: self.remaining(),
            }),
        }
    }
}

fn utf8(raw: Bytes) -> Result<String> {
    String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
}

//! Binary message codec for routio.
//!
//! [`MessageWriter`] appends tagged, little-endian fields in call order and
//! [`MessageReader`] consumes them back in the same order:
//!
//! ```
//! use routio_message::{MessageReader, MessageWriter};
//!
//! let mut writer = MessageWriter::new();
//! writer.write_string("Hello there").write_f32(21.5);
//!
//! let mut reader = MessageReader::new(writer.finish());
//! assert_eq!(reader.read_string().unwrap(), "Hello there");
//! assert_eq!(reader.read_f32().unwrap(), 21.5);
//! assert!(reader.read_i32().is_err());
//! ```
//!
//! Every field starts with a one-byte [`FieldTag`]; lengths and counts are
//! u32, numbers are fixed-width little-endian on every platform. Nested
//! messages are the plain concatenation of their fields.

pub mod codec;
pub mod error;
pub mod reader;
pub mod signature;
pub mod tag;
pub mod types;
pub mod value;
pub mod writer;

pub use codec::{decode_message, encode_message, Decode, Encode, Typed};
pub use error::{DecodeError, Result};
pub use reader::MessageReader;
pub use signature::TypeSignature;
pub use tag::FieldTag;
pub use types::{DType, Dictionary, Header, Tensor, Timestamp};
pub use value::Value;
pub use writer::MessageWriter;

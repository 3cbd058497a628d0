//! Channel-addressed, length-prefixed wire frames for routio.
//!
//! Every frame carries:
//! - A 2-byte magic number ("RT") for stream synchronization
//! - A 1-byte kind (DATA, SUBSCRIBE, UNSUBSCRIBE, ADVERTISE, HELLO)
//! - The channel name and type signature, each with a 2-byte LE length
//! - A 4-byte LE payload length followed by the payload
//!
//! [`FrameReader`] and [`FrameWriter`] drive non-blocking streams from an
//! event loop; with the `async` feature, [`RoutioCodec`] plugs into `tokio_util::codec`.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod kind;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::RoutioCodec;
pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_HIGH_WATER_MARK, DEFAULT_MAX_NAME,
    DEFAULT_MAX_PAYLOAD, FIXED_HEADER_SIZE, MAGIC, MAX_SIGNATURE,
};
pub use error::{FrameError, Result};
pub use kind::FrameKind;
pub use reader::{FrameReader, ReadBatch};
pub use writer::FrameWriter;

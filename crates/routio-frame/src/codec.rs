use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::FrameKind;

/// Fixed part of the header: magic (2) + kind (1) + name length (2) +
/// signature length (2) + payload length (4) = 11 bytes.
pub const FIXED_HEADER_SIZE: usize = 11;

/// Magic bytes: "RT" (0x52 0x54).
pub const MAGIC: [u8; 2] = [0x52, 0x54];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default maximum channel name length in bytes.
pub const DEFAULT_MAX_NAME: usize = 1024;

/// Maximum type signature length in bytes.
pub const MAX_SIGNATURE: usize = 255;

/// Default outbound high-water mark: 8 MiB.
pub const DEFAULT_HIGH_WATER_MARK: usize = 8 * 1024 * 1024;

/// One unit of wire traffic: a kind, a channel address and a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Channel name. Empty for HELLO.
    pub channel: String,
    /// Type signature text of the channel. Empty for HELLO.
    pub signature: String,
    pub payload: Bytes,
}

impl Frame {
    /// A DATA frame carrying an encoded message.
    pub fn data(
        channel: impl Into<String>,
        signature: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            kind: FrameKind::Data,
            channel: channel.into(),
            signature: signature.into(),
            payload: payload.into(),
        }
    }

    /// A SUBSCRIBE, UNSUBSCRIBE or ADVERTISE frame (empty payload).
    pub fn control(
        kind: FrameKind,
        channel: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            channel: channel.into(),
            signature: signature.into(),
            payload: Bytes::new(),
        }
    }

    /// A HELLO frame with the given identification payload.
    pub fn hello(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Hello,
            channel: String::new(),
            signature: String::new(),
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + strings + payload).
    pub fn wire_size(&self) -> usize {
        FIXED_HEADER_SIZE + self.channel.len() + self.signature.len() + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (all lengths little-endian):
/// ```text
/// ┌────────┬──────┬──────────┬──────┬─────────┬─────┬───────────┬─────────┐
/// │ Magic  │ Kind │ Name len │ Name │ Sig len │ Sig │ Pay. len  │ Payload │
/// │ "RT"   │ (1B) │ (2B)     │      │ (2B)    │     │ (4B)      │         │
/// └────────┴──────┴──────────┴──────┴─────────┴─────┴───────────┴─────────┘
/// ```
///
/// Only the hard wire limits are enforced here; configured limits are
/// applied by [`FrameWriter`](crate::FrameWriter).
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    if frame.channel.len() > u16::MAX as usize {
        return Err(FrameError::NameTooLong {
            size: frame.channel.len(),
            max: u16::MAX as usize,
        });
    }
    if frame.signature.len() > MAX_SIGNATURE {
        return Err(FrameError::SignatureTooLong {
            size: frame.signature.len(),
            max: MAX_SIGNATURE,
        });
    }
    if frame.payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: frame.payload.len(),
            max: u32::MAX as usize,
        });
    }

    dst.reserve(frame.wire_size());
    dst.put_slice(&MAGIC);
    dst.put_u8(frame.kind.as_u8());
    dst.put_u16_le(frame.channel.len() as u16);
    dst.put_slice(frame.channel.as_bytes());
    dst.put_u16_le(frame.signature.len() as u16);
    dst.put_slice(frame.signature.as_bytes());
    dst.put_u32_le(frame.payload.len() as u32);
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. Header violations
/// are reported as soon as the offending field is visible, before the rest
/// of the frame has arrived.
pub fn decode_frame(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Frame>> {
    if src.len() >= 2 && src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic {
            found: [src[0], src[1]],
        });
    }
    if src.len() < 5 {
        return Ok(None); // Need more data
    }

    let kind = FrameKind::from_u8(src[2])?;

    let name_len = read_u16(src, 3);
    if name_len > config.max_name_len {
        return Err(FrameError::NameTooLong {
            size: name_len,
            max: config.max_name_len,
        });
    }

    let sig_len_at = 5 + name_len;
    if src.len() < sig_len_at + 2 {
        return Ok(None);
    }
    let sig_len = read_u16(src, sig_len_at);
    if sig_len > MAX_SIGNATURE {
        return Err(FrameError::SignatureTooLong {
            size: sig_len,
            max: MAX_SIGNATURE,
        });
    }

    let payload_len_at = sig_len_at + 2 + sig_len;
    if src.len() < payload_len_at + 4 {
        return Ok(None);
    }
    let payload_len = read_u32(src, payload_len_at);
    if payload_len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: config.max_payload_size,
        });
    }

    let total = payload_len_at + 4 + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(5);
    let channel = take_string(src, name_len, "channel name")?;
    src.advance(2);
    let signature = take_string(src, sig_len, "type signature")?;
    src.advance(4);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        kind,
        channel,
        signature,
        payload,
    }))
}

fn read_u16(src: &[u8], at: usize) -> usize {
    u16::from_le_bytes([src[at], src[at + 1]]) as usize
}

fn read_u32(src: &[u8], at: usize) -> usize {
    u32::from_le_bytes([src[at], src[at + 1], src[at + 2], src[at + 3]]) as usize
}

fn take_string(src: &mut BytesMut, len: usize, field: &'static str) -> Result<String> {
    let raw = src.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| FrameError::InvalidUtf8 { field })
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Maximum channel name length in bytes. Default: 1024.
    pub max_name_len: usize,
    /// Outbound bytes a writer may queue before reporting backpressure.
    /// Default: 8 MiB.
    pub high_water_mark: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_name_len: DEFAULT_MAX_NAME,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}

impl FrameConfig {
    /// Check a frame against the configured (not just the wire) limits.
    pub fn check(&self, frame: &Frame) -> Result<()> {
        if frame.payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.max_payload_size,
            });
        }
        if frame.channel.len() > self.max_name_len {
            return Err(FrameError::NameTooLong {
                size: frame.channel.len(),
                max: self.max_name_len,
            });
        }
        if frame.signature.len() > MAX_SIGNATURE {
            return Err(FrameError::SignatureTooLong {
                size: frame.signature.len(),
                max: MAX_SIGNATURE,
            });
        }
        Ok(())
    }
}

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic {found:02x?} (expected 0x5254 \"RT\")")]
    InvalidMagic { found: [u8; 2] },

    /// The kind byte is not a known frame kind.
    #[error("unknown frame kind {0}")]
    InvalidKind(u8),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The channel name exceeds the configured maximum length.
    #[error("channel name too long ({size} bytes, max {max})")]
    NameTooLong { size: usize, max: usize },

    /// The type signature exceeds the wire maximum.
    #[error("type signature too long ({size} bytes, max {max})")]
    SignatureTooLong { size: usize, max: usize },

    /// A header string is not valid UTF-8.
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    /// The outbound buffer is above the high-water mark.
    #[error("outbound buffer full ({buffered} bytes queued, high-water mark {limit})")]
    Backpressure { buffered: usize, limit: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether the error means the peer violated the wire protocol.
    ///
    /// Such a stream cannot be resynchronized and must be closed.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic { .. }
                | Self::InvalidKind(_)
                | Self::PayloadTooLarge { .. }
                | Self::NameTooLong { .. }
                | Self::SignatureTooLong { .. }
                | Self::InvalidUtf8 { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

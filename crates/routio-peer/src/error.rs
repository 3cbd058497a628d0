use routio_frame::FrameError;

/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// The remote side violated the wire protocol or the session hello.
    /// The offending connection has been closed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The outbound buffer of a connection is above its high-water mark.
    #[error("backpressure ({buffered} bytes queued, high-water mark {limit})")]
    Backpressure { buffered: usize, limit: usize },

    /// The client, handle or connection has been closed.
    #[error("closed")]
    Closed,

    /// A subscriber callback returned an error or panicked.
    #[error("callback on channel {channel} failed: {message}")]
    Application { channel: String, message: String },

    /// A payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] routio_message::DecodeError),

    /// Channel name or type signature is not acceptable.
    #[error("invalid channel: {0}")]
    InvalidChannel(String),

    /// The handler is already registered with an event loop.
    #[error("handler already attached to event loop {0}")]
    AlreadyAttached(u64),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] routio_transport::TransportError),

    /// Frame-level error that is not a protocol violation.
    #[error("frame error: {0}")]
    Frame(FrameError),

    /// Schema validation error.
    #[cfg(feature = "schema")]
    #[error("schema validation error: {0}")]
    Schema(#[from] routio_schema::SchemaError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PeerError {
    /// Whether the error closed a connection because of a protocol violation.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

impl From<FrameError> for PeerError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Backpressure { buffered, limit } => Self::Backpressure { buffered, limit },
            err if err.is_protocol_violation() => Self::Protocol(err.to_string()),
            err => Self::Frame(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;

/// Error type subscriber callbacks may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_violations_become_protocol_errors() {
        let err = PeerError::from(FrameError::PayloadTooLarge {
            size: 32,
            max: 16,
        });
        assert!(err.is_protocol());

        let err = PeerError::from(FrameError::Backpressure {
            buffered: 10,
            limit: 8,
        });
        assert!(matches!(
            err,
            PeerError::Backpressure {
                buffered: 10,
                limit: 8
            }
        ));

        let err = PeerError::from(FrameError::ConnectionClosed);
        assert!(matches!(err, PeerError::Frame(FrameError::ConnectionClosed)));
    }
}

use routio_message::DecodeError;

/// Errors that can occur while loading descriptors or applying them.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The descriptor file could not be loaded.
    #[error("failed to load schema: {0}")]
    LoadFailed(String),

    /// The descriptor is malformed or references something that cannot work.
    #[error("invalid schema descriptor: {0}")]
    CompileFailed(String),

    /// A record does not match its descriptor.
    #[error("validation failed for schema {schema}: {message}")]
    ValidationFailed { schema: String, message: String },

    /// The descriptor file is not valid JSON.
    #[error("descriptor is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// No descriptor registered under this id.
    #[error("no schema registered with id {0}")]
    NoSchema(String),

    /// Nested messages go deeper than the configured limit.
    #[error("schema {schema} nests deeper than {max} levels")]
    DepthExceeded { schema: String, max: usize },

    /// The payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

pub type Result<T> = std::result::Result<T, SchemaError>;

use crate::tag::FieldTag;

/// Errors raised while decoding a message or parsing a type signature.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// The buffer ended before the requested field was complete.
    #[error("buffer underrun: need {needed} bytes, {remaining} remaining")]
    Underrun { needed: usize, remaining: usize },

    /// A declared length or count points past the end of the buffer.
    #[error("declared length {declared} overruns buffer ({remaining} bytes remaining)")]
    Overrun { declared: usize, remaining: usize },

    /// The next field has a different type than the one requested.
    #[error("field tag mismatch: expected {expected}, found {found}")]
    TagMismatch { expected: FieldTag, found: FieldTag },

    /// The tag byte does not name any field kind.
    #[error("unknown field tag {0}")]
    UnknownTag(u8),

    /// A string field is not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// A char field is not a Unicode scalar value.
    #[error("invalid char code point {0:#x}")]
    InvalidChar(u32),

    /// Unknown tensor element type.
    #[error("unknown tensor dtype {0}")]
    InvalidDType(u8),

    /// Tensor shape does not agree with the amount of data.
    #[error("tensor shape {shape:?} needs {expected} bytes, got {actual}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    /// The text is not a valid type signature.
    #[error("invalid type signature '{0}'")]
    InvalidSignature(String),

    /// A dynamic value does not fit the requested type.
    #[error("value does not match type {expected}: {detail}")]
    ValueMismatch { expected: String, detail: String },
}

pub type Result<T> = std::result::Result<T, DecodeError>;

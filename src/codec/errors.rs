//! Codec errors

use thiserror::Error;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while encoding or decoding binary state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("Invalid {what} tag: {tag}")]
    InvalidTag { what: &'static str, tag: u8 },

    #[error("Invalid UTF-8 in encoded string")]
    InvalidUtf8,

    #[error("Negative length prefix: {0}")]
    NegativeLength(i32),

    #[error("Length {0} does not fit in a length prefix")]
    LengthOverflow(usize),

    #[error("Field count mismatch: expected {expected}, found {found}")]
    FieldCountMismatch { expected: usize, found: usize },

    #[error("Trailing bytes after decode: {0}")]
    TrailingBytes(usize),
}

impl CodecError {
    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            CodecError::UnexpectedEof { .. } => "SEARCHSTORE_CODEC_EOF",
            CodecError::InvalidTag { .. } => "SEARCHSTORE_CODEC_INVALID_TAG",
            CodecError::InvalidUtf8 => "SEARCHSTORE_CODEC_INVALID_UTF8",
            CodecError::NegativeLength(_) => "SEARCHSTORE_CODEC_NEGATIVE_LENGTH",
            CodecError::LengthOverflow(_) => "SEARCHSTORE_CODEC_LENGTH_OVERFLOW",
            CodecError::FieldCountMismatch { .. } => "SEARCHSTORE_CODEC_FIELD_COUNT",
            CodecError::TrailingBytes(_) => "SEARCHSTORE_CODEC_TRAILING_BYTES",
        }
    }
}

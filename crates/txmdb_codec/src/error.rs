//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during serialization or deserialization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The opaque-object encoder or decoder failed.
    ///
    /// This is never retried: the cause is local and unrecoverable
    /// (exhausted memory, a corrupted stream).
    #[error("serialization failed: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// A fixed-width value was read from a buffer of the wrong length.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Width of the encoding.
        expected: usize,
        /// Length of the buffer.
        actual: usize,
    },

    /// Text was not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,
}

impl CodecError {
    /// Create a serialization failed error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an invalid length error.
    pub fn invalid_length(actual: usize, expected: usize) -> Self {
        Self::InvalidLength { expected, actual }
    }
}

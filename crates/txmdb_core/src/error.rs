//! Error types for txmdb core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in txmdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Native storage error.
    #[error("storage error: {0}")]
    Storage(#[from] txmdb_storage::StorageError),

    /// Key or value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] txmdb_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The transaction handle is in a state that forbids the operation.
    #[error("illegal state: {message}")]
    IllegalState {
        /// Description of the violated precondition.
        message: String,
    },

    /// A write was requested against a read-only environment or transaction.
    #[error("unsupported operation: {message}")]
    Unsupported {
        /// Description of the rejected operation.
        message: String,
    },

    /// The environment has been closed.
    #[error("environment is closed")]
    EnvironmentClosed,

    /// The transaction handle has been closed.
    #[error("transaction handle is closed")]
    TransactionClosed,

    /// The environment configuration was rejected.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true for errors caused by use after close.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::EnvironmentClosed | Self::TransactionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            CoreError::illegal_state("no active transaction").to_string(),
            "illegal state: no active transaction"
        );
        assert_eq!(
            CoreError::unsupported("read-only").to_string(),
            "unsupported operation: read-only"
        );
        assert_eq!(
            CoreError::EnvironmentClosed.to_string(),
            "environment is closed"
        );
    }

    #[test]
    fn closed_classification() {
        assert!(CoreError::EnvironmentClosed.is_closed());
        assert!(CoreError::TransactionClosed.is_closed());
        assert!(!CoreError::illegal_state("x").is_closed());
    }

    #[test]
    fn wraps_lower_layers() {
        let err: CoreError = txmdb_codec::CodecError::InvalidUtf8.into();
        assert!(matches!(err, CoreError::Codec(_)));

        let err: CoreError = io::Error::from(io::ErrorKind::NotFound).into();
        assert!(matches!(err, CoreError::Io(_)));
    }
}

//! Error types for native storage operations.

use lmdb_master_sys as ffi;
use std::ffi::CStr;
use std::io;
use std::os::raw::c_int;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during native storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred outside the native library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The native library returned a non-zero status code.
    #[error("lmdb error {code}: {message}")]
    Lmdb {
        /// The raw return code (an errno value or an `MDB_*` code).
        code: i32,
        /// The text reported by `mdb_strerror`.
        message: String,
    },

    /// A child transaction was requested on a read-only transaction.
    #[error("read-only transactions cannot have nested transactions")]
    ReadOnlyParent,

    /// A path could not be handed to the native library.
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl StorageError {
    /// Creates an error from a native return code.
    pub fn from_code(code: c_int) -> Self {
        // SAFETY: mdb_strerror returns a pointer to a static or thread-local
        // NUL-terminated string for every code.
        let message = unsafe { CStr::from_ptr(ffi::mdb_strerror(code)) }
            .to_string_lossy()
            .into_owned();
        Self::Lmdb { code, message }
    }

    /// Returns the native return code, if this error came from the library.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Lmdb { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the environment map is full.
    #[must_use]
    pub fn is_map_full(&self) -> bool {
        self.code() == Some(ffi::MDB_MAP_FULL as c_int)
    }
}

/// Converts a native return code into a result.
pub(crate) fn lmdb_result(code: c_int) -> StorageResult<()> {
    if code == ffi::MDB_SUCCESS as c_int {
        Ok(())
    } else {
        Err(StorageError::from_code(code))
    }
}

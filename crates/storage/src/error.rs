//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No blob is stored under this key.
    #[display("blob not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Access denied by the filesystem.
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// The device has no space left for the blob.
    #[display("storage full: {}", _0.display())]
    StorageFull(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Key is empty or contains bytes that cannot be stored.
    #[display("invalid key: {_0:?}")]
    InvalidKey(#[error(not(source))] String),
    /// Store root is not an absolute directory.
    #[display("invalid store root: {}", _0.display())]
    InvalidRoot(#[error(not(source))] PathBuf),
    /// Entry metadata on disk could not be read back.
    #[display("corrupt entry metadata: {}", _0.display())]
    CorruptMetadata(#[error(not(source))] PathBuf),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::StorageFull(_))
    }

    /// Returns `true` if freeing space could make the operation succeed.
    pub fn is_out_of_space(&self) -> bool {
        matches!(self, Self::StorageFull(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::StorageFull(PathBuf::from("/cache")).is_retryable());
        assert!(ErrorKind::Io(IoError::other("disk on fire")).is_retryable());
        assert!(!ErrorKind::NotFound("https://cdn.example/a.png".to_string()).is_retryable());
        assert!(!ErrorKind::InvalidKey(String::new()).is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ErrorKind::NotFound("https://cdn.example/a.png".to_string()).to_string(),
            "blob not found: https://cdn.example/a.png"
        );
    }
}

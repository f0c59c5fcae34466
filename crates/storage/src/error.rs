//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Every object store implementation
//! maps its native failures onto these kinds so the engine never has to look
//! at SDK-specific error types.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Object does not exist
    #[display("object not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Bucket does not exist (or is not visible to these credentials)
    #[display("bucket not found: {_0}")]
    BucketNotFound(#[error(not(source))] String),
    /// Access denied (permissions or credentials)
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// Object key is empty, escapes its namespace, or contains invalid characters
    #[display("invalid key: {_0}")]
    InvalidKey(#[error(not(source))] String),
    /// Underlying I/O error (reading a local upload source, etc.)
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Network-related error (connections, timeouts, dispatch failures)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::BackendError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Network("timeout".to_string()), true)]
    #[case(ErrorKind::BackendError("SlowDown".to_string()), true)]
    #[case(ErrorKind::NotFound("a.txt".to_string()), false)]
    #[case(ErrorKind::BucketNotFound("assets".to_string()), false)]
    #[case(ErrorKind::InvalidKey("../a".to_string()), false)]
    fn test_is_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }
}

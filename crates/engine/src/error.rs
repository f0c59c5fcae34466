//! Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Every kind names the target it
//! belongs to, so a rejected result can be attributed without unwinding the
//! error tree.

use cloudsync_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};
use derive_more::{Display, Error};
use serde::Serialize;

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The step of a reconciliation pass that talked to the store.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[display("existence check")]
    Probe,
    #[display("listing")]
    List,
    #[display("upload")]
    Upload,
    #[display("delete")]
    Delete,
    #[display("tagging")]
    Tags,
    #[display("metadata update")]
    Metadata,
    #[display("bucket setup")]
    Setup,
}

/// Why a target's pass was rejected.
///
/// ### Target Errors
/// - [`ErrorKind::TargetNotFound`]
/// - [`ErrorKind::Enumeration`]
/// - [`ErrorKind::Transfer`]
/// - [`ErrorKind::RetryExhausted`]
///
/// ### Coordinator Errors
/// - [`ErrorKind::Disabled`]
/// - [`ErrorKind::Aborted`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The bucket does not exist; nothing was mutated.
    #[display("target not found: {_0}")]
    TargetNotFound(#[error(not(source))] String),
    /// Local files could not be enumerated (missing root, bad pattern,
    /// unstatable entry).
    #[display("could not enumerate local files for {_0}")]
    Enumeration(#[error(not(source))] String),
    /// A store call failed.
    #[display("{phase} failed for {target}")]
    Transfer { target: String, phase: Phase },
    /// Every attempt of the delete phase failed.
    #[display("delete failed for {target} after {attempts} attempts")]
    RetryExhausted { target: String, attempts: u32 },
    /// The configuration, or the target itself, is disabled.
    #[display("sync is disabled: {_0}")]
    Disabled(#[error(not(source))] String),
    /// The target's task panicked or was cancelled.
    #[display("reconciliation of {_0} was aborted")]
    Aborted(#[error(not(source))] String),
}

impl ErrorKind {
    /// Name of the target this error belongs to.
    pub fn target(&self) -> &str {
        match self {
            Self::TargetNotFound(target)
            | Self::Enumeration(target)
            | Self::Disabled(target)
            | Self::Aborted(target)
            | Self::Transfer { target, .. }
            | Self::RetryExhausted { target, .. } => target,
        }
    }
}

/// Raise a storage error into the engine's taxonomy: a missing bucket is
/// always [`TargetNotFound`](ErrorKind::TargetNotFound), anything else is a
/// [`Transfer`](ErrorKind::Transfer) failure of `phase`.
#[track_caller]
pub(crate) fn storage(err: StorageError, target: &str, phase: Phase) -> Error {
    let kind = match &*err {
        StorageErrorKind::BucketNotFound(_) => ErrorKind::TargetNotFound(target.to_string()),
        _ => ErrorKind::Transfer {
            target: target.to_string(),
            phase,
        },
    };
    err.raise(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StorageErrorKind::BucketNotFound("assets".to_string()), true)]
    #[case(StorageErrorKind::Network("reset".to_string()), false)]
    #[case(StorageErrorKind::PermissionDenied("assets".to_string()), false)]
    fn test_storage_classification(#[case] kind: StorageErrorKind, #[case] not_found: bool) {
        let err = storage(exn::Exn::from(kind), "assets", Phase::List);
        assert_eq!(matches!(&*err, ErrorKind::TargetNotFound(_)), not_found);
        assert_eq!(err.target(), "assets");
    }

    #[test]
    fn test_display() {
        let kind = ErrorKind::Transfer {
            target: "assets".to_string(),
            phase: Phase::Upload,
        };
        assert_eq!(kind.to_string(), "upload failed for assets");
        let kind = ErrorKind::RetryExhausted {
            target: "assets".to_string(),
            attempts: 3,
        };
        assert_eq!(kind.to_string(), "delete failed for assets after 3 attempts");
    }
}

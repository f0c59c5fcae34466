//! Configuration Error Types

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The configuration source could not be found, read, or parsed.
    #[display("could not load configuration: {_0}")]
    Load(#[error(not(source))] String),
    /// The configuration parsed, but describes something that cannot be run.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
}

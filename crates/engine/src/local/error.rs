//! Error types for the [`local`](super) module.

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The working directory is missing or is not a directory.
    #[display("not a directory: {}", _0.display())]
    MissingRoot(#[error(not(source))] PathBuf),
    #[display("invalid source pattern: {_0}")]
    Pattern(#[error(not(source))] String),
    /// A matched entry could not be statted.
    #[display("could not stat {}", _0.display())]
    Stat(#[error(not(source))] PathBuf),
    /// The blocking walker task did not complete.
    Walk,
}

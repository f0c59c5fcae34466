use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not determine the working directory")]
    WorkingDirectory,
    #[display("could not initialise logging")]
    Logging,
    #[display("could not write the report")]
    Report,
}

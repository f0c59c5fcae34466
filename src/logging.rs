use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log to stderr, keeping stdout for the report.
///
/// Without `-v` the filter comes from `RUST_LOG`, defaulting to `info`.
pub fn init(verbosity: u8) -> Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info")),
        1 => EnvFilter::try_new("debug"),
        _ => EnvFilter::try_new("trace"),
    }
    .or_raise(|| ErrorKind::Logging)?;
    let fmt_layer = fmt::layer().with_target(true).with_writer(std::io::stderr).compact();
    tracing_subscriber::registry().with(filter).with(fmt_layer).try_init().or_raise(|| ErrorKind::Logging)?;
    Ok(())
}

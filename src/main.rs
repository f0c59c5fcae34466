//! cloudsync command-line interface.

mod cli;
mod error;
mod logging;
mod report;

use crate::cli::{Cli, Commands};
use crate::error::{ErrorKind, Result};
use crate::report::{Summary, render};
use clap::Parser;
use cloudsync_config::Config;
use cloudsync_engine::setup::{setup_all, teardown_all};
use cloudsync_engine::{Context, TargetResult, sync_all, sync_metadata_all, sync_tags_all};
use cloudsync_storage::BackendHandle;
use cloudsync_storage::backend::{S3Backend, S3Options};
use exn::ResultExt;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("warning: {e}");
    }
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:?}");
            ExitCode::FAILURE
        },
    }
}

/// Returns whether every target was fulfilled.
async fn run(cli: Cli) -> Result<bool> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let cwd = match cli.cwd {
        Some(cwd) => cwd,
        None => std::env::current_dir().or_raise(|| ErrorKind::WorkingDirectory)?,
    };
    let ctx = Context::from_settings(cwd, &config.sync);
    let backend = connect(&config).await;
    match cli.command {
        Commands::Sync => finish(&sync_all(backend, &config, &ctx).await, cli.json),
        Commands::Tags => finish(&sync_tags_all(backend, &config, &ctx).await, cli.json),
        Commands::Metadata => finish(&sync_metadata_all(backend, &config, &ctx).await, cli.json),
        Commands::Setup => finish(&setup_all(&backend, &config).await, cli.json),
        Commands::Teardown => finish(&teardown_all(&backend, &config).await, cli.json),
    }
}

async fn connect(config: &Config) -> BackendHandle {
    let options = S3Options {
        region: config.region.clone(),
        endpoint: config.endpoint_override(),
        credentials: config.credentials.as_ref().map(|c| (c.key_id.clone(), c.key_secret.clone())),
        force_path_style: config.offline,
    };
    tracing::debug!(offline = config.offline, endpoint = ?options.endpoint, "Connecting to object store");
    Arc::new(S3Backend::connect("s3", options).await)
}

fn finish<T: Serialize + Summary>(results: &[TargetResult<T>], json: bool) -> Result<bool> {
    println!("{}", render(results, json)?);
    Ok(results.iter().all(TargetResult::is_fulfilled))
}

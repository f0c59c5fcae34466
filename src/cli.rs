//! Command-line arguments.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Reconcile local files into S3 buckets.
#[derive(Parser, Debug)]
#[command(name = "cloudsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, global = true, env = "CLOUDSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory that source patterns are resolved against
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// More logging (-v debug, -vv trace); overrides RUST_LOG
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Upload new and changed files, delete stale objects
    Sync,
    /// Merge declared tags into each bucket's tag set
    Tags,
    /// Replace object metadata for targets that declare it
    Metadata,
    /// Create every target's bucket
    Setup,
    /// Purge and delete every target's bucket
    Teardown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&["cloudsync", "sync"], Commands::Sync)]
    #[case(&["cloudsync", "tags", "--json"], Commands::Tags)]
    #[case(&["cloudsync", "-vv", "metadata"], Commands::Metadata)]
    #[case(&["cloudsync", "--config", "sync.toml", "teardown"], Commands::Teardown)]
    fn test_parse(#[case] args: &[&str], #[case] expected: Commands) {
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.command, expected);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["cloudsync", "sync", "--cwd", "site", "-v", "--json"]).unwrap();
        assert_eq!(cli.cwd, Some(PathBuf::from("site")));
        assert_eq!(cli.verbose, 1);
        assert!(cli.json);
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["cloudsync"]).is_err());
    }
}

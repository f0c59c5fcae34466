//! Configuration loading and validation.
//!
//! Configuration is read from a single YAML, TOML or JSON file and then
//! overlaid with `CLOUDSYNC_`-prefixed environment variables (use `__` to
//! reach nested keys, e.g. `CLOUDSYNC_SYNC__UPLOAD_CONCURRENCY=8`). Every
//! loaded configuration is validated before it is handed out, so downstream
//! crates only ever see values that can actually be run.

pub mod error;
mod target;

pub use crate::target::{Action, StorageTarget};
use crate::error::{ErrorKind, Result};
use cloudsync_storage::validate_key;
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "CLOUDSYNC_";
const DEFAULT_FILE_NAME: &str = "cloudsync.yaml";

/// Explicit store credentials. When omitted, the default AWS provider chain
/// is used instead.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub key_id: String,
    pub key_secret: String,
}

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Uploads in flight per target.
    pub upload_concurrency: usize,
    /// Total attempts (not retries) for the delete phase.
    pub delete_attempts: u32,
    /// Pause between delete attempts.
    pub retry_backoff_ms: u64,
}
impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            upload_concurrency: 4,
            delete_attempts: 3,
            retry_backoff_ms: 200,
        }
    }
}

fn default_offline() -> bool {
    std::env::var_os("IS_OFFLINE").is_some()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Short-circuit every run without touching the store.
    #[serde(default)]
    pub disabled: bool,
    /// Talk to a local emulator instead of the real service. Defaults to
    /// whether `IS_OFFLINE` is set in the environment.
    #[serde(default = "default_offline")]
    pub offline: bool,
    /// Emulator endpoint; only used when `offline` is set.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(alias = "storages")]
    pub targets: Vec<StorageTarget>,
}

impl Config {
    /// Default configuration file location, e.g.
    /// `~/.config/cloudsync/cloudsync.yaml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "cloudsync").map(|dirs| dirs.config_dir().join(DEFAULT_FILE_NAME))
    }

    /// Load, overlay environment variables, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path().ok_or_raise(|| ErrorKind::Load("no home directory".to_string()))?,
        };
        // Figment treats a missing file as an empty one.
        if !path.is_file() {
            exn::bail!(ErrorKind::Load(format!("{} does not exist", path.display())));
        }
        tracing::debug!(path = %path.display(), "Loading configuration");
        let figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Figment::from(Yaml::file(&path)),
            Some("toml") => Figment::from(Toml::file(&path)),
            Some("json") => Figment::from(Json::file(&path)),
            _ => exn::bail!(ErrorKind::Load(format!("unsupported file type: {}", path.display()))),
        };
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate from an already assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load("could not parse configuration".to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            exn::bail!(ErrorKind::Invalid("at least one target is required".to_string()));
        }
        if self.sync.upload_concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("sync.upload_concurrency must be at least 1".to_string()));
        }
        if self.sync.delete_attempts == 0 {
            exn::bail!(ErrorKind::Invalid("sync.delete_attempts must be at least 1".to_string()));
        }
        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                exn::bail!(ErrorKind::Invalid("target name must not be empty".to_string()));
            }
            if !seen.insert((target.name.as_str(), target.key_prefix.trim_matches('/'))) {
                exn::bail!(ErrorKind::Invalid(format!("{}: declared more than once", target.name)));
            }
            if target.source_patterns.is_empty() || target.source_patterns.iter().any(|p| p.trim().is_empty()) {
                exn::bail!(ErrorKind::Invalid(format!("{}: patterns must be non-empty", target.name)));
            }
            if !target.key_prefix.trim_matches('/').is_empty() {
                validate_key(&target.key_prefix)
                    .or_raise(|| ErrorKind::Invalid(format!("{}: invalid prefix", target.name)))?;
            }
            if let Some(name) = target.ignore_files.iter().find(|name| !is_plain_file_name(name)) {
                exn::bail!(ErrorKind::Invalid(format!("{}: ignore file {name:?} must be a file name", target.name)));
            }
        }
        Ok(())
    }

    /// The endpoint to connect to: only ever set when running offline, in
    /// which case the configured endpoint wins over `AWS_ENDPOINT_URL`.
    pub fn endpoint_override(&self) -> Option<String> {
        if !self.offline {
            return None;
        }
        self.endpoint.clone().or_else(|| std::env::var("AWS_ENDPOINT_URL").ok())
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudsync_storage::AccessPolicy;
    use rstest::rstest;
    use std::io::Write;

    fn yaml(source: &str) -> Result<Config> {
        Config::from_figment(Figment::from(Yaml::string(source)))
    }

    #[test]
    fn test_minimal() {
        let config = yaml("targets:\n  - name: assets\n    patterns: [dist]\n").unwrap();
        assert!(!config.disabled);
        assert_eq!(config.sync, SyncSettings::default());
        let target = &config.targets[0];
        assert_eq!(target.name, "assets");
        assert_eq!(target.source_patterns, vec!["dist".to_string()]);
        assert_eq!(target.enabled_actions, vec![Action::Upload, Action::Delete]);
        assert!(target.enabled);
    }

    #[test]
    fn test_aliases_and_options() {
        let config = yaml(
            r#"
disabled: true
offline: true
endpoint: http://localhost:4566
region: eu-west-1
storages:
  - name: assets
    patterns: ["dist", "!dist/**/*.map"]
    prefix: static
    actions: [upload]
    acl: public-read
    default_content_type: text/plain
    tags: { team: web }
    metadata: { owner: web }
    gitignore: true
    ignore_files: [.syncignore]
"#,
        )
        .unwrap();
        assert!(config.disabled);
        assert_eq!(config.endpoint_override().as_deref(), Some("http://localhost:4566"));
        let target = &config.targets[0];
        assert_eq!(target.key_prefix, "static");
        assert_eq!(target.enabled_actions, vec![Action::Upload]);
        assert_eq!(target.access_policy, Some(AccessPolicy::PublicRead));
        assert_eq!(target.default_content_type.as_deref(), Some("text/plain"));
        assert_eq!(target.tags.get("team").map(String::as_str), Some("web"));
        assert_eq!(target.metadata.as_ref().and_then(|m| m.get("owner")).map(String::as_str), Some("web"));
        assert!(target.gitignore);
        assert_eq!(target.ignore_files, vec![".syncignore".to_string()]);
    }

    #[test]
    fn test_endpoint_ignored_online() {
        let config = yaml("offline: false\nendpoint: http://localhost:4566\ntargets:\n  - name: a\n    patterns: [x]\n")
            .unwrap();
        assert_eq!(config.endpoint_override(), None);
    }

    #[rstest]
    #[case("targets: []\n")]
    #[case("targets:\n  - name: ''\n    patterns: [dist]\n")]
    #[case("targets:\n  - name: a\n    patterns: []\n")]
    #[case("targets:\n  - name: a\n    patterns: ['  ']\n")]
    #[case("targets:\n  - name: a\n    patterns: [dist]\n    prefix: ../escape\n")]
    #[case("targets:\n  - name: a\n    patterns: [dist]\n    ignore_files: [sub/.ignore]\n")]
    #[case("targets:\n  - name: a\n    patterns: [dist]\n  - name: a\n    patterns: [src]\n")]
    #[case("sync:\n  upload_concurrency: 0\ntargets:\n  - name: a\n    patterns: [dist]\n")]
    #[case("sync:\n  delete_attempts: 0\ntargets:\n  - name: a\n    patterns: [dist]\n")]
    fn test_invalid(#[case] source: &str) {
        let err = yaml(source).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_same_bucket_different_prefixes() {
        let source = "targets:\n  - name: a\n    patterns: [dist]\n    prefix: one\n  - name: a\n    patterns: [src]\n    prefix: two\n";
        assert_eq!(yaml(source).unwrap().targets.len(), 2);
    }

    #[test]
    fn test_unknown_action() {
        let err = yaml("targets:\n  - name: a\n    patterns: [dist]\n    actions: [rename]\n").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load(_)));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "region = \"eu-west-1\"\n\n[[targets]]\nname = \"assets\"\npatterns = [\"dist\"]").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.targets[0].name, "assets");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load(_)));
    }

    #[test]
    fn test_load_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load(_)));
    }

    #[rstest]
    #[case(".syncignore", true)]
    #[case(".gitignore", true)]
    #[case("", false)]
    #[case("..", false)]
    #[case("a/b", false)]
    fn test_plain_file_name(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_plain_file_name(name), expected);
    }
}

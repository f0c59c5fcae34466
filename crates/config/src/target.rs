use cloudsync_storage::AccessPolicy;
use derive_more::Display;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A mutation the engine may apply to a target's bucket.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[display("upload")]
    Upload,
    #[display("delete")]
    Delete,
}

fn default_actions() -> Vec<Action> {
    vec![Action::Upload, Action::Delete]
}

fn default_true() -> bool {
    true
}

/// One bucket, the local files that belong in it, and the policy for getting
/// them there.
///
/// ```yaml
/// name: my-site-assets
/// patterns: ["dist", "!dist/**/*.map"]
/// prefix: static
/// actions: [upload]
/// acl: public-read
/// tags:
///   team: web
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageTarget {
    /// Bucket name.
    pub name: String,
    /// Glob patterns, relative to the working directory. Patterns starting
    /// with `!` exclude; patterns naming a directory include its contents.
    #[serde(alias = "patterns")]
    pub source_patterns: Vec<String>,
    /// Prepended (with a `/`) to every uploaded key, and scopes listing.
    #[serde(default, alias = "prefix")]
    pub key_prefix: String,
    #[serde(default = "default_actions", alias = "actions")]
    pub enabled_actions: Vec<Action>,
    /// Canned ACL applied to uploaded and metadata-updated objects.
    #[serde(default, alias = "acl")]
    pub access_policy: Option<AccessPolicy>,
    /// Content type used when a key's extension is not recognised.
    #[serde(default)]
    pub default_content_type: Option<String>,
    /// Merged into the bucket's tag set, and applied to uploaded objects.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// When present, replaces the metadata of every object in the namespace.
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Honour `.gitignore` files found while walking.
    #[serde(default)]
    pub gitignore: bool,
    /// Additional ignore-file names (gitignore syntax), e.g. `.syncignore`.
    #[serde(default)]
    pub ignore_files: Vec<String>,
}

impl StorageTarget {
    pub fn new(name: impl Into<String>, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            source_patterns: patterns.into_iter().map(Into::into).collect(),
            key_prefix: String::new(),
            enabled_actions: default_actions(),
            access_policy: None,
            default_content_type: None,
            tags: BTreeMap::new(),
            metadata: None,
            enabled: true,
            gitignore: false,
            ignore_files: Vec::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.enabled_actions = actions.into_iter().collect();
        self
    }

    pub fn with_access_policy(mut self, policy: AccessPolicy) -> Self {
        self.access_policy = Some(policy);
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        self.tags = tags.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    pub fn with_metadata(mut self, metadata: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        self.metadata = Some(metadata.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    pub fn with_gitignore(mut self, gitignore: bool) -> Self {
        self.gitignore = gitignore;
        self
    }

    pub fn with_ignore_file(mut self, name: impl Into<String>) -> Self {
        self.ignore_files.push(name.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether `action` is enabled for this target.
    pub fn allows(&self, action: Action) -> bool {
        self.enabled_actions.contains(&action)
    }
}

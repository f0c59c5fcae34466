use crate::local::LocalFile;
use cloudsync_storage::RemoteObject;
use derive_more::Display;
use serde::Serialize;

/// Identity of an object for diffing: `"{key}-{digest}"`.
///
/// Two fingerprints are equal exactly when the key and the normalized
/// content digest both match, so a renamed file and an edited file both show
/// up as differences.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(key: &str, digest: &str) -> Self {
        Self(format!("{key}-{}", normalize_digest(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&LocalFile> for Fingerprint {
    fn from(file: &LocalFile) -> Self {
        Self::new(&file.key, &file.content_hash)
    }
}

impl From<&RemoteObject> for Fingerprint {
    fn from(object: &RemoteObject) -> Self {
        Self::new(&object.key, &object.etag)
    }
}

/// Strips the quotes stores wrap entity tags in, and lowercases the hex.
pub fn normalize_digest(digest: &str) -> String {
    digest.chars().filter(|c| *c != '"').collect::<String>().trim().to_ascii_lowercase()
}

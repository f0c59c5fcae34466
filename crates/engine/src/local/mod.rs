//! Local file enumeration.
//!
//! Source patterns are resolved against a working directory on the blocking
//! pool, then every selected file is hashed with streaming async reads.
//! Files that cannot be read are reported as [`SkippedFile`]s rather than
//! failing the whole target.

pub(crate) mod error;
mod hash;
mod walk;

use self::error::{ErrorKind, Result};
use crate::HASH_CONCURRENCY;
use crate::error::{ErrorKind as EngineErrorKind, Result as EngineResult};
use cloudsync_config::StorageTarget;
use cloudsync_storage::join_key;
use exn::ResultExt;
use futures::{StreamExt, stream};
use serde::Serialize;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// A local file selected for a target, keyed the way it is stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalFile {
    /// `/`-separated path relative to the working directory, prefixed with
    /// the target's key prefix.
    pub key: String,
    pub local_path: PathBuf,
    /// Lowercase hex MD5 of the contents.
    pub content_hash: String,
    pub size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
}

/// A file that matched but could not be read, hashed, or keyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}
impl SkippedFile {
    pub(crate) fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Enumeration {
    /// Sorted by path.
    pub files: Vec<LocalFile>,
    pub skipped: Vec<SkippedFile>,
}

/// Enumerate and hash every local file selected by `target`'s patterns.
pub async fn enumerate(target: &StorageTarget, cwd: &Path) -> EngineResult<Enumeration> {
    enumerate_inner(target, cwd).await.or_raise(|| EngineErrorKind::Enumeration(target.name.clone()))
}

async fn enumerate_inner(target: &StorageTarget, cwd: &Path) -> Result<Enumeration> {
    if !tokio::fs::metadata(cwd).await.is_ok_and(|metadata| metadata.is_dir()) {
        exn::bail!(ErrorKind::MissingRoot(cwd.to_path_buf()));
    }
    let (walk_target, root) = (target.clone(), cwd.to_path_buf());
    let walked = tokio::task::spawn_blocking(move || walk::walk(&walk_target, &root))
        .await
        .or_raise(|| ErrorKind::Walk)??;

    let hashed: Vec<_> = stream::iter(walked.candidates)
        .map(|candidate| async move {
            let digest = hash::md5_file(&candidate.path).await;
            (candidate, digest)
        })
        .buffered(HASH_CONCURRENCY)
        .collect()
        .await;

    let mut enumeration = Enumeration {
        files: Vec::with_capacity(hashed.len()),
        skipped: walked.skipped,
    };
    for (candidate, digest) in hashed {
        let reason = match (digest, join_key(&target.key_prefix, &candidate.relative)) {
            (Ok(content_hash), Ok(key)) => {
                enumeration.files.push(LocalFile {
                    key,
                    local_path: candidate.path,
                    content_hash,
                    size: candidate.size,
                    last_modified: candidate.modified,
                });
                continue;
            },
            (Err(e), _) => e.to_string(),
            (_, Err(e)) => e.to_string(),
        };
        tracing::warn!(bucket = %target.name, path = %candidate.path.display(), reason = %reason, "Skipping unreadable file");
        enumeration.skipped.push(SkippedFile::new(candidate.path, reason));
    }
    tracing::debug!(bucket = %target.name, files = enumeration.files.len(), skipped = enumeration.skipped.len(), "Enumerated local files");
    Ok(enumeration)
}

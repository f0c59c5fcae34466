//! Delete executor.
//!
//! In a versioned bucket deleting the current object only hides it behind a
//! delete marker, so stale keys are purged along with every version and
//! marker they have. Uploads from the same pass are protected: when a
//! changed file is re-uploaded under the same key, only its older versions
//! go.

use crate::error::{self, ErrorKind, Phase, Result};
use crate::normalize_digest;
use cloudsync_config::StorageTarget;
use cloudsync_storage::error::Result as StorageResult;
use cloudsync_storage::{
    BackendHandle, DeleteReport, ObjectIdentifier, RemoteObject, UploadedObject, VersionListing, key_namespace,
};
use exn::ResultExt;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(200);

/// How often (and how patiently) the delete phase is attempted.
///
/// Every attempt restarts from the version listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts every attempt, including the first, and is at
    /// least one.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_BACKOFF)
    }
}

/// Build the bulk delete batch for `stale` objects.
///
/// The batch holds, in order:
/// 1. each stale object, resolved through its entity tag to the matching
///    version(s), or by key alone if no listed version carries that tag;
/// 2. every delete marker of a stale key;
/// 3. every version of a stale key.
///
/// Versions written by `protected` uploads are never included: the exact
/// version id when the store returned one, otherwise the latest version of
/// that key. Keys that were re-uploaded are also never deleted by key alone.
/// Exact duplicates are removed.
pub fn deletion_batch(
    stale: &[RemoteObject],
    listing: &VersionListing,
    protected: &[UploadedObject],
) -> Vec<ObjectIdentifier> {
    let stale_keys: HashSet<&str> = stale.iter().map(|object| object.key.as_str()).collect();
    let rewritten: HashMap<&str, Option<&str>> =
        protected.iter().map(|uploaded| (uploaded.key.as_str(), uploaded.version_id.as_deref())).collect();
    let is_protected = |key: &str, version_id: &str, is_latest: bool| match rewritten.get(key) {
        Some(Some(written)) => version_id == *written,
        Some(None) => is_latest,
        None => false,
    };

    let hints = stale.iter().flat_map(|object| {
        let digest = normalize_digest(&object.etag);
        let matching: Vec<ObjectIdentifier> = listing
            .versions
            .iter()
            .filter(|version| version.key == object.key)
            .filter(|version| version.etag.as_deref().is_some_and(|etag| normalize_digest(etag) == digest))
            .filter(|version| !is_protected(&version.key, &version.version_id, version.is_latest))
            .map(|version| ObjectIdentifier::new(&version.key).with_version(&version.version_id))
            .collect();
        let by_key = matching.is_empty()
            && !rewritten.contains_key(object.key.as_str())
            && !listing.versions.iter().any(|version| version.key == object.key && version.etag.is_some());
        by_key.then(|| ObjectIdentifier::new(&object.key)).into_iter().chain(matching)
    });
    let markers = listing
        .delete_markers
        .iter()
        .filter(|marker| stale_keys.contains(marker.key.as_str()))
        .map(|marker| ObjectIdentifier::new(&marker.key).with_version(&marker.version_id));
    let versions = listing
        .versions
        .iter()
        .filter(|version| stale_keys.contains(version.key.as_str()))
        .filter(|version| !is_protected(&version.key, &version.version_id, version.is_latest))
        .map(|version| ObjectIdentifier::new(&version.key).with_version(&version.version_id));

    let mut seen = HashSet::new();
    hints.chain(markers).chain(versions).filter(|id| seen.insert(id.clone())).collect()
}

/// Purge `stale` objects (and their history) from the target's namespace.
///
/// The whole list-then-delete sequence is retried per `policy` while the
/// store reports transient failures; per-item failures inside a successful
/// bulk delete are reported, not retried.
pub async fn delete_stale(
    backend: &BackendHandle,
    target: &StorageTarget,
    stale: &[RemoteObject],
    protected: &[UploadedObject],
    policy: &RetryPolicy,
) -> Result<DeleteReport> {
    if stale.is_empty() {
        return Ok(DeleteReport::default());
    }
    let namespace = key_namespace(&target.key_prefix).or_raise(|| ErrorKind::Transfer {
        target: target.name.clone(),
        phase: Phase::Delete,
    })?;
    let mut last_error = None;
    for attempt in 1..=policy.max_attempts {
        match attempt_delete(backend, &target.name, namespace.as_deref(), stale, protected).await {
            Ok(report) => {
                for failure in &report.failures {
                    tracing::warn!(bucket = %target.name, key = %failure.key, code = %failure.code, "Object not deleted");
                }
                tracing::info!(bucket = %target.name, deleted = report.deleted.len(), attempt, "Deleted stale objects");
                return Ok(report);
            },
            Err(e) if !e.is_retryable() => return Err(error::storage(e, &target.name, Phase::Delete)),
            Err(e) => {
                tracing::warn!(bucket = %target.name, attempt, max_attempts = policy.max_attempts, error = %e, "Delete attempt failed");
                last_error = Some(e);
                if attempt < policy.max_attempts && !policy.backoff.is_zero() {
                    tokio::time::sleep(policy.backoff).await;
                }
            },
        }
    }
    let kind = ErrorKind::RetryExhausted {
        target: target.name.clone(),
        attempts: policy.max_attempts,
    };
    match last_error {
        Some(e) => Err(e.raise(kind)),
        None => exn::bail!(kind),
    }
}

async fn attempt_delete(
    backend: &BackendHandle,
    bucket: &str,
    namespace: Option<&str>,
    stale: &[RemoteObject],
    protected: &[UploadedObject],
) -> StorageResult<DeleteReport> {
    let listing = backend.list_versions(bucket, namespace).await?;
    let batch = deletion_batch(stale, &listing, protected);
    if batch.is_empty() {
        return Ok(DeleteReport::default());
    }
    backend.delete_objects(bucket, &batch).await
}

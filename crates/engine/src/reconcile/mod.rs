//! Per-target orchestration.

mod fanout;

pub(crate) use self::fanout::reject_all;
pub use self::fanout::{Settled, TargetResult, sync_all, sync_metadata_all, sync_tags_all};
use crate::delete::delete_stale;
use crate::diff::{Diff, diff};
use crate::error::Result;
use crate::local::{Enumeration, LocalFile, SkippedFile, enumerate};
use crate::metadata::{SyncedMetadata, reconcile_metadata};
use crate::remote::{ensure_target_exists, list_remote};
use crate::tags::reconcile_tags;
use crate::upload::upload;
use crate::{Context, Fingerprint};
use cloudsync_config::{Action, StorageTarget};
use cloudsync_storage::{
    BackendHandle, DeleteFailure, DeleteReport, DeletedObject, RemoteObject, Tag, UploadedObject,
};
use serde::Serialize;
use std::collections::HashSet;
use tracing::instrument;

/// Who switched a target off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisabledReason {
    /// The target itself has `enabled: false`.
    Target,
    /// The whole configuration has `disabled: true`.
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Completed,
    Disabled(DisabledReason),
}

/// Everything one pass over a target saw and did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub target: String,
    pub status: Status,
    pub files: Vec<LocalFile>,
    pub objects: Vec<RemoteObject>,
    pub local_fingerprints: Vec<Fingerprint>,
    pub remote_fingerprints: Vec<Fingerprint>,
    pub files_to_upload: Vec<Fingerprint>,
    pub files_to_delete: Vec<Fingerprint>,
    pub uploaded: Vec<UploadedObject>,
    pub deleted: Vec<DeletedObject>,
    pub delete_failures: Vec<DeleteFailure>,
    pub skipped: Vec<SkippedFile>,
    /// `None` unless the target declares metadata.
    pub metadata: Option<Vec<SyncedMetadata>>,
    /// `None` unless the target declares tags.
    pub tags: Option<Vec<Tag>>,
}

impl SyncOutcome {
    pub(crate) fn disabled(target: &str, reason: DisabledReason) -> Self {
        Self {
            target: target.to_string(),
            status: Status::Disabled(reason),
            files: Vec::new(),
            objects: Vec::new(),
            local_fingerprints: Vec::new(),
            remote_fingerprints: Vec::new(),
            files_to_upload: Vec::new(),
            files_to_delete: Vec::new(),
            uploaded: Vec::new(),
            deleted: Vec::new(),
            delete_failures: Vec::new(),
            skipped: Vec::new(),
            metadata: None,
            tags: None,
        }
    }
}

/// Run one full reconciliation pass for `target`.
///
/// Uploads run before deletes so a changed file is never missing remotely;
/// the delete phase leaves the freshly written versions alone.
#[instrument(skip_all, fields(bucket = %target.name, prefix = %target.key_prefix))]
pub async fn reconcile_target(backend: &BackendHandle, target: &StorageTarget, ctx: &Context) -> Result<SyncOutcome> {
    if !target.enabled {
        tracing::info!("Target is disabled, skipping");
        return Ok(SyncOutcome::disabled(&target.name, DisabledReason::Target));
    }
    ensure_target_exists(backend, target).await?;
    let Enumeration { files, skipped } = enumerate(target, &ctx.cwd).await?;
    let objects = list_remote(backend, target).await?;

    let local_fingerprints: Vec<Fingerprint> = files.iter().map(Fingerprint::from).collect();
    let remote_fingerprints: Vec<Fingerprint> = objects.iter().map(Fingerprint::from).collect();
    let Diff { to_upload, to_delete } = diff(&local_fingerprints, &remote_fingerprints);
    tracing::info!(to_upload = to_upload.len(), to_delete = to_delete.len(), "Computed differences");

    let uploaded = match target.allows(Action::Upload) && !to_upload.is_empty() {
        true => upload(backend, target, &files, &to_upload, ctx.upload_concurrency).await?,
        false => Vec::new(),
    };
    let DeleteReport { deleted, failures } = match target.allows(Action::Delete) && !to_delete.is_empty() {
        true => {
            let wanted: HashSet<&Fingerprint> = to_delete.iter().collect();
            let stale: Vec<RemoteObject> =
                objects.iter().filter(|object| wanted.contains(&Fingerprint::from(*object))).cloned().collect();
            delete_stale(backend, target, &stale, &uploaded, &ctx.retry).await?
        },
        false => DeleteReport::default(),
    };
    let metadata = match target.metadata {
        Some(_) => Some(reconcile_metadata(backend, target, ctx.upload_concurrency).await?),
        None => None,
    };
    let tags = match target.tags.is_empty() {
        true => None,
        false => Some(reconcile_tags(backend, target).await?),
    };

    Ok(SyncOutcome {
        target: target.name.clone(),
        status: Status::Completed,
        files,
        objects,
        local_fingerprints,
        remote_fingerprints,
        files_to_upload: to_upload,
        files_to_delete: to_delete,
        uploaded,
        deleted,
        delete_failures: failures,
        skipped,
        metadata,
        tags,
    })
}

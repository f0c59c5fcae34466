//! Object metadata reconciliation.

use crate::error::{self, Phase, Result};
use crate::remote::list_remote;
use crate::upload::content_type_for;
use cloudsync_config::StorageTarget;
use cloudsync_storage::{BackendHandle, CopyMetadata, RemoteObject};
use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use std::collections::BTreeMap;

/// Metadata observed on an object after it was replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncedMetadata {
    pub key: String,
    pub bucket: String,
    pub metadata: BTreeMap<String, String>,
}

/// Replace the metadata of every object in the target's namespace with the
/// declared metadata. Does nothing when the target declares none or is
/// disabled.
pub async fn reconcile_metadata(
    backend: &BackendHandle,
    target: &StorageTarget,
    concurrency: usize,
) -> Result<Vec<SyncedMetadata>> {
    let Some(declared) = target.metadata.as_ref().filter(|_| target.enabled) else {
        return Ok(Vec::new());
    };
    let objects = list_remote(backend, target).await?;
    let pending: Vec<_> = objects.iter().map(|object| replace(backend, target, object, declared)).collect();
    stream::iter(pending)
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

async fn replace(
    backend: &BackendHandle,
    target: &StorageTarget,
    object: &RemoteObject,
    declared: &BTreeMap<String, String>,
) -> Result<SyncedMetadata> {
    let request = CopyMetadata {
        bucket: target.name.clone(),
        key: object.key.clone(),
        content_type: content_type_for(&object.key, target.default_content_type.as_deref()),
        metadata: declared.clone(),
        acl: target.access_policy,
    };
    backend.replace_metadata(request).await.map_err(|e| error::storage(e, &target.name, Phase::Metadata))?;
    let head = backend
        .head_object(&target.name, &object.key)
        .await
        .map_err(|e| error::storage(e, &target.name, Phase::Metadata))?;
    tracing::debug!(bucket = %target.name, key = %object.key, "Replaced object metadata");
    Ok(SyncedMetadata {
        key: object.key.clone(),
        bucket: target.name.clone(),
        metadata: head.metadata,
    })
}

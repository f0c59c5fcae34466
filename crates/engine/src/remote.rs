//! Remote state probes.

use crate::error::{self, ErrorKind, Phase, Result};
use cloudsync_config::StorageTarget;
use cloudsync_storage::{BackendHandle, RemoteObject, key_namespace};
use exn::ResultExt;

/// Fail with [`ErrorKind::TargetNotFound`] unless the target's bucket exists.
///
/// An empty listing cannot tell a missing bucket from an empty one, so this
/// asks the bucket listing explicitly before anything is mutated.
pub async fn ensure_target_exists(backend: &BackendHandle, target: &StorageTarget) -> Result<()> {
    let exists = backend.bucket_exists(&target.name).await.map_err(|e| error::storage(e, &target.name, Phase::Probe))?;
    if !exists {
        tracing::warn!(backend = backend.name(), bucket = %target.name, "Bucket does not exist");
        exn::bail!(ErrorKind::TargetNotFound(target.name.clone()));
    }
    Ok(())
}

/// Every current object in the target's namespace.
pub async fn list_remote(backend: &BackendHandle, target: &StorageTarget) -> Result<Vec<RemoteObject>> {
    let namespace = key_namespace(&target.key_prefix).or_raise(|| ErrorKind::Transfer {
        target: target.name.clone(),
        phase: Phase::List,
    })?;
    let objects = backend
        .list_objects(&target.name, namespace.as_deref())
        .await
        .map_err(|e| error::storage(e, &target.name, Phase::List))?;
    tracing::debug!(backend = backend.name(), bucket = %target.name, objects = objects.len(), "Listed remote objects");
    Ok(objects)
}

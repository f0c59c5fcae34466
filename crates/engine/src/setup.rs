//! Bucket setup and teardown tooling.
//!
//! Not part of a reconciliation pass; used to prepare (and clean up) buckets
//! for targets, e.g. against a local emulator.

use crate::error::{self, ErrorKind, Phase, Result};
use crate::reconcile::{Settled, TargetResult, reject_all};
use cloudsync_config::{Config, StorageTarget};
use cloudsync_storage::{BackendHandle, DeleteReport, ObjectIdentifier};
use std::future::Future;

/// Create the bucket of every enabled target, one target at a time.
pub async fn setup_all(backend: &BackendHandle, config: &Config) -> Vec<TargetResult<()>> {
    each_enabled(config, |target| create_target(backend, target)).await
}

/// Destroy the bucket of every enabled target, one target at a time.
pub async fn teardown_all(backend: &BackendHandle, config: &Config) -> Vec<TargetResult<DeleteReport>> {
    each_enabled(config, |target| destroy_target(backend, target)).await
}

/// Disabled targets (or a disabled configuration) are rejected without
/// touching the store.
async fn each_enabled<'a, T, F, Fut>(config: &'a Config, mut run: F) -> Vec<TargetResult<T>>
where
    F: FnMut(&'a StorageTarget) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if config.disabled {
        return reject_all(&config.targets);
    }
    let mut results = Vec::with_capacity(config.targets.len());
    for target in &config.targets {
        let settled = match target.enabled {
            true => match run(target).await {
                Ok(value) => Settled::Fulfilled(value),
                Err(err) => Settled::Rejected(err),
            },
            false => {
                tracing::info!(bucket = %target.name, "Target is disabled, skipping");
                Settled::Rejected(exn::Exn::from(ErrorKind::Disabled(target.name.clone())))
            },
        };
        results.push(TargetResult {
            target: target.name.clone(),
            settled,
        });
    }
    results
}

/// Create the target's bucket: object lock enabled, owner-preferred
/// ownership, private ACL.
pub async fn create_target(backend: &BackendHandle, target: &StorageTarget) -> Result<()> {
    backend.create_bucket(&target.name).await.map_err(|e| error::storage(e, &target.name, Phase::Setup))?;
    tracing::info!(bucket = %target.name, "Created target bucket");
    Ok(())
}

/// Purge every object, version, and delete marker from the target's bucket
/// (regardless of prefix), then delete the bucket itself.
pub async fn destroy_target(backend: &BackendHandle, target: &StorageTarget) -> Result<DeleteReport> {
    let listing = backend.list_versions(&target.name, None).await.map_err(|e| error::storage(e, &target.name, Phase::Setup))?;
    let batch: Vec<ObjectIdentifier> = listing
        .delete_markers
        .iter()
        .map(|marker| ObjectIdentifier::new(&marker.key).with_version(&marker.version_id))
        .chain(listing.versions.iter().map(|version| ObjectIdentifier::new(&version.key).with_version(&version.version_id)))
        .collect();
    let report = match batch.is_empty() {
        true => DeleteReport::default(),
        false => backend
            .delete_objects(&target.name, &batch)
            .await
            .map_err(|e| error::storage(e, &target.name, Phase::Setup))?,
    };
    backend.delete_bucket(&target.name).await.map_err(|e| error::storage(e, &target.name, Phase::Setup))?;
    tracing::info!(bucket = %target.name, purged = report.deleted.len(), "Destroyed target bucket");
    Ok(report)
}

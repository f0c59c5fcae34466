//! Concurrent passes over every configured target.
//!
//! Each target runs in its own task, so a failure (or panic) in one pass
//! never affects another. Results come back in configuration order.

use super::{DisabledReason, SyncOutcome, reconcile_target};
use crate::Context;
use crate::error::{Error, ErrorKind, Result};
use crate::metadata::{SyncedMetadata, reconcile_metadata};
use crate::tags::reconcile_tags;
use cloudsync_config::{Config, StorageTarget};
use cloudsync_storage::{BackendHandle, Tag};
use std::future::Future;

/// How a target's pass ended.
#[derive(Debug)]
pub enum Settled<T> {
    Fulfilled(T),
    Rejected(Error),
}

#[derive(Debug)]
pub struct TargetResult<T> {
    pub target: String,
    pub settled: Settled<T>,
}

impl<T> TargetResult<T> {
    fn fulfilled(target: &str, value: T) -> Self {
        Self {
            target: target.to_string(),
            settled: Settled::Fulfilled(value),
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self.settled, Settled::Fulfilled(_))
    }

    pub fn value(&self) -> Option<&T> {
        match &self.settled {
            Settled::Fulfilled(value) => Some(value),
            Settled::Rejected(_) => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.settled {
            Settled::Fulfilled(_) => None,
            Settled::Rejected(err) => Some(err),
        }
    }
}

/// Reconcile every configured target.
///
/// A globally disabled configuration makes no store calls and reports every
/// target as [`Disabled`](super::Status::Disabled).
pub async fn sync_all(backend: BackendHandle, config: &Config, ctx: &Context) -> Vec<TargetResult<SyncOutcome>> {
    if config.disabled {
        tracing::info!("Sync is disabled, skipping every target");
        return config
            .targets
            .iter()
            .map(|target| TargetResult::fulfilled(&target.name, SyncOutcome::disabled(&target.name, DisabledReason::Global)))
            .collect();
    }
    fan_out(backend, &config.targets, ctx, |backend, target, ctx| async move {
        reconcile_target(&backend, &target, &ctx).await
    })
    .await
}

/// Merge every target's declared tags into its bucket's tag set.
pub async fn sync_tags_all(backend: BackendHandle, config: &Config, ctx: &Context) -> Vec<TargetResult<Vec<Tag>>> {
    if config.disabled {
        return reject_all(&config.targets);
    }
    fan_out(backend, &config.targets, ctx, |backend, target, _| async move {
        reconcile_tags(&backend, &target).await
    })
    .await
}

/// Replace object metadata for every target that declares some.
pub async fn sync_metadata_all(
    backend: BackendHandle,
    config: &Config,
    ctx: &Context,
) -> Vec<TargetResult<Vec<SyncedMetadata>>> {
    if config.disabled {
        return reject_all(&config.targets);
    }
    fan_out(backend, &config.targets, ctx, |backend, target, ctx| async move {
        reconcile_metadata(&backend, &target, ctx.upload_concurrency).await
    })
    .await
}

pub(crate) fn reject_all<T>(targets: &[StorageTarget]) -> Vec<TargetResult<T>> {
    tracing::info!("Sync is disabled, rejecting every target");
    targets
        .iter()
        .map(|target| TargetResult {
            target: target.name.clone(),
            settled: Settled::Rejected(exn::Exn::from(ErrorKind::Disabled(target.name.clone()))),
        })
        .collect()
}

async fn fan_out<T, F, Fut>(backend: BackendHandle, targets: &[StorageTarget], ctx: &Context, run: F) -> Vec<TargetResult<T>>
where
    F: Fn(BackendHandle, StorageTarget, Context) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let (names, tasks): (Vec<_>, Vec<_>) = targets
        .iter()
        .map(|target| (target.name.clone(), tokio::spawn(run(backend.clone(), target.clone(), ctx.clone()))))
        .unzip();
    let joined = futures::future::join_all(tasks).await;
    let results = names
        .into_iter()
        .zip(joined)
        .map(|(target, joined)| {
            let settled = match joined {
                Ok(Ok(value)) => Settled::Fulfilled(value),
                Ok(Err(err)) => {
                    tracing::error!(bucket = %target, error = ?err, "Target failed");
                    Settled::Rejected(err)
                },
                Err(join_error) => {
                    tracing::error!(bucket = %target, error = %join_error, "Target task aborted");
                    Settled::Rejected(exn::Exn::from(join_error).raise(ErrorKind::Aborted(target.clone())))
                },
            };
            TargetResult { target, settled }
        })
        .collect();
    let name = backend.name().to_string();
    drop(backend);
    tracing::debug!(backend = %name, "Released store handle");
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RetryPolicy;
    use crate::reconcile::Status;
    use cloudsync_storage::backend::{MockBackend, StorageBackend};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(targets: Vec<StorageTarget>) -> Config {
        Config {
            disabled: false,
            offline: false,
            endpoint: None,
            region: None,
            credentials: None,
            sync: Default::default(),
            targets,
        }
    }

    fn context(dir: &TempDir) -> Context {
        Context::new(dir.path()).with_retry(RetryPolicy::new(3, Duration::ZERO))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_target_isolation() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let mock = Arc::new(MockBackend::default().with_bucket("present"));
        let config = config(vec![StorageTarget::new("missing", ["a.txt"]), StorageTarget::new("present", ["a.txt"])]);
        let results = sync_all(mock.clone(), &config, &context(&dir)).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].target, "missing");
        assert!(matches!(results[0].error().map(|e| &**e), Some(ErrorKind::TargetNotFound(_))));
        assert_eq!(results[1].target, "present");
        assert_eq!(results[1].value().unwrap().uploaded.len(), 1);
        assert_eq!(mock.keys("present").await, vec!["a.txt".to_string()]);
        assert_eq!(Arc::strong_count(&mock), 1);
    }

    #[tokio::test]
    async fn test_globally_disabled_makes_no_calls() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::default().with_bucket("assets"));
        let mut config = config(vec![StorageTarget::new("assets", ["."]), StorageTarget::new("other", ["."])]);
        config.disabled = true;
        let results = sync_all(mock.clone(), &config, &context(&dir)).await;
        assert!(results.iter().all(|r| r.value().unwrap().status == Status::Disabled(DisabledReason::Global)));
        let tags = sync_tags_all(mock.clone(), &config, &context(&dir)).await;
        assert!(tags.iter().all(|r| matches!(r.error().map(|e| &**e), Some(ErrorKind::Disabled(_)))));
        let metadata = sync_metadata_all(mock.clone(), &config, &context(&dir)).await;
        assert!(metadata.iter().all(|r| !r.is_fulfilled()));
        assert_eq!(mock.total_calls().await, 0);
    }

    #[tokio::test]
    async fn test_disabled_target_skipped_by_tag_and_metadata_passes() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::default().with_bucket("assets").with_object("assets", "a.txt", b"a"));
        let config = config(vec![
            StorageTarget::new("assets", ["."])
                .with_tags([("team", "web")])
                .with_metadata([("owner", "web")])
                .with_enabled(false),
        ]);
        let tags = sync_tags_all(mock.clone(), &config, &context(&dir)).await;
        assert_eq!(tags[0].value(), Some(&Vec::new()));
        let metadata = sync_metadata_all(mock.clone(), &config, &context(&dir)).await;
        assert!(metadata[0].value().unwrap().is_empty());
        assert_eq!(mock.total_calls().await, 0);
        assert_eq!(mock.get_bucket_tagging("assets").await.unwrap(), None);
    }

    #[test]
    fn test_passes_can_be_spawned() {
        fn spawnable<F: Future + Send + 'static>(_: F) {}
        let backend: BackendHandle = Arc::new(MockBackend::default());
        let target = StorageTarget::new("assets", ["."]);
        let ctx = Context::new(".");
        spawnable({
            let (backend, target, ctx) = (backend.clone(), target.clone(), ctx.clone());
            async move { reconcile_target(&backend, &target, &ctx).await }
        });
        spawnable(async move { reconcile_metadata(&backend, &target, ctx.upload_concurrency).await });
    }

    #[tokio::test]
    async fn test_tag_pass() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::default().with_bucket("assets"));
        let config = config(vec![StorageTarget::new("assets", ["."]).with_tags([("team", "web")])]);
        let results = sync_tags_all(mock.clone(), &config, &context(&dir)).await;
        assert_eq!(results[0].value(), Some(&vec![Tag::new("team", "web")]));
    }

    #[tokio::test]
    async fn test_metadata_pass() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::default().with_bucket("assets").with_object("assets", "a.txt", b"a"));
        let config = config(vec![
            StorageTarget::new("assets", ["."]).with_metadata([("owner", "web")]),
            StorageTarget::new("assets", ["."]).with_prefix("plain"),
        ]);
        let results = sync_metadata_all(mock.clone(), &config, &context(&dir)).await;
        assert_eq!(results[0].value().unwrap().len(), 1);
        assert!(results[1].value().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_task_is_aborted() {
        let dir = TempDir::new().unwrap();
        let backend: BackendHandle = Arc::new(MockBackend::default());
        let targets = vec![StorageTarget::new("boom", ["."]), StorageTarget::new("fine", ["."])];
        let results = fan_out(backend, &targets, &context(&dir), |_, target, _| async move {
            if target.name == "boom" {
                panic!("boom");
            }
            Ok(target.name)
        })
        .await;
        assert!(matches!(results[0].error().map(|e| &**e), Some(ErrorKind::Aborted(name)) if name == "boom"));
        assert_eq!(results[1].value().map(String::as_str), Some("fine"));
    }
}

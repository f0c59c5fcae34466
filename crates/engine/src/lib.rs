//! One-way reconciliation of local file sets into object store buckets.
//!
//! A pass over a [`StorageTarget`] enumerates and hashes the local files,
//! lists what the bucket already holds under the target's prefix, and then
//! uploads whatever is new or changed and deletes whatever went stale.
//! [`sync_all`] runs one pass per configured target concurrently and reports
//! a settled result for each of them.

pub mod delete;
pub mod diff;
pub mod error;
mod fingerprint;
pub mod local;
pub mod metadata;
mod reconcile;
pub mod remote;
pub mod setup;
pub mod tags;
pub mod upload;

pub use crate::delete::RetryPolicy;
pub use crate::fingerprint::{Fingerprint, normalize_digest};
pub use crate::reconcile::{
    DisabledReason, Settled, Status, SyncOutcome, TargetResult, reconcile_target, sync_all, sync_metadata_all,
    sync_tags_all,
};
use cloudsync_config::SyncSettings;
pub use cloudsync_config::{Action, Config, StorageTarget};
use std::path::PathBuf;
use std::time::Duration;

/// Local files hashed concurrently per target.
pub const HASH_CONCURRENCY: usize = 16;
const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;

/// Everything a pass needs besides the store and the target itself.
#[derive(Debug, Clone)]
pub struct Context {
    /// Directory that source patterns are resolved against.
    pub cwd: PathBuf,
    /// Uploads in flight per target.
    pub upload_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Context {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_settings(cwd: impl Into<PathBuf>, settings: &SyncSettings) -> Self {
        Self::new(cwd)
            .with_upload_concurrency(settings.upload_concurrency)
            .with_retry(RetryPolicy::new(settings.delete_attempts, Duration::from_millis(settings.retry_backoff_ms)))
    }

    pub fn with_upload_concurrency(mut self, concurrency: usize) -> Self {
        self.upload_concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings() {
        let settings = SyncSettings {
            upload_concurrency: 0,
            delete_attempts: 5,
            retry_backoff_ms: 10,
        };
        let ctx = Context::from_settings("/srv/site", &settings);
        assert_eq!(ctx.upload_concurrency, 1);
        assert_eq!(ctx.retry.max_attempts(), 5);
        assert_eq!(ctx.retry.backoff(), Duration::from_millis(10));
    }
}

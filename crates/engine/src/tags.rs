//! Bucket tag reconciliation.

use crate::error::{self, Phase, Result};
use crate::remote::ensure_target_exists;
use cloudsync_config::StorageTarget;
use cloudsync_storage::{BackendHandle, Tag};

/// Merge `declared` on top of `existing`.
///
/// Declared keys overwrite existing values in place and new keys are
/// appended; nothing existing is ever removed.
///
/// ```
/// use cloudsync_engine::tags::merge_tags;
/// use cloudsync_storage::Tag;
///
/// let merged = merge_tags(&[Tag::new("a", "1")], [("a", "2"), ("b", "3")]);
/// assert_eq!(merged, vec![Tag::new("a", "2"), Tag::new("b", "3")]);
/// ```
pub fn merge_tags<K, V>(existing: &[Tag], declared: impl IntoIterator<Item = (K, V)>) -> Vec<Tag>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut merged = existing.to_vec();
    for (key, value) in declared {
        let (key, value) = (key.as_ref(), value.as_ref());
        match merged.iter_mut().find(|tag| tag.key == key) {
            Some(tag) => tag.value = value.to_string(),
            None => merged.push(Tag::new(key, value)),
        }
    }
    merged
}

/// Merge the target's declared tags into the bucket's tag set and write the
/// result back. Returns the tag set now on the bucket, or nothing for a
/// disabled target (which is never contacted).
pub async fn reconcile_tags(backend: &BackendHandle, target: &StorageTarget) -> Result<Vec<Tag>> {
    if !target.enabled {
        tracing::info!(bucket = %target.name, "Target is disabled, skipping tags");
        return Ok(Vec::new());
    }
    ensure_target_exists(backend, target).await?;
    let existing = backend
        .get_bucket_tagging(&target.name)
        .await
        .map_err(|e| error::storage(e, &target.name, Phase::Tags))?
        .unwrap_or_default();
    if target.tags.is_empty() {
        return Ok(existing);
    }
    let merged = merge_tags(&existing, &target.tags);
    backend.put_bucket_tagging(&target.name, &merged).await.map_err(|e| error::storage(e, &target.name, Phase::Tags))?;
    tracing::info!(bucket = %target.name, tags = merged.len(), "Updated bucket tags");
    Ok(merged)
}

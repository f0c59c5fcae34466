//! Upload executor.

use crate::Fingerprint;
use crate::error::{self, Phase, Result};
use crate::local::LocalFile;
use cloudsync_config::StorageTarget;
use cloudsync_storage::{BackendHandle, PutObject, Tag, UploadedObject};
use futures::{StreamExt, TryStreamExt, stream};
use std::collections::HashSet;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type for a key: guessed from its extension, then the target's
/// default, then `application/octet-stream`.
pub fn content_type_for(key: &str, default: Option<&str>) -> String {
    mime_guess::from_path(key)
        .first_raw()
        .or(default)
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string()
}

/// Upload every local file whose fingerprint is in `to_upload`, at most
/// `concurrency` at a time. Results follow the order of `files`.
pub async fn upload(
    backend: &BackendHandle,
    target: &StorageTarget,
    files: &[LocalFile],
    to_upload: &[Fingerprint],
    concurrency: usize,
) -> Result<Vec<UploadedObject>> {
    let wanted: HashSet<&Fingerprint> = to_upload.iter().collect();
    let tags: Vec<Tag> = target.tags.iter().map(|(key, value)| Tag::new(key, value)).collect();
    let pending: Vec<_> = files
        .iter()
        .filter(|file| wanted.contains(&Fingerprint::from(*file)))
        .map(|file| upload_file(backend, target, file, &tags))
        .collect();
    stream::iter(pending)
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

async fn upload_file(
    backend: &BackendHandle,
    target: &StorageTarget,
    file: &LocalFile,
    tags: &[Tag],
) -> Result<UploadedObject> {
    let request = PutObject {
        bucket: target.name.clone(),
        key: file.key.clone(),
        source: file.local_path.clone(),
        content_type: content_type_for(&file.key, target.default_content_type.as_deref()),
        acl: target.access_policy,
        tags: tags.to_vec(),
    };
    let uploaded = backend.put_object(request).await.map_err(|e| error::storage(e, &target.name, Phase::Upload))?;
    tracing::info!(bucket = %target.name, key = %uploaded.key, version = ?uploaded.version_id, "Uploaded");
    Ok(uploaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use cloudsync_storage::AccessPolicy;
    use cloudsync_storage::backend::{MockBackend, Operation, StorageBackend};
    use rstest::rstest;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;
    use time::OffsetDateTime;

    fn local(dir: &Path, key: &str, content: &[u8]) -> LocalFile {
        let path = dir.join(key.replace('/', "_"));
        std::fs::write(&path, content).unwrap();
        LocalFile {
            key: key.to_string(),
            local_path: path,
            content_hash: hex::encode(<md5::Md5 as md5::Digest>::digest(content)),
            size: content.len() as u64,
            last_modified: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[rstest]
    #[case("index.html", None, "text/html")]
    #[case("css/main.css", None, "text/css")]
    #[case("LICENSE", None, "application/octet-stream")]
    #[case("LICENSE", Some("text/plain"), "text/plain")]
    #[case("data.json", Some("text/plain"), "application/json")]
    fn test_content_type(#[case] key: &str, #[case] default: Option<&str>, #[case] expected: &str) {
        assert_eq!(content_type_for(key, default), expected);
    }

    #[tokio::test]
    async fn test_uploads_only_wanted_files() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::default().with_bucket("assets"));
        let backend: BackendHandle = mock.clone();
        let files = vec![local(dir.path(), "a.txt", b"a"), local(dir.path(), "b.txt", b"b")];
        let target = StorageTarget::new("assets", ["."])
            .with_access_policy(AccessPolicy::PublicRead)
            .with_tags([("team", "web")]);
        let uploaded = upload(&backend, &target, &files, &[Fingerprint::from(&files[1])], 4).await.unwrap();
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].key, "b.txt");
        assert_eq!(mock.keys("assets").await, vec!["b.txt".to_string()]);
        assert_eq!(mock.object_tags("assets", "b.txt").await.unwrap(), vec![Tag::new("team", "web")]);
        let head = mock.head_object("assets", "b.txt").await.unwrap();
        assert_eq!(head.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_results_keep_file_order() {
        let dir = TempDir::new().unwrap();
        let backend: BackendHandle = Arc::new(MockBackend::default().with_bucket("assets"));
        let files: Vec<_> = (0..10).map(|i| local(dir.path(), &format!("f{i}.txt"), format!("{i}").as_bytes())).collect();
        let wanted: Vec<_> = files.iter().map(Fingerprint::from).collect();
        let uploaded = upload(&backend, &StorageTarget::new("assets", ["."]), &files, &wanted, 3).await.unwrap();
        let keys: Vec<_> = uploaded.iter().map(|u| u.key.as_str()).collect();
        let expected: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn test_failure_is_transfer_error() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::default().with_bucket("assets"));
        mock.fail(Operation::PutObject).await;
        let backend: BackendHandle = mock;
        let files = vec![local(dir.path(), "a.txt", b"a")];
        let wanted = vec![Fingerprint::from(&files[0])];
        let err = upload(&backend, &StorageTarget::new("assets", ["."]), &files, &wanted, 1).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Transfer { phase: Phase::Upload, .. }));
    }
}

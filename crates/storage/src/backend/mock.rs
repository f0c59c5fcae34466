//! In-memory object store for testing.

use super::ObjectStream;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::key::validate as validate_key;
use crate::models::{
    CopyMetadata, DeleteFailure, DeleteMarker, DeleteReport, DeletedObject, ObjectHead, ObjectIdentifier,
    ObjectVersion, PutObject, RemoteObject, Tag, UploadedObject, VersionListing,
};
use async_stream::stream;
use async_trait::async_trait;
use exn::OptionExt;
use md5::{Digest, Md5};
use std::collections::{BTreeMap, HashMap, HashSet};
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Store operations that [`MockBackend`] counts and can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListBuckets,
    ListObjects,
    ListVersions,
    PutObject,
    DeleteObjects,
    GetBucketTagging,
    PutBucketTagging,
    CopyObject,
    HeadObject,
    CreateBucket,
    DeleteBucket,
}

#[derive(Debug, Clone)]
struct StoredObject {
    version_id: String,
    etag: String,
    size: u64,
    content_type: Option<String>,
    metadata: BTreeMap<String, String>,
    tags: Vec<Tag>,
    last_modified: OffsetDateTime,
}

#[derive(Debug, Clone)]
enum Entry {
    Object(StoredObject),
    Marker(String),
}
impl Entry {
    fn version_id(&self) -> &str {
        match self {
            Self::Object(object) => &object.version_id,
            Self::Marker(version_id) => version_id,
        }
    }
}

#[derive(Debug, Default)]
struct Bucket {
    versioned: bool,
    tags: Option<Vec<Tag>>,
    /// Version history per key, oldest first.
    objects: BTreeMap<String, Vec<Entry>>,
    next_version: u64,
}
impl Bucket {
    fn next_version_id(&mut self) -> String {
        match self.versioned {
            true => {
                self.next_version += 1;
                self.next_version.to_string()
            },
            false => "null".to_string(),
        }
    }

    fn current(&self, key: &str) -> Option<&StoredObject> {
        match self.objects.get(key)?.last()? {
            Entry::Object(object) => Some(object),
            Entry::Marker(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    buckets: HashMap<String, Bucket>,
    calls: HashMap<Operation, usize>,
    /// `None` fails forever, `Some(n)` fails the next `n` calls.
    failures: HashMap<Operation, Option<usize>>,
    denied: HashSet<String>,
}
impl State {
    fn record(&mut self, operation: Operation) -> Result<()> {
        *self.calls.entry(operation).or_default() += 1;
        match self.failures.get_mut(&operation) {
            Some(None) => exn::bail!(ErrorKind::Network(format!("injected {operation:?} failure"))),
            Some(Some(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                exn::bail!(ErrorKind::Network(format!("injected {operation:?} failure")))
            },
            _ => Ok(()),
        }
    }

    fn bucket(&self, name: &str) -> Result<&Bucket> {
        self.buckets.get(name).ok_or_raise(|| ErrorKind::BucketNotFound(name.to_string()))
    }

    fn bucket_mut(&mut self, name: &str) -> Result<&mut Bucket> {
        self.buckets.get_mut(name).ok_or_raise(|| ErrorKind::BucketNotFound(name.to_string()))
    }
}

fn etag(data: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Md5::digest(data)))
}

fn in_namespace(key: &str, prefix: Option<&str>) -> bool {
    prefix.is_none_or(|prefix| key.starts_with(prefix))
}

/// In-memory object store for testing.
///
/// Buckets, version histories, and tags live behind a single [`RwLock`], so
/// all trait methods can operate on `&self`. Buckets can be versioned or not;
/// versioned buckets keep every write and leave delete markers behind, just
/// like the real thing. Every call is counted per [`Operation`], and any
/// operation can be made to fail on demand.
///
/// # Examples
///
/// ```
/// use cloudsync_storage::backend::{MockBackend, Operation, StorageBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::default()
///     .with_bucket("assets")
///     .with_object("assets", "logo.svg", b"<svg/>");
/// assert!(backend.bucket_exists("assets").await?);
/// assert_eq!(backend.list_objects("assets", None).await?.len(), 1);
/// assert_eq!(backend.calls(Operation::ListObjects).await, 1);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    state: RwLock<State>,
}

impl MockBackend {
    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add an empty, unversioned bucket.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.state.get_mut().buckets.insert(bucket.into(), Bucket::default());
        self
    }

    /// Add an empty, versioned bucket.
    pub fn with_versioned_bucket(mut self, bucket: impl Into<String>) -> Self {
        let bucket_state = Bucket {
            versioned: true,
            ..Bucket::default()
        };
        self.state.get_mut().buckets.insert(bucket.into(), bucket_state);
        self
    }

    /// Pre-populate an object.
    ///
    /// Panics if the bucket was not added first or the key fails validation.
    /// If test setup is wrong, then test should not pass.
    pub fn with_object(mut self, bucket: &str, key: &str, data: impl AsRef<[u8]>) -> Self {
        let Ok(key) = validate_key(key) else {
            panic!("MockBackend::with_object: invalid key {key}");
        };
        let Some(bucket_state) = self.state.get_mut().buckets.get_mut(bucket) else {
            panic!("MockBackend::with_object: unknown bucket {bucket}");
        };
        let data = data.as_ref();
        let version_id = bucket_state.next_version_id();
        let entry = Entry::Object(StoredObject {
            version_id,
            etag: etag(data),
            size: data.len() as u64,
            content_type: None,
            metadata: BTreeMap::new(),
            tags: Vec::new(),
            last_modified: OffsetDateTime::now_utc(),
        });
        match bucket_state.versioned {
            true => bucket_state.objects.entry(key).or_default().push(entry),
            false => {
                bucket_state.objects.insert(key, vec![entry]);
            },
        }
        self
    }

    /// Pre-populate a bucket's tag set.
    ///
    /// Panics if the bucket was not added first.
    pub fn with_bucket_tags(mut self, bucket: &str, tags: impl IntoIterator<Item = Tag>) -> Self {
        let Some(bucket_state) = self.state.get_mut().buckets.get_mut(bucket) else {
            panic!("MockBackend::with_bucket_tags: unknown bucket {bucket}");
        };
        bucket_state.tags = Some(tags.into_iter().collect());
        self
    }

    /// Make every future call of `operation` fail with a network error.
    pub async fn fail(&self, operation: Operation) {
        self.state.write().await.failures.insert(operation, None);
    }

    /// Make the next `times` calls of `operation` fail with a network error.
    pub async fn fail_times(&self, operation: Operation, times: usize) {
        self.state.write().await.failures.insert(operation, Some(times));
    }

    /// Refuse to delete `key` (any version), reporting `AccessDenied` for it
    /// inside otherwise successful bulk deletes.
    pub async fn deny_delete(&self, key: impl Into<String>) {
        self.state.write().await.denied.insert(key.into());
    }

    /// Number of times `operation` has been called (including failed calls).
    pub async fn calls(&self, operation: Operation) -> usize {
        self.state.read().await.calls.get(&operation).copied().unwrap_or(0)
    }

    /// Number of calls across every operation.
    pub async fn total_calls(&self) -> usize {
        self.state.read().await.calls.values().sum()
    }

    /// Keys of the current (non-deleted) objects in `bucket`, sorted.
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        let state = self.state.read().await;
        let Some(bucket_state) = state.buckets.get(bucket) else {
            return Vec::new();
        };
        bucket_state.objects.keys().filter(|key| bucket_state.current(key).is_some()).cloned().collect()
    }

    /// Number of history entries (versions and delete markers) kept for `key`.
    pub async fn history_len(&self, bucket: &str, key: &str) -> usize {
        let state = self.state.read().await;
        state.buckets.get(bucket).and_then(|b| b.objects.get(key)).map_or(0, Vec::len)
    }

    async fn snapshot(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<RemoteObject>> {
        let mut state = self.state.write().await;
        state.record(Operation::ListObjects)?;
        let bucket_state = state.bucket(bucket)?;
        Ok(bucket_state
            .objects
            .keys()
            .filter(|key| in_namespace(key, prefix))
            .filter_map(|key| {
                let object = bucket_state.current(key)?;
                Some(RemoteObject::new(key, &object.etag, object.size, object.last_modified))
            })
            .collect())
    }

    /// Tags applied to the current version of an object at upload time.
    pub async fn object_tags(&self, bucket: &str, key: &str) -> Option<Vec<Tag>> {
        let state = self.state.read().await;
        state.buckets.get(bucket)?.current(key).map(|object| object.tags.clone())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            state: RwLock::new(State::default()),
        }
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        state.record(Operation::ListBuckets)?;
        Ok(state.buckets.contains_key(bucket))
    }

    fn list_objects_stream<'a>(&'a self, bucket: &'a str, prefix: Option<&'a str>) -> ObjectStream<'a> {
        Box::pin(stream! {
            // Snapshot matching entries under the lock, then drop it before
            // yielding to avoid holding the lock across yield points.
            match self.snapshot(bucket, prefix).await {
                Ok(objects) => {
                    for object in objects {
                        yield Ok(object);
                    }
                },
                Err(e) => yield Err(e),
            }
        })
    }

    async fn list_versions(&self, bucket: &str, prefix: Option<&str>) -> Result<VersionListing> {
        let mut state = self.state.write().await;
        state.record(Operation::ListVersions)?;
        let mut listing = VersionListing::default();
        for (key, history) in state.bucket(bucket)?.objects.iter().filter(|(key, _)| in_namespace(key, prefix)) {
            let latest = history.len().saturating_sub(1);
            for (index, entry) in history.iter().enumerate() {
                match entry {
                    Entry::Object(object) => listing.versions.push(ObjectVersion {
                        key: key.clone(),
                        version_id: object.version_id.clone(),
                        is_latest: index == latest,
                        etag: Some(object.etag.clone()),
                    }),
                    Entry::Marker(version_id) => listing.delete_markers.push(DeleteMarker {
                        key: key.clone(),
                        version_id: version_id.clone(),
                        is_latest: index == latest,
                    }),
                }
            }
        }
        Ok(listing)
    }

    async fn put_object(&self, request: PutObject) -> Result<UploadedObject> {
        let key = validate_key(&request.key)?;
        self.state.write().await.record(Operation::PutObject)?;
        let data = tokio::fs::read(&request.source).await.map_err(|e| exn::Exn::from(ErrorKind::Io(e)))?;
        let mut state = self.state.write().await;
        let bucket = state.bucket_mut(&request.bucket)?;
        let version_id = bucket.next_version_id();
        let object = StoredObject {
            version_id: version_id.clone(),
            etag: etag(&data),
            size: data.len() as u64,
            content_type: Some(request.content_type),
            metadata: BTreeMap::new(),
            tags: request.tags,
            last_modified: OffsetDateTime::now_utc(),
        };
        let entity_tag = object.etag.clone();
        match bucket.versioned {
            true => bucket.objects.entry(key.clone()).or_default().push(Entry::Object(object)),
            false => {
                bucket.objects.insert(key.clone(), vec![Entry::Object(object)]);
            },
        }
        Ok(UploadedObject {
            bucket: request.bucket,
            key,
            etag: Some(entity_tag),
            version_id: bucket.versioned.then_some(version_id),
        })
    }

    async fn delete_objects(&self, bucket: &str, objects: &[ObjectIdentifier]) -> Result<DeleteReport> {
        let mut guard = self.state.write().await;
        guard.record(Operation::DeleteObjects)?;
        let state = &mut *guard;
        let bucket_state = state.buckets.get_mut(bucket).ok_or_raise(|| ErrorKind::BucketNotFound(bucket.to_string()))?;
        let mut report = DeleteReport::default();
        for object in objects {
            if state.denied.contains(&object.key) {
                report.failures.push(DeleteFailure {
                    key: object.key.clone(),
                    version_id: object.version_id.clone(),
                    code: "AccessDenied".to_string(),
                    message: "Access Denied".to_string(),
                });
                continue;
            }
            let deleted = match &object.version_id {
                None if bucket_state.versioned => {
                    let marker = bucket_state.next_version_id();
                    bucket_state.objects.entry(object.key.clone()).or_default().push(Entry::Marker(marker.clone()));
                    DeletedObject {
                        key: object.key.clone(),
                        version_id: None,
                        delete_marker: true,
                        delete_marker_version_id: Some(marker),
                    }
                },
                None => {
                    bucket_state.objects.remove(&object.key);
                    DeletedObject {
                        key: object.key.clone(),
                        version_id: None,
                        delete_marker: false,
                        delete_marker_version_id: None,
                    }
                },
                // Deleting a version that does not exist is a successful no-op.
                Some(version_id) => {
                    let mut removed_marker = false;
                    if let Some(history) = bucket_state.objects.get_mut(&object.key) {
                        if let Some(position) = history.iter().position(|entry| entry.version_id() == version_id) {
                            removed_marker = matches!(history.remove(position), Entry::Marker(_));
                        }
                        if history.is_empty() {
                            bucket_state.objects.remove(&object.key);
                        }
                    }
                    DeletedObject {
                        key: object.key.clone(),
                        version_id: Some(version_id.clone()),
                        delete_marker: removed_marker,
                        delete_marker_version_id: removed_marker.then(|| version_id.clone()),
                    }
                },
            };
            report.deleted.push(deleted);
        }
        Ok(report)
    }

    async fn get_bucket_tagging(&self, bucket: &str) -> Result<Option<Vec<Tag>>> {
        let mut state = self.state.write().await;
        state.record(Operation::GetBucketTagging)?;
        Ok(state.bucket(bucket)?.tags.clone())
    }

    async fn put_bucket_tagging(&self, bucket: &str, tags: &[Tag]) -> Result<()> {
        let mut state = self.state.write().await;
        state.record(Operation::PutBucketTagging)?;
        state.bucket_mut(bucket)?.tags = Some(tags.to_vec());
        Ok(())
    }

    async fn replace_metadata(&self, request: CopyMetadata) -> Result<()> {
        let mut state = self.state.write().await;
        state.record(Operation::CopyObject)?;
        let bucket = state.bucket_mut(&request.bucket)?;
        let mut object =
            bucket.current(&request.key).cloned().ok_or_raise(|| ErrorKind::NotFound(request.key.clone()))?;
        // Stores normalize user metadata keys to lowercase.
        object.metadata = request.metadata.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect();
        object.content_type = Some(request.content_type);
        object.last_modified = OffsetDateTime::now_utc();
        object.version_id = bucket.next_version_id();
        let history = bucket.objects.entry(request.key).or_default();
        match bucket.versioned {
            true => history.push(Entry::Object(object)),
            false => *history = vec![Entry::Object(object)],
        }
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead> {
        let mut state = self.state.write().await;
        state.record(Operation::HeadObject)?;
        let object = state.bucket(bucket)?.current(key).ok_or_raise(|| ErrorKind::NotFound(key.to_string()))?;
        Ok(ObjectHead {
            key: key.to_string(),
            content_type: object.content_type.clone(),
            metadata: object.metadata.clone(),
            etag: Some(object.etag.clone()),
            size: object.size,
        })
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.record(Operation::CreateBucket)?;
        if state.buckets.contains_key(bucket) {
            exn::bail!(ErrorKind::BackendError(format!("BucketAlreadyOwnedByYou: {bucket}")));
        }
        // Object lock implies versioning.
        let bucket_state = Bucket {
            versioned: true,
            ..Bucket::default()
        };
        state.buckets.insert(bucket.to_string(), bucket_state);
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.record(Operation::DeleteBucket)?;
        if !state.bucket(bucket)?.objects.is_empty() {
            exn::bail!(ErrorKind::BackendError(format!("BucketNotEmpty: {bucket}")));
        }
        state.buckets.remove(bucket);
        Ok(())
    }
}

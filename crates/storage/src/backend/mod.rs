//! Object store trait and implementations.
//!
//! This module defines the `StorageBackend` trait, the narrow slice of an
//! S3-style object store API that reconciliation needs: listing (current
//! objects and every version), writing, bulk deletion, bucket tagging, and
//! metadata replacement.

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

#[cfg(feature = "mock")]
pub use self::mock::{MockBackend, Operation};
#[cfg(feature = "s3")]
pub use self::s3::{S3Backend, S3Options};
use crate::error::Result;
use crate::models::{
    CopyMetadata, DeleteReport, ObjectHead, ObjectIdentifier, PutObject, RemoteObject, Tag, UploadedObject,
    VersionListing,
};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

pub(crate) type ObjectStream<'a> = Pin<Box<dyn Stream<Item = Result<RemoteObject>> + Send + 'a>>;

/// Unified interface for object stores.
///
/// A single backend instance talks to one store (one set of credentials, one
/// endpoint) and can serve any number of buckets, so every operation names
/// the bucket it acts on.
///
/// # Key Handling
/// Keys are `/`-separated and must be validated using
/// [`validate_key`](crate::validate_key) before use.
///
/// # Examples
///
/// ```
/// use cloudsync_storage::{backend::StorageBackend, error::Result};
///
/// async fn total_size(backend: &dyn StorageBackend, bucket: &str) -> Result<u64> {
///     if !backend.bucket_exists(bucket).await? {
///         return Ok(0);
///     }
///     let objects = backend.list_objects(bucket, Some("site/")).await?;
///     Ok(objects.iter().map(|object| object.size).sum())
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Check whether a bucket exists and is visible to these credentials.
    ///
    /// Listing alone cannot tell a missing bucket from an empty one, so
    /// callers that are about to mutate a bucket should check this first.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// List all current objects, optionally under a prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_objects_stream()`](Self::list_objects_stream) into a
    /// [`Vec`] before returning.
    async fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<RemoteObject>> {
        self.list_objects_stream(bucket, prefix).try_collect().await
    }

    /// Stream all current objects, optionally under a prefix.
    ///
    /// Pagination is handled internally: the stream keeps requesting pages
    /// until the store reports no more results. Returns
    /// [`BucketNotFound`](crate::error::ErrorKind::BucketNotFound) as the
    /// first item if the bucket does not exist.
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use cloudsync_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_objects_stream("assets", None);
    /// while let Some(object) = stream.try_next().await? {
    ///     println!("{}: {} bytes", object.key, object.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_objects_stream<'a>(&'a self, bucket: &'a str, prefix: Option<&'a str>) -> ObjectStream<'a>;

    /// List every version and delete marker, optionally under a prefix.
    async fn list_versions(&self, bucket: &str, prefix: Option<&str>) -> Result<VersionListing>;

    /// Upload a local file, streaming its contents as the request body.
    async fn put_object(&self, request: PutObject) -> Result<UploadedObject>;

    /// Delete many objects (or specific versions) in as few requests as the
    /// store allows.
    ///
    /// Entries the store refuses individually are reported in
    /// [`DeleteReport::failures`] rather than failing the whole call.
    async fn delete_objects(&self, bucket: &str, objects: &[ObjectIdentifier]) -> Result<DeleteReport>;

    /// Fetch the bucket's tag set; `None` if the bucket has never been tagged.
    async fn get_bucket_tagging(&self, bucket: &str) -> Result<Option<Vec<Tag>>>;

    /// Replace the bucket's tag set in full.
    async fn put_bucket_tagging(&self, bucket: &str, tags: &[Tag]) -> Result<()>;

    /// Copy an object onto itself with a new content type and metadata,
    /// discarding whatever metadata it previously had.
    async fn replace_metadata(&self, request: CopyMetadata) -> Result<()>;

    /// Probe an object's metadata without downloading it.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead>;

    /// Create a bucket with object lock (and therefore versioning) enabled
    /// and a private ACL.
    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    /// Delete an (empty) bucket.
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;
}

//! Storage models.
//!
//! These types describe objects, versions, and tags as reported by (or sent
//! to) an object store. They are deliberately SDK-agnostic: the S3 backend
//! converts to and from them at its boundary.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use time::OffsetDateTime;

/// A current (non-deleted) object as reported by a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteObject {
    pub key: String,
    /// Entity tag exactly as reported by the store (usually a quoted MD5 hex
    /// digest for single-part uploads).
    pub etag: String,
    pub size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
}
impl RemoteObject {
    pub fn new(key: impl Into<String>, etag: impl Into<String>, size: u64, last_modified: OffsetDateTime) -> Self {
        Self {
            key: key.into(),
            etag: etag.into(),
            size,
            last_modified,
        }
    }
}

/// One historical (or current) version of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectVersion {
    pub key: String,
    pub version_id: String,
    pub is_latest: bool,
    pub etag: Option<String>,
}

/// A delete marker left behind by an unversioned delete in a versioned bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteMarker {
    pub key: String,
    pub version_id: String,
    pub is_latest: bool,
}

/// Every version and delete marker under a namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionListing {
    pub versions: Vec<ObjectVersion>,
    pub delete_markers: Vec<DeleteMarker>,
}

/// Identifies a single entry of a bulk delete request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectIdentifier {
    pub key: String,
    pub version_id: Option<String>,
}
impl ObjectIdentifier {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: None,
        }
    }

    pub fn with_version(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }
}

/// An entry the store confirmed as deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedObject {
    pub key: String,
    pub version_id: Option<String>,
    /// Whether the delete created (or removed) a delete marker.
    pub delete_marker: bool,
    pub delete_marker_version_id: Option<String>,
}

/// An entry the store refused to delete inside an otherwise successful bulk
/// delete call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteFailure {
    pub key: String,
    pub version_id: Option<String>,
    pub code: String,
    pub message: String,
}

/// Result of a bulk delete: what went, and what stayed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub deleted: Vec<DeletedObject>,
    pub failures: Vec<DeleteFailure>,
}
impl DeleteReport {
    pub fn extend(&mut self, other: DeleteReport) {
        self.deleted.extend(other.deleted);
        self.failures.extend(other.failures);
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedObject {
    pub bucket: String,
    pub key: String,
    pub etag: Option<String>,
    /// `None` when the bucket is not versioned.
    pub version_id: Option<String>,
}

/// A single bucket tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}
impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Result of a metadata probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectHead {
    pub key: String,
    pub content_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub etag: Option<String>,
    pub size: u64,
}

/// Canned access-control label applied to objects.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPolicy {
    #[display("private")]
    Private,
    #[display("public-read")]
    PublicRead,
    #[display("public-read-write")]
    PublicReadWrite,
    #[display("authenticated-read")]
    AuthenticatedRead,
    #[display("aws-exec-read")]
    AwsExecRead,
    #[display("bucket-owner-read")]
    BucketOwnerRead,
    #[display("bucket-owner-full-control")]
    BucketOwnerFullControl,
}

/// Write a local file to `bucket`/`key`.
#[derive(Debug, Clone)]
pub struct PutObject {
    pub bucket: String,
    pub key: String,
    /// Local file streamed as the request body.
    pub source: PathBuf,
    pub content_type: String,
    pub acl: Option<AccessPolicy>,
    pub tags: Vec<Tag>,
}

/// Copy an object onto itself, replacing its metadata wholesale.
#[derive(Debug, Clone)]
pub struct CopyMetadata {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
    pub acl: Option<AccessPolicy>,
}

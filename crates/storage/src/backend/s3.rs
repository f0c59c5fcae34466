//! S3-compatible storage backend.
//!
//! This module provides an object store implementation for AWS S3 and
//! S3-compatible services (MinIO, LocalStack, and other local emulators).
//!
//! # Credentials
//!
//! Credentials are either provided explicitly via the configuration file, or
//! (when omitted) resolved by the default AWS provider chain: environment,
//! shared profile files, web identity, container and instance metadata.

use crate::StorageBackend;
use crate::backend::ObjectStream;
use crate::error::{Error, ErrorKind, Result};
use crate::models::{
    AccessPolicy, CopyMetadata, DeleteFailure, DeleteMarker, DeleteReport, DeletedObject, ObjectHead,
    ObjectIdentifier, ObjectVersion, PutObject, RemoteObject, Tag, UploadedObject, VersionListing,
};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::head_object::HeadObjectError,
    primitives::{ByteStream, DateTime},
    types::{
        BucketCannedAcl, BucketLocationConstraint, CreateBucketConfiguration, Delete, MetadataDirective,
        ObjectCannedAcl, ObjectOwnership, Tagging,
    },
};
use exn::{OptionExt, ResultExt};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;
/// Hard limit of keys per `DeleteObjects` request.
const MAX_DELETE_BATCH: usize = 1000;
/// The one region that must not be sent as a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// RFC 3986 unreserved characters pass through; everything else is escaped.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');
/// As [`UNRESERVED`], but keeps `/` so copy sources stay readable.
const COPY_SOURCE: &AsciiSet = &UNRESERVED.remove(b'/');

/// How to reach the store.
#[derive(Debug, Clone, Default)]
pub struct S3Options {
    /// Region; `None` defers to the provider chain (`AWS_REGION`, profiles).
    pub region: Option<String>,
    /// Custom endpoint URL for emulators and S3-compatible services.
    pub endpoint: Option<String>,
    /// Explicit `(key_id, key_secret)`; `None` uses the default provider chain.
    pub credentials: Option<(String, String)>,
    /// Path-style addressing, required by most local emulators.
    pub force_path_style: bool,
}

/// S3-compatible storage backend.
///
/// One backend (and therefore one connection pool) serves every bucket it is
/// asked about. Cloning is cheap; dropping the last clone closes the pool.
///
/// # Examples
///
/// ```no_run
/// use cloudsync_storage::backend::{S3Backend, S3Options};
///
/// # async fn example() {
/// let backend = S3Backend::connect("localstack", S3Options {
///     region: Some("eu-west-1".to_string()),
///     endpoint: Some("http://localhost:4566".to_string()),
///     credentials: Some(("test".to_string(), "test".to_string())),
///     force_path_style: true,
/// }).await;
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Build a client from `options` and wrap it.
    pub async fn connect(name: impl Into<String>, options: S3Options) -> Self {
        let mut config_builder = match options.credentials {
            Some((key_id, key_secret)) => aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(Credentials::new(key_id, key_secret, None, None, "cloudsync-config")),
            None => {
                let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };
        config_builder = config_builder
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            .force_path_style(options.force_path_style);
        if let Some(region) = options.region {
            config_builder = config_builder.region(Region::new(region));
        }
        if let Some(endpoint_url) = options.endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self::from_client(name, Client::from_conf(config_builder.build()))
    }

    /// Wrap an already configured client.
    pub fn from_client(name: impl Into<String>, client: Client) -> Self {
        Self {
            name: name.into(),
            client,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        }
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("request limiter closed".to_string()))
    }

    /// Convert AWS DateTime to OffsetDateTime.
    fn parse_datetime(dt: &DateTime) -> Result<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos())
            .or_raise(|| ErrorKind::BackendError("S3 datetime out of range".to_string()))
    }

    fn remote_object(object: &aws_sdk_s3::types::Object) -> Result<RemoteObject> {
        let key = object.key().ok_or_raise(|| ErrorKind::BackendError("listed object has no key".to_string()))?;
        let last_modified =
            object.last_modified().map(Self::parse_datetime).transpose()?.unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let size = object.size().and_then(|size| u64::try_from(size).ok()).unwrap_or(0);
        Ok(RemoteObject::new(key, object.e_tag().unwrap_or_default(), size, last_modified))
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation: Option<String>,
    ) -> Result<aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output> {
        let _permit = self.acquire_permit().await?;
        self.client
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(prefix.map(str::to_string))
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| sdk_error(e, bucket, None))
    }

    async fn delete_chunk(&self, bucket: &str, chunk: &[ObjectIdentifier]) -> Result<DeleteReport> {
        let objects = chunk
            .iter()
            .map(|object| {
                aws_sdk_s3::types::ObjectIdentifier::builder()
                    .key(&object.key)
                    .set_version_id(object.version_id.clone())
                    .build()
                    .or_raise(|| ErrorKind::InvalidKey(object.key.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(false)
            .build()
            .or_raise(|| ErrorKind::BackendError("invalid delete request".to_string()))?;
        let _permit = self.acquire_permit().await?;
        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| sdk_error(e, bucket, None))?;
        let deleted = output
            .deleted()
            .iter()
            .map(|d| DeletedObject {
                key: d.key().unwrap_or_default().to_string(),
                version_id: d.version_id().map(str::to_string),
                delete_marker: d.delete_marker().unwrap_or(false),
                delete_marker_version_id: d.delete_marker_version_id().map(str::to_string),
            })
            .collect();
        let failures = output
            .errors()
            .iter()
            .map(|e| DeleteFailure {
                key: e.key().unwrap_or_default().to_string(),
                version_id: e.version_id().map(str::to_string),
                code: e.code().unwrap_or("Unknown").to_string(),
                message: e.message().unwrap_or_default().to_string(),
            })
            .collect();
        Ok(DeleteReport { deleted, failures })
    }
}

/// Classify an SDK failure, keeping the original error as the child frame.
///
/// A missing bucket always names the bucket; other failures name the key when
/// the request had one.
fn sdk_error<E, R>(err: SdkError<E, R>, bucket: &str, key: Option<&str>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let subject = key.unwrap_or(bucket);
    let code = err.as_service_error().and_then(ProvideErrorMetadata::code).map(str::to_string);
    let kind = match (&err, code.as_deref()) {
        (SdkError::DispatchFailure(_) | SdkError::TimeoutError(_), _) => {
            ErrorKind::Network(DisplayErrorContext(&err).to_string())
        },
        (_, Some("NoSuchBucket")) => ErrorKind::BucketNotFound(bucket.to_string()),
        (_, Some("NoSuchKey" | "NotFound")) => ErrorKind::NotFound(subject.to_string()),
        (_, Some("AccessDenied" | "Forbidden" | "InvalidAccessKeyId" | "SignatureDoesNotMatch")) => {
            ErrorKind::PermissionDenied(subject.to_string())
        },
        _ => ErrorKind::BackendError(DisplayErrorContext(&err).to_string()),
    };
    exn::Exn::from(err).raise(kind)
}

fn object_acl(policy: Option<AccessPolicy>) -> Option<ObjectCannedAcl> {
    policy.map(|policy| ObjectCannedAcl::from(policy.to_string().as_str()))
}

/// `CopySource` header value: `bucket/key`, URL-encoded.
fn copy_source(bucket: &str, key: &str) -> String {
    utf8_percent_encode(&format!("{bucket}/{key}"), COPY_SOURCE).to_string()
}

/// `x-amz-tagging` header value: a URL query string.
fn tagging_header(tags: &[Tag]) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    let pairs: Vec<String> = tags
        .iter()
        .map(|tag| {
            format!("{}={}", utf8_percent_encode(&tag.key, UNRESERVED), utf8_percent_encode(&tag.value, UNRESERVED))
        })
        .collect();
    Some(pairs.join("&"))
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let mut continuation: Option<String> = None;
        loop {
            let _permit = self.acquire_permit().await?;
            let output = self
                .client
                .list_buckets()
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| sdk_error(e, bucket, None))?;
            if output.buckets().iter().any(|b| b.name() == Some(bucket)) {
                return Ok(true);
            }
            match output.continuation_token() {
                Some(token) if !token.is_empty() => continuation = Some(token.to_string()),
                _ => return Ok(false),
            }
        }
    }

    fn list_objects_stream<'a>(&'a self, bucket: &'a str, prefix: Option<&'a str>) -> ObjectStream<'a> {
        Box::pin(stream! {
            let mut continuation: Option<String> = None;
            loop {
                let page = match self.list_page(bucket, prefix, continuation.take()).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                };
                for object in page.contents() {
                    yield Self::remote_object(object);
                }
                match page.next_continuation_token() {
                    Some(token) if page.is_truncated().unwrap_or(false) => continuation = Some(token.to_string()),
                    _ => break,
                }
            }
        })
    }

    async fn list_versions(&self, bucket: &str, prefix: Option<&str>) -> Result<VersionListing> {
        let mut listing = VersionListing::default();
        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;
        loop {
            let _permit = self.acquire_permit().await?;
            let output = self
                .client
                .list_object_versions()
                .bucket(bucket)
                .set_prefix(prefix.map(str::to_string))
                .set_key_marker(key_marker.take())
                .set_version_id_marker(version_marker.take())
                .send()
                .await
                .map_err(|e| sdk_error(e, bucket, None))?;
            listing.versions.extend(output.versions().iter().filter_map(|v| {
                Some(ObjectVersion {
                    key: v.key()?.to_string(),
                    version_id: v.version_id().unwrap_or("null").to_string(),
                    is_latest: v.is_latest().unwrap_or(false),
                    etag: v.e_tag().map(str::to_string),
                })
            }));
            listing.delete_markers.extend(output.delete_markers().iter().filter_map(|m| {
                Some(DeleteMarker {
                    key: m.key()?.to_string(),
                    version_id: m.version_id().unwrap_or("null").to_string(),
                    is_latest: m.is_latest().unwrap_or(false),
                })
            }));
            if !output.is_truncated().unwrap_or(false) {
                return Ok(listing);
            }
            key_marker = output.next_key_marker().map(str::to_string);
            version_marker = output.next_version_id_marker().map(str::to_string);
            if key_marker.is_none() && version_marker.is_none() {
                return Ok(listing);
            }
        }
    }

    async fn put_object(&self, request: PutObject) -> Result<UploadedObject> {
        let body = ByteStream::from_path(&request.source)
            .await
            .or_raise(|| ErrorKind::BackendError(format!("cannot stream {}", request.source.display())))?;
        let _permit = self.acquire_permit().await?;
        let output = self
            .client
            .put_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .body(body)
            .content_type(&request.content_type)
            .set_acl(object_acl(request.acl))
            .set_tagging(tagging_header(&request.tags))
            .send()
            .await
            .map_err(|e| sdk_error(e, &request.bucket, Some(&request.key)))?;
        Ok(UploadedObject {
            bucket: request.bucket,
            key: request.key,
            etag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
        })
    }

    async fn delete_objects(&self, bucket: &str, objects: &[ObjectIdentifier]) -> Result<DeleteReport> {
        let mut report = DeleteReport::default();
        for chunk in objects.chunks(MAX_DELETE_BATCH) {
            report.extend(self.delete_chunk(bucket, chunk).await?);
        }
        Ok(report)
    }

    async fn get_bucket_tagging(&self, bucket: &str) -> Result<Option<Vec<Tag>>> {
        let _permit = self.acquire_permit().await?;
        match self.client.get_bucket_tagging().bucket(bucket).send().await {
            Ok(output) => Ok(Some(output.tag_set().iter().map(|t| Tag::new(t.key(), t.value())).collect())),
            Err(e) if e.as_service_error().and_then(ProvideErrorMetadata::code) == Some("NoSuchTagSet") => Ok(None),
            Err(e) => Err(sdk_error(e, bucket, None)),
        }
    }

    async fn put_bucket_tagging(&self, bucket: &str, tags: &[Tag]) -> Result<()> {
        let tag_set = tags
            .iter()
            .map(|tag| {
                aws_sdk_s3::types::Tag::builder()
                    .key(&tag.key)
                    .value(&tag.value)
                    .build()
                    .or_raise(|| ErrorKind::BackendError(format!("invalid tag {}", tag.key)))
            })
            .collect::<Result<Vec<_>>>()?;
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .or_raise(|| ErrorKind::BackendError("invalid tag set".to_string()))?;
        let _permit = self.acquire_permit().await?;
        self.client
            .put_bucket_tagging()
            .bucket(bucket)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| sdk_error(e, bucket, None))?;
        Ok(())
    }

    async fn replace_metadata(&self, request: CopyMetadata) -> Result<()> {
        let metadata: HashMap<String, String> = request.metadata.into_iter().collect();
        let _permit = self.acquire_permit().await?;
        self.client
            .copy_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .copy_source(copy_source(&request.bucket, &request.key))
            .content_type(request.content_type)
            .metadata_directive(MetadataDirective::Replace)
            .set_metadata(Some(metadata))
            .set_acl(object_acl(request.acl))
            .send()
            .await
            .map_err(|e| sdk_error(e, &request.bucket, Some(&request.key)))?;
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead> {
        let _permit = self.acquire_permit().await?;
        let output = match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(HeadObjectError::is_not_found) => {
                return Err(exn::Exn::from(e).raise(ErrorKind::NotFound(key.to_string())));
            },
            Err(e) => return Err(sdk_error(e, bucket, Some(key))),
        };
        Ok(ObjectHead {
            key: key.to_string(),
            content_type: output.content_type().map(str::to_string),
            metadata: output.metadata().map(|m| m.clone().into_iter().collect()).unwrap_or_default(),
            etag: output.e_tag().map(str::to_string),
            size: output.content_length().and_then(|size| u64::try_from(size).ok()).unwrap_or(0),
        })
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let _permit = self.acquire_permit().await?;
        let location = self
            .client
            .config()
            .region()
            .map(|region| region.to_string())
            .filter(|region| region != DEFAULT_REGION)
            .map(|region| {
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region.as_str()))
                    .build()
            });
        self.client
            .create_bucket()
            .bucket(bucket)
            .object_lock_enabled_for_bucket(true)
            .object_ownership(ObjectOwnership::BucketOwnerPreferred)
            .set_create_bucket_configuration(location)
            .send()
            .await
            .map_err(|e| sdk_error(e, bucket, None))?;
        self.client
            .put_bucket_acl()
            .bucket(bucket)
            .acl(BucketCannedAcl::Private)
            .send()
            .await
            .map_err(|e| sdk_error(e, bucket, None))?;
        tracing::info!(backend = self.name.as_str(), bucket, "Created bucket");
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let _permit = self.acquire_permit().await?;
        self.client.delete_bucket().bucket(bucket).send().await.map_err(|e| sdk_error(e, bucket, None))?;
        tracing::info!(backend = self.name.as_str(), bucket, "Deleted bucket");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_sdk_s3::operation::{
        copy_object::CopyObjectError, delete_objects::DeleteObjectsOutput, get_bucket_tagging::GetBucketTaggingError,
        put_object::PutObjectError,
        get_bucket_tagging::GetBucketTaggingOutput, list_buckets::ListBucketsOutput,
        list_objects_v2::ListObjectsV2Output,
    };
    use aws_sdk_s3::types::{Bucket, Object, error::NotFound};
    use aws_smithy_mocks::{RuleMode, mock, mock_client};
    use futures::TryStreamExt;
    use rstest::rstest;

    #[rstest]
    #[case("assets", "index.html", "assets/index.html")]
    #[case("assets", "dir/a b+c.txt", "assets/dir/a%20b%2Bc.txt")]
    #[case("assets", "ünï.txt", "assets/%C3%BCn%C3%AF.txt")]
    fn test_copy_source(#[case] bucket: &str, #[case] key: &str, #[case] expected: &str) {
        assert_eq!(copy_source(bucket, key), expected);
    }

    #[test]
    fn test_tagging_header() {
        assert_eq!(tagging_header(&[]), None);
        let tags = [Tag::new("env", "prod"), Tag::new("team name", "a&b=c")];
        assert_eq!(tagging_header(&tags).as_deref(), Some("env=prod&team%20name=a%26b%3Dc"));
    }

    #[test]
    fn test_object_acl() {
        assert_eq!(object_acl(None), None);
        assert_eq!(object_acl(Some(AccessPolicy::PublicRead)), Some(ObjectCannedAcl::PublicRead));
        assert_eq!(object_acl(Some(AccessPolicy::BucketOwnerFullControl)), Some(ObjectCannedAcl::BucketOwnerFullControl));
    }

    #[tokio::test]
    async fn test_bucket_exists() {
        let rule = mock!(Client::list_buckets).then_output(|| {
            ListBucketsOutput::builder()
                .buckets(Bucket::builder().name("other").build())
                .buckets(Bucket::builder().name("assets").build())
                .build()
        });
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&rule]);
        let backend = S3Backend::from_client("test", client);
        assert!(backend.bucket_exists("assets").await.unwrap());
    }

    #[tokio::test]
    async fn test_bucket_missing() {
        let rule = mock!(Client::list_buckets)
            .then_output(|| ListBucketsOutput::builder().buckets(Bucket::builder().name("other").build()).build());
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&rule]);
        let backend = S3Backend::from_client("test", client);
        assert!(!backend.bucket_exists("assets").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_objects_follows_continuation() {
        let first = mock!(Client::list_objects_v2).match_requests(|req| req.continuation_token().is_none()).then_output(
            || {
                ListObjectsV2Output::builder()
                    .contents(Object::builder().key("a.txt").e_tag("\"aaa\"").size(1).build())
                    .is_truncated(true)
                    .next_continuation_token("page-2")
                    .build()
            },
        );
        let second = mock!(Client::list_objects_v2)
            .match_requests(|req| req.continuation_token() == Some("page-2"))
            .then_output(|| {
                ListObjectsV2Output::builder()
                    .contents(Object::builder().key("b.txt").e_tag("\"bbb\"").size(2).build())
                    .is_truncated(false)
                    .build()
            });
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&first, &second]);
        let backend = S3Backend::from_client("test", client);
        let objects: Vec<_> = backend.list_objects_stream("assets", None).try_collect().await.unwrap();
        let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a.txt", "b.txt"]);
        assert_eq!(objects[1].etag, "\"bbb\"");
        assert_eq!(objects[1].size, 2);
    }

    #[tokio::test]
    async fn test_missing_tag_set_is_none() {
        let rule = mock!(Client::get_bucket_tagging)
            .then_error(|| GetBucketTaggingError::generic(ErrorMetadata::builder().code("NoSuchTagSet").build()));
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&rule]);
        let backend = S3Backend::from_client("test", client);
        assert_eq!(backend.get_bucket_tagging("assets").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_bucket_on_tagging() {
        let rule = mock!(Client::get_bucket_tagging)
            .then_error(|| GetBucketTaggingError::generic(ErrorMetadata::builder().code("NoSuchBucket").build()));
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&rule]);
        let backend = S3Backend::from_client("test", client);
        let err = backend.get_bucket_tagging("assets").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BucketNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_bucket_on_put_names_bucket() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let rule = mock!(Client::put_object)
            .then_error(|| PutObjectError::generic(ErrorMetadata::builder().code("NoSuchBucket").build()));
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&rule]);
        let backend = S3Backend::from_client("test", client);
        let request = PutObject {
            bucket: "assets".to_string(),
            key: "index.html".to_string(),
            source: file.path().to_path_buf(),
            content_type: "text/html".to_string(),
            acl: None,
            tags: Vec::new(),
        };
        let err = backend.put_object(request).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BucketNotFound(bucket) if bucket == "assets"));
    }

    #[tokio::test]
    async fn test_copy_errors_name_bucket_or_key() {
        let missing = mock!(Client::copy_object)
            .match_requests(|req| req.bucket() == Some("gone"))
            .then_error(|| CopyObjectError::generic(ErrorMetadata::builder().code("NoSuchBucket").build()));
        let denied = mock!(Client::copy_object)
            .then_error(|| CopyObjectError::generic(ErrorMetadata::builder().code("AccessDenied").build()));
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&missing, &denied]);
        let backend = S3Backend::from_client("test", client);
        let request = |bucket: &str| CopyMetadata {
            bucket: bucket.to_string(),
            key: "a.txt".to_string(),
            content_type: "text/plain".to_string(),
            metadata: Default::default(),
            acl: None,
        };
        let err = backend.replace_metadata(request("gone")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BucketNotFound(bucket) if bucket == "gone"));
        let err = backend.replace_metadata(request("assets")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(key) if key == "a.txt"));
    }

    #[tokio::test]
    async fn test_get_bucket_tagging() {
        let rule = mock!(Client::get_bucket_tagging).then_output(|| {
            GetBucketTaggingOutput::builder()
                .tag_set(aws_sdk_s3::types::Tag::builder().key("env").value("prod").build().unwrap())
                .build()
                .unwrap()
        });
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&rule]);
        let backend = S3Backend::from_client("test", client);
        assert_eq!(backend.get_bucket_tagging("assets").await.unwrap(), Some(vec![Tag::new("env", "prod")]));
    }

    #[tokio::test]
    async fn test_delete_objects_reports_partial_failure() {
        let rule = mock!(Client::delete_objects).then_output(|| {
            DeleteObjectsOutput::builder()
                .deleted(aws_sdk_s3::types::DeletedObject::builder().key("a.txt").version_id("1").build())
                .errors(
                    aws_sdk_s3::types::Error::builder()
                        .key("b.txt")
                        .version_id("2")
                        .code("AccessDenied")
                        .message("Access Denied")
                        .build(),
                )
                .build()
        });
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&rule]);
        let backend = S3Backend::from_client("test", client);
        let batch = [ObjectIdentifier::new("a.txt").with_version("1"), ObjectIdentifier::new("b.txt").with_version("2")];
        let report = backend.delete_objects("assets", &batch).await.unwrap();
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(report.deleted[0].version_id.as_deref(), Some("1"));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].code, "AccessDenied");
    }

    #[tokio::test]
    async fn test_delete_objects_empty_batch_makes_no_request() {
        let rule = mock!(Client::delete_objects).then_output(|| DeleteObjectsOutput::builder().build());
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&rule]);
        let backend = S3Backend::from_client("test", client);
        let report = backend.delete_objects("assets", &[]).await.unwrap();
        assert_eq!(report, DeleteReport::default());
        assert_eq!(rule.num_calls(), 0);
    }

    #[tokio::test]
    async fn test_head_object_not_found() {
        let rule =
            mock!(Client::head_object).then_error(|| HeadObjectError::NotFound(NotFound::builder().build()));
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&rule]);
        let backend = S3Backend::from_client("test", client);
        let err = backend.head_object("assets", "missing.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }
}

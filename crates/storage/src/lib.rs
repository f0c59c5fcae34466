pub mod backend;
pub mod error;
mod key;
mod models;

pub use crate::backend::StorageBackend;
pub use crate::key::{join as join_key, namespace as key_namespace, validate as validate_key};
pub use crate::models::{
    AccessPolicy, CopyMetadata, DeleteFailure, DeleteMarker, DeleteReport, DeletedObject, ObjectHead,
    ObjectIdentifier, ObjectVersion, PutObject, RemoteObject, Tag, UploadedObject, VersionListing,
};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;

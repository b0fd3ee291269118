//! Upstream object store boundary.
//!
//! The [`ObjectStore`] trait is the only way the rest of the crate touches
//! original bytes. Objects are addressed by key inside a bucket fixed at
//! construction time.
//!
//! | Backend | Use |
//! |---|---|
//! | [`S3Store`] | Production: any S3-compatible endpoint via `aws-sdk-s3` |
//! | [`MemoryStore`] | Tests and offline runs |

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::path::Path;
use thiserror::Error;

pub use memory::MemoryStore;
pub use s3::S3Store;

/// Errors raised by object store backends.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Object not present in the bucket.
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Network or service failure talking to the store.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Local I/O failure (reading an upload, streaming a body).
    #[error("I/O error for {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Streaming body of an upstream object. Dropping it releases the
/// underlying connection.
pub type ByteStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// An opened upstream object.
pub struct StoredObject {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl std::fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredObject")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Low-level object operations, implemented by each backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check whether an object exists.
    async fn head(&self, key: &str) -> Result<bool, StoreError>;

    /// Open a streaming read. Fails with [`StoreError::NotFound`] if absent.
    async fn get(&self, key: &str) -> Result<StoredObject, StoreError>;

    /// Upload a local file under `key`, returning the object location.
    async fn put_file(&self, key: &str, path: &Path) -> Result<String, StoreError>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

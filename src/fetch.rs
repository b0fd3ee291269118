//! Original fetching.
//!
//! Thin layer over an [`ObjectStore`] that exposes originals either as a
//! stream (for passthrough serving) or as a fully buffered byte array (for
//! decoding, and for callers that want the whole object).

use crate::store::{ByteStream, ObjectStore, StoreError, StoredObject};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The object is larger than the caller is willing to buffer.
    #[error("Object {key} exceeds {limit} bytes")]
    TooLarge { key: String, limit: u64 },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Store(e) if e.is_not_found())
    }
}

#[derive(Clone)]
pub struct OriginalFetcher {
    store: Arc<dyn ObjectStore>,
}

impl OriginalFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Open the original as a stream. Only the consumer's polling pulls
    /// bytes from upstream.
    pub async fn stream(&self, logical_path: &str) -> Result<StoredObject, StoreError> {
        self.store.get(logical_path).await
    }

    /// Read the whole original into memory.
    ///
    /// Stream errors propagate; a partial body is never returned.
    pub async fn read(&self, logical_path: &str) -> Result<Bytes, FetchError> {
        let object = self.stream(logical_path).await?;
        collect(logical_path, object, None).await
    }

    /// Read the whole original, refusing objects larger than `limit` bytes.
    pub async fn read_bounded(&self, logical_path: &str, limit: u64) -> Result<Bytes, FetchError> {
        let object = self.stream(logical_path).await?;
        collect(logical_path, object, Some(limit)).await
    }
}

async fn collect(key: &str, object: StoredObject, limit: Option<u64>) -> Result<Bytes, FetchError> {
    let too_large = |limit| FetchError::TooLarge {
        key: key.to_string(),
        limit,
    };

    let declared = object.content_length.unwrap_or(0);
    if let Some(limit) = limit {
        if declared > limit {
            return Err(too_large(limit));
        }
    }

    let mut buf = BytesMut::with_capacity(usize::try_from(declared).unwrap_or(0));
    let mut body: ByteStream = object.body;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if let Some(limit) = limit {
            if (buf.len() + chunk.len()) as u64 > limit {
                return Err(too_large(limit));
            }
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

//! In-memory object store.
//!
//! Holds objects in a map and counts `get` calls so tests can observe how
//! often the upstream was actually read.

use super::{ObjectStore, StoreError, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Size of the chunks `get` splits bodies into, so consumers see a real
/// multi-chunk stream.
const CHUNK_SIZE: usize = 8 * 1024;

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Bytes>>,
    gets: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object directly.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), data.into());
    }

    /// Snapshot of an object's bytes.
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Number of `get` calls served so far, including misses.
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.object(key).is_some())
    }

    async fn get(&self, key: &str) -> Result<StoredObject, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let data = self.object(key).ok_or_else(|| StoreError::NotFound {
            bucket: "memory".to_string(),
            key: key.to_string(),
        })?;

        let content_length = Some(data.len() as u64);
        let chunks: Vec<Result<Bytes, StoreError>> = (0..data.len())
            .step_by(CHUNK_SIZE)
            .map(|start| Ok(data.slice(start..(start + CHUNK_SIZE).min(data.len()))))
            .collect();

        Ok(StoredObject {
            content_type: None,
            content_length,
            body: futures::stream::iter(chunks).boxed(),
        })
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<String, StoreError> {
        let data = tokio::fs::read(path).await.map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.insert(key, data);
        Ok(format!("memory://{key}"))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get("nope.png").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.get_count(), 1);
    }

    #[tokio::test]
    async fn get_streams_in_chunks() {
        let store = MemoryStore::new();
        store.insert("big.bin", vec![7u8; CHUNK_SIZE * 2 + 10]);

        let object = store.get("big.bin").await.unwrap();
        assert_eq!(object.content_length, Some((CHUNK_SIZE * 2 + 10) as u64));
        let chunks: Vec<Bytes> = object.body.try_collect().await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 10);
    }

    #[tokio::test]
    async fn head_and_delete() {
        let store = MemoryStore::new();
        store.insert("a.jpg", "data");
        assert!(store.head("a.jpg").await.unwrap());

        store.delete("a.jpg").await.unwrap();
        assert!(!store.head("a.jpg").await.unwrap());
        // Deleting again is fine
        store.delete("a.jpg").await.unwrap();
    }
}

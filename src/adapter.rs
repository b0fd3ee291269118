//! Storage adapter.
//!
//! [`StorageAdapter`] is the capability surface a host application uploads
//! to and serves from. [`ImageStorage`] implements it over an object store
//! with the derivative [`Cache`] composed in as a field.
//!
//! | Operation | Behavior |
//! |---|---|
//! | `save` | sanitize + uniquify the name, upload, return the public URL |
//! | `exists` | `head` the key; failures read as `false` |
//! | `delete` | invalidate cached variants, then delete upstream; failures read as `false` |
//! | `read` | buffered original bytes |
//! | `serve` | HTTP router for originals and derivatives |

use crate::cache::{Cache, CacheError, validate_logical_path};
use crate::fetch::FetchError;
use crate::server;
use crate::store::{ObjectStore, StoreError};
use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Suffixes tried before giving up on a unique upload name.
const MAX_UNIQUE_ATTEMPTS: u32 = 10_000;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),
    #[error("No free name for {0}")]
    NoUniqueName(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// A local file to be uploaded.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-supplied file name.
    pub name: String,
    /// Where the bytes currently live.
    pub path: PathBuf,
}

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn exists(&self, name: &str, target_dir: Option<&str>) -> bool;
    async fn save(&self, upload: &Upload, target_dir: Option<&str>) -> Result<String, AdapterError>;
    fn serve(&self) -> Router;
    async fn delete(&self, name: &str, target_dir: Option<&str>) -> bool;
    async fn read(&self, path: &str) -> Result<Bytes, AdapterError>;
}

pub struct ImageStorage {
    cache: Cache,
    server_url: String,
    max_age_secs: u64,
}

impl ImageStorage {
    pub fn new(cache: Cache, server_url: &str, max_age_secs: u64) -> Self {
        Self {
            cache,
            server_url: server_url.trim_end_matches('/').to_string(),
            max_age_secs,
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    fn store(&self) -> &Arc<dyn ObjectStore> {
        self.cache.fetcher().store()
    }

    /// Pick a key under `dir` for `file_name` that the store does not hold.
    async fn unique_key(&self, dir: &str, file_name: &str) -> Result<String, AdapterError> {
        let key = object_key(dir, file_name);
        if !self.store().head(&key).await? {
            return Ok(key);
        }
        let (stem, ext) = split_extension(file_name);
        for i in 1..=MAX_UNIQUE_ATTEMPTS {
            let candidate = object_key(dir, &format!("{stem}-{i}{ext}"));
            if !self.store().head(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(AdapterError::NoUniqueName(key))
    }
}

/// Default upload directory: `YYYY/MM` in UTC.
pub fn target_dir() -> String {
    Utc::now().format("%Y/%m").to_string()
}

/// Lowercase `name` and replace anything outside `[a-z0-9._-]` with `-`.
pub fn sanitize_file_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '-',
        })
        .collect()
}

/// Split `a.b.jpg` into `("a.b", ".jpg")`. A leading dot is not an
/// extension separator.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

fn object_key(dir: &str, file_name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{dir}/{file_name}")
    }
}

#[async_trait]
impl StorageAdapter for ImageStorage {
    async fn exists(&self, name: &str, target_dir: Option<&str>) -> bool {
        let dir = target_dir.map_or_else(self::target_dir, str::to_string);
        let key = object_key(&dir, name);
        if let Err(e) = validate_logical_path(&key) {
            error!(key, error = %e, "exists check rejected");
            return false;
        }
        match self.store().head(&key).await {
            Ok(found) => found,
            Err(e) => {
                error!(key, error = %e, "exists check failed");
                false
            }
        }
    }

    async fn save(&self, upload: &Upload, target_dir: Option<&str>) -> Result<String, AdapterError> {
        let file_name = sanitize_file_name(&upload.name);
        if split_extension(&file_name).0.trim_matches(|c: char| c == '-' || c == '.').is_empty() {
            return Err(AdapterError::InvalidName(upload.name.clone()));
        }
        let dir = target_dir.map_or_else(self::target_dir, str::to_string);
        validate_logical_path(&object_key(&dir, &file_name))?;
        let key = self.unique_key(&dir, &file_name).await?;

        self.store().put_file(&key, &upload.path).await?;
        info!(key, "stored upload");
        Ok(format!("{}/{key}", self.server_url))
    }

    fn serve(&self) -> Router {
        server::router(self.cache.clone(), self.max_age_secs)
    }

    async fn delete(&self, name: &str, target_dir: Option<&str>) -> bool {
        let dir = target_dir.map_or_else(self::target_dir, str::to_string);
        let key = object_key(&dir, name);

        if let Err(e) = self.cache.delete(&key).await {
            error!(key, error = %e, "cache invalidation failed");
            return false;
        }
        match self.store().delete(&key).await {
            Ok(()) => true,
            Err(e) => {
                error!(key, error = %e, "delete failed");
                false
            }
        }
    }

    async fn read(&self, path: &str) -> Result<Bytes, AdapterError> {
        let key = path.trim_start_matches('/');
        validate_logical_path(key)?;
        Ok(self.cache.fetcher().read(key).await?)
    }
}

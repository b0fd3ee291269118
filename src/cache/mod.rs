//! Derivative cache.
//!
//! Derivatives (resized and/or WebP re-encoded originals) live on the local
//! filesystem under a cache root, one file per (logical path, descriptor).
//! The layout is defined in [`key`].
//!
//! ## Materialization
//!
//! [`Cache::ensure`] makes a derivative exist:
//!
//! 1. Resolve the cache path. Already present: done, upstream untouched.
//! 2. Join the in-flight materialization for that path, or start one.
//! 3. The materializing task re-checks presence, creates the parent
//!    directories, reads the original (bounded by `max_source_bytes`),
//!    and transcodes on a blocking thread into a temporary file that is
//!    renamed into place.
//!
//! Concurrent requests for one path share a single fetch and transcode.
//! Requests for different paths never wait on each other. A failed
//! materialization leaves no artifact, so the next request retries.
//!
//! ## Invalidation
//!
//! [`Cache::delete`] removes every variant of a logical path; see
//! [`invalidate`].

pub mod invalidate;
pub mod key;

use crate::config::CacheConfig;
use crate::fetch::{FetchError, OriginalFetcher};
use crate::imaging::{
    BackendError, ImageBackend, Quality, TranscodeSettings, plan_transcode, transcode_to_file,
};
use crate::params::{RawParams, TransformDescriptor, normalize};
use crate::store::ObjectStore;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

pub use key::validate_logical_path;

/// Broad classification of a [`CacheError`], for callers that map errors
/// onto responses or exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller asked for something that is never valid (e.g. caching an
    /// original).
    Usage,
    InvalidPath,
    NotFound,
    Transform,
    AggregateDelete,
    TransientIo,
}

/// One variant that could not be removed.
#[derive(Debug)]
pub struct RemovalFailure {
    pub path: PathBuf,
    pub source: std::io::Error,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("{operation} is not defined for original=1")]
    Usage { operation: &'static str },

    #[error("Invalid logical path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Failed to fetch original: {0}")]
    Fetch(#[from] FetchError),

    #[error("Transform failed for {path}: {source}")]
    Transform { path: String, source: BackendError },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to remove {} cached variant(s)", .0.len())]
    AggregateDelete(Vec<RemovalFailure>),

    #[error("Transcode task failed: {0}")]
    Task(String),

    /// Error of a materialization this caller joined rather than ran.
    #[error(transparent)]
    Shared(Arc<CacheError>),
}

impl CacheError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::Usage { .. } => ErrorKind::Usage,
            CacheError::InvalidPath { .. } => ErrorKind::InvalidPath,
            CacheError::Fetch(e) if e.is_not_found() => ErrorKind::NotFound,
            CacheError::Fetch(FetchError::TooLarge { .. }) => ErrorKind::Transform,
            CacheError::Fetch(_) => ErrorKind::TransientIo,
            CacheError::Transform {
                source: BackendError::Io(_),
                ..
            } => ErrorKind::TransientIo,
            CacheError::Transform { .. } | CacheError::Task(_) => ErrorKind::Transform,
            CacheError::Io { .. } => ErrorKind::TransientIo,
            CacheError::AggregateDelete(_) => ErrorKind::AggregateDelete,
            CacheError::Shared(inner) => inner.kind(),
        }
    }
}

/// Construction settings for a [`Cache`].
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub root: PathBuf,
    pub settings: TranscodeSettings,
    /// Largest original that will be buffered for transcoding.
    pub max_source_bytes: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CacheOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            root: config.folder.clone(),
            settings: TranscodeSettings {
                default_max_width: config.default_max_width,
                jpeg_quality: Quality::new(config.jpeg_quality),
                webp_quality: Quality::new(config.webp_quality),
            },
            max_source_bytes: config.max_source_bytes,
        }
    }
}

type Flight = Shared<BoxFuture<'static, Result<(), Arc<CacheError>>>>;

struct Inner {
    options: CacheOptions,
    fetcher: OriginalFetcher,
    backend: Arc<dyn ImageBackend>,
    in_flight: Mutex<HashMap<PathBuf, Flight>>,
}

/// Handle to the derivative cache. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<Inner>,
}

impl Cache {
    pub fn new(
        options: CacheOptions,
        store: Arc<dyn ObjectStore>,
        backend: Arc<dyn ImageBackend>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                fetcher: OriginalFetcher::new(store),
                backend,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.options.root
    }

    pub fn fetcher(&self) -> &OriginalFetcher {
        &self.inner.fetcher
    }

    /// Normalize raw request parameters.
    pub fn parse_param(&self, raw: &RawParams) -> TransformDescriptor {
        normalize(raw)
    }

    /// Location of the derivative for `logical_path` under `raw`.
    pub fn cache_path(&self, logical_path: &str, raw: &RawParams) -> Result<PathBuf, CacheError> {
        key::resolve(self.root(), logical_path, &normalize(raw))
    }

    /// Whether the derivative is already cached.
    pub async fn cache_exists(&self, logical_path: &str, raw: &RawParams) -> Result<bool, CacheError> {
        let path = self.cache_path(logical_path, raw)?;
        artifact_exists(&path).await
    }

    /// Make sure the derivative for `logical_path` under `raw` exists and
    /// return its path.
    ///
    /// On a hit the object store is not contacted.
    pub async fn ensure(&self, logical_path: &str, raw: &RawParams) -> Result<PathBuf, CacheError> {
        let descriptor = normalize(raw);
        if descriptor.original {
            return Err(CacheError::Usage {
                operation: "ensure",
            });
        }
        let path = key::resolve(self.root(), logical_path, &descriptor)?;

        if artifact_exists(&path).await? {
            debug!(path = logical_path, cached = %path.display(), "cache hit");
            return Ok(path);
        }

        self.join_flight(logical_path, descriptor, &path)
            .await
            .map_err(|e| Arc::try_unwrap(e).unwrap_or_else(CacheError::Shared))?;
        Ok(path)
    }

    /// Remove every cached variant of `logical_path`. Returns how many
    /// files were removed.
    pub async fn delete(&self, logical_path: &str) -> Result<usize, CacheError> {
        let removed = invalidate::delete_variants(self.root(), logical_path).await?;
        info!(path = logical_path, removed = removed.len(), "invalidated cache");
        Ok(removed.len())
    }

    /// Return the materialization in flight for `path`, starting one if
    /// there is none.
    fn join_flight(&self, logical_path: &str, descriptor: TransformDescriptor, path: &Path) -> Flight {
        let mut flights = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(flight) = flights.get(path) {
            debug!(path = logical_path, "joining in-flight materialization");
            return flight.clone();
        }

        let cache = self.clone();
        let logical = logical_path.to_string();
        let key = path.to_path_buf();
        // Spawned so the work completes even if every waiter is dropped.
        let task = tokio::spawn(async move {
            let result = cache.materialize(&logical, &descriptor, &key).await;
            cache
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
            result
        });

        let flight = async move {
            match task.await {
                Ok(result) => result.map_err(Arc::new),
                Err(e) => Err(Arc::new(CacheError::Task(e.to_string()))),
            }
        }
        .boxed()
        .shared();
        flights.insert(path.to_path_buf(), flight.clone());
        flight
    }

    async fn materialize(
        &self,
        logical_path: &str,
        descriptor: &TransformDescriptor,
        path: &Path,
    ) -> Result<(), CacheError> {
        // A flight that finished between our miss and taking the lock.
        if artifact_exists(path).await? {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CacheError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let started = Instant::now();
        let source = self
            .inner
            .fetcher
            .read_bounded(logical_path, self.inner.options.max_source_bytes)
            .await?;

        let params = plan_transcode(logical_path, descriptor, &self.inner.options.settings);
        let backend = Arc::clone(&self.inner.backend);
        let dest = path.to_path_buf();
        let dims = tokio::task::spawn_blocking(move || {
            transcode_to_file(backend.as_ref(), &source, &params, &dest)
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
        .map_err(|source| CacheError::Transform {
            path: logical_path.to_string(),
            source,
        })?;

        info!(
            path = logical_path,
            width = dims.width,
            height = dims.height,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "materialized derivative"
        );
        Ok(())
    }
}

async fn artifact_exists(path: &Path) -> Result<bool, CacheError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::imaging::{Dimensions, TranscodeParams};
    use crate::store::MemoryStore;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    fn raw(width: Option<&str>, webp: bool) -> RawParams {
        RawParams {
            original: None,
            webp: webp.then(|| "1".to_string()),
            width: width.map(str::to_string),
        }
    }

    fn setup(backend: Arc<dyn ImageBackend>) -> (TempDir, Arc<MemoryStore>, Cache) {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert("2024/01/a.jpg", b"original".to_vec());
        let options = CacheOptions {
            root: tmp.path().join("cache"),
            ..CacheOptions::default()
        };
        let cache = Cache::new(options, store.clone(), backend);
        (tmp, store, cache)
    }

    /// Backend that sleeps inside transcode so concurrent callers overlap.
    struct SlowBackend(MockBackend);

    impl ImageBackend for SlowBackend {
        fn transcode(
            &self,
            source: &[u8],
            params: &TranscodeParams,
            output: &mut dyn Write,
        ) -> Result<Dimensions, BackendError> {
            std::thread::sleep(Duration::from_millis(100));
            self.0.transcode(source, params, output)
        }
    }

    // =========================================================================
    // ensure
    // =========================================================================

    #[tokio::test]
    async fn ensure_writes_artifact_at_resolved_path() {
        let (tmp, _store, cache) = setup(Arc::new(MockBackend::new()));

        let path = cache.ensure("2024/01/a.jpg", &raw(Some("300"), true)).await.unwrap();

        assert_eq!(
            path,
            tmp.path().join("cache/webp/resized/300/2024/01/a.jpg.webp")
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"webp:300");
        assert!(cache.cache_exists("2024/01/a.jpg", &raw(Some("300"), true)).await.unwrap());
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let (_tmp, store, cache) = setup(Arc::new(MockBackend::new()));
        let params = raw(Some("200"), false);

        let first = cache.ensure("2024/01/a.jpg", &params).await.unwrap();
        let second = cache.ensure("2024/01/a.jpg", &params).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.get_count(), 1);
    }

    #[tokio::test]
    async fn unspecified_width_uses_default_but_keyless_path() {
        let backend = Arc::new(MockBackend::new());
        let (tmp, _store, cache) = setup(backend.clone());

        let path = cache.ensure("2024/01/a.jpg", &raw(Some("garbage"), false)).await.unwrap();

        assert_eq!(path, tmp.path().join("cache/2024/01/a.jpg"));
        assert!(matches!(
            backend.get_operations()[0],
            RecordedOp::Transcode { max_width: 1024, .. }
        ));
    }

    #[tokio::test]
    async fn ensure_original_is_usage_error() {
        let (tmp, store, cache) = setup(Arc::new(MockBackend::new()));
        let params = RawParams {
            original: Some("1".into()),
            ..raw(Some("300"), true)
        };

        let err = cache.ensure("2024/01/a.jpg", &params).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(store.get_count(), 0);
        assert!(!tmp.path().join("cache").exists());
    }

    #[tokio::test]
    async fn ensure_missing_original_is_not_found() {
        let (_tmp, _store, cache) = setup(Arc::new(MockBackend::new()));
        let err = cache.ensure("nope.jpg", &raw(None, false)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn failed_transform_leaves_no_artifact_and_retries() {
        let (_tmp, store, cache) = setup(Arc::new(MockBackend::failing("corrupt")));
        let params = raw(Some("100"), false);

        let err = cache.ensure("2024/01/a.jpg", &params).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transform);
        assert!(!cache.cache_exists("2024/01/a.jpg", &params).await.unwrap());

        // Not cached as a failure: the next call fetches again
        let _ = cache.ensure("2024/01/a.jpg", &params).await;
        assert_eq!(store.get_count(), 2);
    }

    #[tokio::test]
    async fn oversized_original_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert("big.png", vec![0u8; 1024]);
        let options = CacheOptions {
            root: tmp.path().to_path_buf(),
            max_source_bytes: 512,
            ..CacheOptions::default()
        };
        let cache = Cache::new(options, store, Arc::new(MockBackend::new()));

        let err = cache.ensure("big.png", &raw(None, false)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transform);
    }

    #[tokio::test]
    async fn traversal_rejected_before_fetch() {
        let (_tmp, store, cache) = setup(Arc::new(MockBackend::new()));
        let err = cache.ensure("../secret.jpg", &raw(None, false)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
        assert_eq!(store.get_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ensure_shares_one_materialization() {
        let slow = Arc::new(SlowBackend(MockBackend::new()));
        let (_tmp, store, cache) = setup(slow.clone());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.ensure("2024/01/a.jpg", &raw(Some("64"), true)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.get_count(), 1);
        assert_eq!(slow.0.get_operations().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn different_keys_materialize_independently() {
        let (_tmp, store, cache) = setup(Arc::new(MockBackend::new()));

        let small = raw(Some("100"), false);
        let large = raw(Some("200"), false);
        let (a, b) = tokio::join!(
            cache.ensure("2024/01/a.jpg", &small),
            cache.ensure("2024/01/a.jpg", &large),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(store.get_count(), 2);
    }

    // =========================================================================
    // delete
    // =========================================================================

    #[tokio::test]
    async fn delete_removes_every_variant() {
        let (_tmp, _store, cache) = setup(Arc::new(MockBackend::new()));
        let variants = [
            raw(None, false),
            raw(None, true),
            raw(Some("300"), false),
            raw(Some("300"), true),
        ];
        for params in &variants {
            cache.ensure("2024/01/a.jpg", params).await.unwrap();
        }

        assert_eq!(cache.delete("2024/01/a.jpg").await.unwrap(), 4);

        for params in &variants {
            assert!(!cache.cache_exists("2024/01/a.jpg", params).await.unwrap());
        }
    }

    #[tokio::test]
    async fn delete_then_ensure_refetches() {
        let (_tmp, store, cache) = setup(Arc::new(MockBackend::new()));
        let params = raw(Some("300"), false);

        cache.ensure("2024/01/a.jpg", &params).await.unwrap();
        cache.delete("2024/01/a.jpg").await.unwrap();
        cache.ensure("2024/01/a.jpg", &params).await.unwrap();

        assert_eq!(store.get_count(), 2);
    }

    // =========================================================================
    // errors
    // =========================================================================

    #[tokio::test]
    async fn parse_param_normalizes() {
        let (_tmp, _store, cache) = setup(Arc::new(MockBackend::new()));
        assert_eq!(
            cache.parse_param(&raw(Some("0"), true)),
            TransformDescriptor::derivative(None, true)
        );
    }

    #[test]
    fn shared_error_reports_inner_kind() {
        let inner = CacheError::Usage { operation: "x" };
        assert_eq!(CacheError::Shared(Arc::new(inner)).kind(), ErrorKind::Usage);
    }

    #[test]
    fn options_from_config() {
        let config = CacheConfig {
            jpeg_quality: 150,
            ..CacheConfig::default()
        };
        let options = CacheOptions::from(&config);
        assert_eq!(options.settings.jpeg_quality, Quality::new(100));
        assert_eq!(options.settings.default_max_width, 1024);
    }
}

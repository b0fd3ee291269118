//! Variant invalidation.
//!
//! Removes every cached derivative of a logical path. Candidates come from
//! [`key::variant_paths`], so only locations [`key::resolve`] could have
//! produced are touched; a file at `b/a.jpg` is never mistaken for a
//! variant of `a.jpg`.

use super::{CacheError, RemovalFailure, key};
use futures::future::join_all;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Delete all cached variants of `logical_path`.
///
/// Removals run concurrently. A variant that vanished between discovery
/// and removal counts as removed. Every other failure is collected into
/// [`CacheError::AggregateDelete`]; successful removals are not rolled back.
///
/// Returns the paths that were removed.
pub async fn delete_variants(root: &Path, logical_path: &str) -> Result<Vec<PathBuf>, CacheError> {
    let root_owned = root.to_path_buf();
    let logical_owned = logical_path.to_string();
    let candidates = tokio::task::spawn_blocking(move || {
        key::variant_paths(&root_owned, &logical_owned)
            .map(|paths| paths.into_iter().filter(|p| p.is_file()).collect::<Vec<_>>())
    })
    .await
    .map_err(|e| CacheError::Task(e.to_string()))??;

    debug!(path = logical_path, count = candidates.len(), "invalidating variants");
    remove_all(candidates).await
}

/// Remove `candidates` concurrently, collecting every failure.
async fn remove_all(candidates: Vec<PathBuf>) -> Result<Vec<PathBuf>, CacheError> {
    let results = join_all(candidates.into_iter().map(|path| async move {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(Some(path)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RemovalFailure { path, source }),
        }
    }))
    .await;

    let mut removed = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(Some(path)) => removed.push(path),
            Ok(None) => {}
            Err(failure) => {
                warn!(path = %failure.path.display(), error = %failure.source, "variant removal failed");
                failures.push(failure);
            }
        }
    }

    if failures.is_empty() {
        Ok(removed)
    } else {
        Err(CacheError::AggregateDelete(failures))
    }
}

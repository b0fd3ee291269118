//! Cache key derivation.
//!
//! Maps a logical path and transform descriptor to a location under the
//! cache root. The layout is part of the on-disk contract: changing it
//! orphans every artifact already cached.
//!
//! ```text
//! <root>/webp/resized/<width>/<path>.webp   webp + width
//! <root>/webp/<path>.webp                   webp
//! <root>/resized/<width>/<path>             width
//! <root>/<path>                             neither
//! ```

use super::CacheError;
use crate::params::TransformDescriptor;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const WEBP_DIR: &str = "webp";
const RESIZED_DIR: &str = "resized";

/// Reject logical paths that could escape the cache root or the bucket.
///
/// A valid logical path is relative, non-empty, and has no empty, `.` or
/// `..` segments.
pub fn validate_logical_path(path: &str) -> Result<&str, CacheError> {
    let invalid = |reason| CacheError::InvalidPath {
        path: path.to_string(),
        reason,
    };
    if path.is_empty() {
        return Err(invalid("empty path"));
    }
    if path.starts_with('/') {
        return Err(invalid("absolute path"));
    }
    if path.contains('\\') || path.contains('\0') {
        return Err(invalid("forbidden character"));
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid("empty, '.' or '..' segment"));
    }
    Ok(path)
}

fn with_webp_suffix(path: PathBuf) -> PathBuf {
    let mut os: OsString = path.into_os_string();
    os.push(".webp");
    PathBuf::from(os)
}

/// Resolve the cache location for a derivative.
///
/// Fails with [`CacheError::Usage`] for the original descriptor: originals
/// are never cached.
pub fn resolve(
    root: &Path,
    logical_path: &str,
    descriptor: &TransformDescriptor,
) -> Result<PathBuf, CacheError> {
    if descriptor.original {
        return Err(CacheError::Usage {
            operation: "cache path resolution",
        });
    }
    let logical_path = validate_logical_path(logical_path)?;

    let path = match (descriptor.webp, descriptor.width) {
        (true, Some(width)) => with_webp_suffix(
            root.join(WEBP_DIR)
                .join(RESIZED_DIR)
                .join(width.to_string())
                .join(logical_path),
        ),
        (true, None) => with_webp_suffix(root.join(WEBP_DIR).join(logical_path)),
        (false, Some(width)) => root
            .join(RESIZED_DIR)
            .join(width.to_string())
            .join(logical_path),
        (false, None) => root.join(logical_path),
    };
    Ok(path)
}

/// Parse a directory name written by [`resolve`] back into a width.
///
/// Only canonical renderings count: `"300"`, not `"0300"` or `"+300"`.
fn parse_width_dir(name: &str) -> Option<u32> {
    let width: u32 = name.parse().ok()?;
    (width > 0 && width.to_string() == name).then_some(width)
}

/// Widths that have a resized directory under `dir`.
fn cached_widths(dir: &Path) -> std::io::Result<Vec<u32>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut widths = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::other)?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Some(width) = entry.file_name().to_str().and_then(parse_width_dir) {
            widths.push(width);
        }
    }
    widths.sort_unstable();
    Ok(widths)
}

/// Every cache location that could hold a derivative of `logical_path`.
///
/// Inverse of [`resolve`]: scans the `resized` trees under the root and its
/// `webp` subtree for width directories, then resolves each descriptor
/// those widths imply. Blocking; includes paths that may not exist.
pub fn variant_paths(root: &Path, logical_path: &str) -> Result<Vec<PathBuf>, CacheError> {
    let logical_path = validate_logical_path(logical_path)?;
    let io_err = |dir: &Path| {
        let dir = dir.to_path_buf();
        move |source| CacheError::Io { path: dir, source }
    };

    let resized = root.join(RESIZED_DIR);
    let webp_resized = root.join(WEBP_DIR).join(RESIZED_DIR);

    let mut descriptors = vec![
        TransformDescriptor::derivative(None, false),
        TransformDescriptor::derivative(None, true),
    ];
    for width in cached_widths(&resized).map_err(io_err(&resized))? {
        descriptors.push(TransformDescriptor::derivative(Some(width), false));
    }
    for width in cached_widths(&webp_resized).map_err(io_err(&webp_resized))? {
        descriptors.push(TransformDescriptor::derivative(Some(width), true));
    }

    descriptors
        .iter()
        .map(|d| resolve(root, logical_path, d))
        .collect()
}

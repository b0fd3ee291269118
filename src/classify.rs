//! Decides which logical paths are eligible for transcoding.
//!
//! Everything else is served verbatim from the object store.

use image::ImageFormat;
use std::path::Path;

/// Extensions that go through the derivative cache, with the format their
/// bytes are expected to decode as.
const IMAGE_EXTENSIONS: &[(&str, ImageFormat)] = &[
    ("png", ImageFormat::Png),
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("jpe", ImageFormat::Jpeg),
    ("jfif", ImageFormat::Jpeg),
    ("webp", ImageFormat::WebP),
];

fn lowercase_extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Image format implied by a path's extension, if it is a cacheable image.
pub fn image_format(path: &str) -> Option<ImageFormat> {
    let ext = lowercase_extension(path)?;
    IMAGE_EXTENSIONS
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, format)| *format)
}

/// True when the lowercased extension is a transcodable image type.
pub fn is_image_ext(path: &str) -> bool {
    image_format(path).is_some()
}

/// Recover the logical path from a request path.
///
/// Strips a leading `/`, then maps `name.<ext>.webp` back to `name.<ext>`
/// so that WebP-suffixed URLs share a cache key with their source. A bare
/// `name.webp` is left alone: it is itself the source.
pub fn logical_path(request_path: &str) -> &str {
    let path = request_path.strip_prefix('/').unwrap_or(request_path);
    let Some(stem) = path.strip_suffix(".webp") else {
        return path;
    };
    let file_name = stem.rsplit('/').next().unwrap_or(stem);
    match file_name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < file_name.len() => stem,
        _ => path,
    }
}

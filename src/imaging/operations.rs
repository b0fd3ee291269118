//! High-level transcode operations.
//!
//! These functions turn a logical path and transform descriptor into
//! [`TranscodeParams`], then drive the backend to produce a file.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{OutputFormat, Quality, TranscodeParams};
use crate::classify;
use crate::params::TransformDescriptor;
use image::ImageFormat;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Encoder settings shared by every derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeSettings {
    /// Width used when the descriptor carries none.
    pub default_max_width: u32,
    pub jpeg_quality: Quality,
    pub webp_quality: Quality,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            default_max_width: 1024,
            jpeg_quality: Quality::default(),
            webp_quality: Quality::default(),
        }
    }
}

/// Plan a transcode without executing it.
///
/// The base output keeps the source's own format (PNG gets adaptive
/// filtering). A WebP request overrides it: lossy at `webp_quality`, or
/// near-lossless when the source extension is `.png`.
pub fn plan_transcode(
    logical_path: &str,
    descriptor: &TransformDescriptor,
    settings: &TranscodeSettings,
) -> TranscodeParams {
    let source_format = classify::image_format(logical_path);

    let output = if descriptor.webp {
        OutputFormat::WebP {
            quality: settings.webp_quality,
            near_lossless: source_format == Some(ImageFormat::Png),
        }
    } else {
        match source_format {
            Some(ImageFormat::Jpeg) => OutputFormat::Jpeg(settings.jpeg_quality),
            Some(ImageFormat::WebP) => OutputFormat::WebP {
                quality: settings.webp_quality,
                near_lossless: false,
            },
            _ => OutputFormat::Png,
        }
    };

    TranscodeParams {
        max_width: descriptor.width.unwrap_or(settings.default_max_width),
        source_format,
        output,
    }
}

/// Transcode `source` into `dest`.
///
/// The derivative is written to a temporary file beside `dest` and renamed
/// into place only after the encoder finished, so `dest` is either absent
/// or complete. Blocking: call from a blocking-capable thread.
pub fn transcode_to_file(
    backend: &dyn ImageBackend,
    source: &[u8],
    params: &TranscodeParams,
    dest: &Path,
) -> Result<Dimensions> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::Builder::new()
        .prefix(".partial-")
        .tempfile_in(dir)?;

    let mut writer = BufWriter::new(tmp.as_file());
    let dims = backend.transcode(source, params, &mut writer)?;
    writer.flush()?;
    drop(writer);

    tmp.persist(dest).map_err(|e| BackendError::Io(e.error))?;
    Ok(dims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use tempfile::TempDir;

    #[test]
    fn plan_default_width_when_unspecified() {
        let params = plan_transcode(
            "a/b.jpg",
            &TransformDescriptor::derivative(None, false),
            &TranscodeSettings::default(),
        );
        assert_eq!(params.max_width, 1024);
        assert_eq!(params.output, OutputFormat::Jpeg(Quality::default()));
        assert_eq!(params.source_format, Some(ImageFormat::Jpeg));
    }

    #[test]
    fn plan_explicit_width() {
        let params = plan_transcode(
            "a/b.png",
            &TransformDescriptor::derivative(Some(300), false),
            &TranscodeSettings::default(),
        );
        assert_eq!(params.max_width, 300);
        assert_eq!(params.output, OutputFormat::Png);
    }

    #[test]
    fn plan_webp_from_png_is_near_lossless() {
        let params = plan_transcode(
            "a/B.PNG",
            &TransformDescriptor::derivative(None, true),
            &TranscodeSettings::default(),
        );
        assert_eq!(
            params.output,
            OutputFormat::WebP {
                quality: Quality::default(),
                near_lossless: true,
            }
        );
    }

    #[test]
    fn plan_webp_from_jpeg_is_not_near_lossless() {
        let params = plan_transcode(
            "a/b.jpeg",
            &TransformDescriptor::derivative(Some(640), true),
            &TranscodeSettings::default(),
        );
        assert_eq!(
            params.output,
            OutputFormat::WebP {
                quality: Quality::default(),
                near_lossless: false,
            }
        );
    }

    #[test]
    fn plan_webp_uses_configured_quality() {
        let settings = TranscodeSettings {
            webp_quality: Quality::new(55),
            ..TranscodeSettings::default()
        };
        let params = plan_transcode(
            "a/b.jpg",
            &TransformDescriptor::derivative(None, true),
            &settings,
        );
        assert_eq!(
            params.output,
            OutputFormat::WebP {
                quality: Quality::new(55),
                near_lossless: false,
            }
        );
    }

    #[test]
    fn plan_webp_source_stays_webp() {
        let params = plan_transcode(
            "a/b.webp",
            &TransformDescriptor::derivative(None, false),
            &TranscodeSettings::default(),
        );
        assert_eq!(
            params.output,
            OutputFormat::WebP {
                quality: Quality::default(),
                near_lossless: false,
            }
        );
    }

    #[test]
    fn transcode_to_file_writes_dest() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out.png");
        let backend = MockBackend::new();
        let params = plan_transcode(
            "x.png",
            &TransformDescriptor::derivative(Some(320), false),
            &TranscodeSettings::default(),
        );

        transcode_to_file(&backend, b"src", &params, &dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"png:320");
        assert!(matches!(
            &backend.get_operations()[0],
            RecordedOp::Transcode { max_width: 320, source_len: 3, .. }
        ));
    }

    #[test]
    fn failed_transcode_leaves_no_file() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out.png");
        let backend = MockBackend::failing("decode");
        let params = plan_transcode(
            "x.png",
            &TransformDescriptor::derivative(None, false),
            &TranscodeSettings::default(),
        );

        assert!(transcode_to_file(&backend, b"src", &params, &dest).is_err());
        assert!(!dest.exists());
        // Temporary file cleaned up too
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}

//! Parameter types for transcode operations.
//!
//! These structs describe *what* to produce, not *how*. They sit between
//! [`operations`](super::operations), which plans a derivative from a
//! logical path and a transform descriptor, and the
//! [`backend`](super::backend), which does the pixel work.
//!
//! ## Types
//!
//! - [`Quality`] — Lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`OutputFormat`] — Encoder selection for the derivative.
//! - [`TranscodeParams`] — Full specification of one transcode.

use image::ImageFormat;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// Encoder used for a derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// PNG with adaptive per-row filtering.
    Png,
    Jpeg(Quality),
    /// Lossy WebP (VP8) at `quality`, or near-lossless VP8L when
    /// `near_lossless` is set, with `quality` as the preprocessing level.
    WebP {
        quality: Quality,
        near_lossless: bool,
    },
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg(_) => "jpg",
            OutputFormat::WebP { .. } => "webp",
        }
    }
}

/// Parameters for a single transcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeParams {
    /// Fit the output within this width. Never enlarges.
    pub max_width: u32,
    /// Decoder hint from the logical path's extension; sniffed when absent.
    pub source_format: Option<ImageFormat>,
    pub output: OutputFormat,
}

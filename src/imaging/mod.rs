//! Image processing: decode, orient, resize and encode derivatives.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode → Orient → Resize** | `image` decoders with EXIF orientation, Lanczos3 |
//! | **Encode** | `image` PNG/JPEG encoders, libwebp through the `webp` crate |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing a transcode
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: Planning from a transform descriptor, and file output

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

use std::sync::OnceLock;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::calculate_contain_dimensions;
pub use operations::{TranscodeSettings, plan_transcode, transcode_to_file};
pub use params::{OutputFormat, Quality, TranscodeParams};
pub use rust_backend::RustBackend;

/// Process-wide decoder limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformLimits {
    /// Largest decoded width or height accepted.
    pub max_dimension: u32,
    /// Largest allocation a single decode may make, in bytes.
    pub max_alloc: u64,
}

impl Default for TransformLimits {
    fn default() -> Self {
        Self {
            max_dimension: 16_384,
            max_alloc: 512 * 1024 * 1024,
        }
    }
}

static LIMITS: OnceLock<TransformLimits> = OnceLock::new();

/// Apply process-wide transform settings.
///
/// Must run before the first transcode; the first call wins and later calls
/// return `false`. Without a call, [`TransformLimits::default`] applies.
pub fn init(limits: TransformLimits) -> bool {
    LIMITS.set(limits).is_ok()
}

pub(crate) fn decode_limits() -> image::Limits {
    let configured = LIMITS.get_or_init(TransformLimits::default);
    let mut limits = image::Limits::default();
    limits.max_image_width = Some(configured.max_dimension);
    limits.max_image_height = Some(configured.max_dimension);
    limits.max_alloc = Some(configured.max_alloc);
    limits
}

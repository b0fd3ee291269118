//! Transcode backend built on the `image` crate, with libwebp for WebP output.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP) | `image::ImageReader` with content sniffing |
//! | Auto-orient | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Encode → PNG | `PngEncoder` with adaptive filtering |
//! | Encode → JPEG | `JpegEncoder` at the configured quality |
//! | Encode → WebP | `webp::Encoder`: lossy VP8, or near-lossless VP8L for PNG sources |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::calculate_contain_dimensions;
use super::params::{OutputFormat, Quality, TranscodeParams};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::{Cursor, Write};

/// Transcode backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Open a decoder over `source`, trusting the content over the extension hint.
fn open_decoder(
    source: &[u8],
    hint: Option<ImageFormat>,
) -> Result<impl ImageDecoder + '_, BackendError> {
    let mut reader = ImageReader::new(Cursor::new(source));
    if let Some(format) = hint {
        reader.set_format(format);
    }
    let mut reader = reader.with_guessed_format()?;
    reader.limits(super::decode_limits());
    reader
        .into_decoder()
        .map_err(|e| BackendError::ProcessingFailed(format!("Failed to open decoder: {e}")))
}

/// Decode and apply embedded orientation metadata.
fn load_oriented(source: &[u8], hint: Option<ImageFormat>) -> Result<DynamicImage, BackendError> {
    let mut decoder = open_decoder(source, hint)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("Failed to decode: {e}")))?;
    img.apply_orientation(orientation);
    Ok(img)
}

fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    output: &mut dyn Write,
) -> Result<(), BackendError> {
    let result = match format {
        OutputFormat::Png => img.write_with_encoder(PngEncoder::new_with_quality(
            output,
            CompressionType::Default,
            PngFilterType::Adaptive,
        )),
        OutputFormat::Jpeg(quality) => {
            // JPEG carries no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(output, quality.value()))
        }
        OutputFormat::WebP {
            quality,
            near_lossless,
        } => return encode_webp(img, quality, near_lossless, output),
    };
    result.map_err(|e| {
        BackendError::ProcessingFailed(format!("{} encode failed: {e}", format.extension()))
    })
}

/// Encode through libwebp.
///
/// Near-lossless mode runs VP8L with `quality` as the preprocessing level:
/// smooth regions are adjusted slightly, edges stay exact.
fn encode_webp(
    img: &DynamicImage,
    quality: Quality,
    near_lossless: bool,
    output: &mut dyn Write,
) -> Result<(), BackendError> {
    let (width, height) = (img.width(), img.height());
    let pixels;
    let encoder = if img.color().has_alpha() {
        pixels = img.to_rgba8().into_raw();
        webp::Encoder::from_rgba(&pixels, width, height)
    } else {
        pixels = img.to_rgb8().into_raw();
        webp::Encoder::from_rgb(&pixels, width, height)
    };

    let memory = if near_lossless {
        let mut config = webp::WebPConfig::new().map_err(|()| {
            BackendError::ProcessingFailed("webp encode failed: invalid config".into())
        })?;
        config.lossless = 1;
        config.near_lossless = i32::from(quality.value());
        config.quality = f32::from(quality.value());
        encoder
            .encode_advanced(&config)
            .map_err(|e| BackendError::ProcessingFailed(format!("webp encode failed: {e:?}")))?
    } else {
        encoder.encode(f32::from(quality.value()))
    };

    output.write_all(&memory)?;
    Ok(())
}

impl ImageBackend for RustBackend {
    fn transcode(
        &self,
        source: &[u8],
        params: &TranscodeParams,
        output: &mut dyn Write,
    ) -> Result<Dimensions, BackendError> {
        let img = load_oriented(source, params.source_format)?;

        let (width, height) =
            calculate_contain_dimensions((img.width(), img.height()), params.max_width);
        let img = if (width, height) == (img.width(), img.height()) {
            img
        } else {
            img.resize_exact(width, height, FilterType::Lanczos3)
        };

        encode(&img, params.output, output)?;
        Ok(Dimensions { width, height })
    }
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Sketch validation and normalization for conditioned generation

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, ColorType, DynamicImage, ImageFormat};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Longest side allowed for a sketch sent to the backend
pub const MAX_SKETCH_DIMENSION: u32 = 512;

/// JPEG quality used when re-encoding sketches
pub const JPEG_QUALITY: u8 = 95;

/// Failures while turning uploaded bytes into a transport-safe sketch
#[derive(Debug, Error)]
pub enum PreprocessingError {
    #[error("Sketch data is empty")]
    EmptyData,

    #[error("Unsupported image format")]
    UnsupportedFormat,

    #[error("Failed to decode sketch: {0}")]
    DecodeFailed(String),

    #[error("Failed to encode sketch: {0}")]
    EncodeFailed(String),

    #[error("Preprocessing task failed: {0}")]
    TaskFailed(String),
}

/// Basic facts about a decoded sketch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SketchInfo {
    pub width: u32,
    pub height: u32,
    /// Color mode name, e.g. "RGB", "RGBA", "L"
    pub mode: String,
    /// Container format, e.g. "PNG"
    pub format: String,
}

/// Detect image format from magic bytes
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, PreprocessingError> {
    if bytes.len() < 4 {
        return Err(PreprocessingError::UnsupportedFormat);
    }

    match bytes {
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Ok(ImageFormat::Png),

        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Ok(ImageFormat::Jpeg),

        // WebP: RIFF .... WEBP
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Ok(ImageFormat::WebP),

        // GIF87a / GIF89a
        [0x47, 0x49, 0x46, 0x38, x, ..] if *x == 0x37 || *x == 0x39 => Ok(ImageFormat::Gif),

        // BMP: BM
        [0x42, 0x4D, ..] => Ok(ImageFormat::Bmp),

        // TIFF: II or MM
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Ok(ImageFormat::Tiff),

        _ => Err(PreprocessingError::UnsupportedFormat),
    }
}

/// Upper-case format name as reported by `inspect`
pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "PNG",
        ImageFormat::Jpeg => "JPEG",
        ImageFormat::WebP => "WEBP",
        ImageFormat::Gif => "GIF",
        ImageFormat::Bmp => "BMP",
        ImageFormat::Tiff => "TIFF",
        _ => "UNKNOWN",
    }
}

/// Color mode name for a decoded buffer
pub fn color_mode_name(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 => "L",
        ColorType::La8 => "LA",
        ColorType::Rgb8 => "RGB",
        ColorType::Rgba8 => "RGBA",
        ColorType::L16 => "I;16",
        ColorType::La16 => "LA;16",
        ColorType::Rgb16 => "RGB;16",
        ColorType::Rgba16 => "RGBA;16",
        ColorType::Rgb32F => "RGB;F",
        ColorType::Rgba32F => "RGBA;F",
        _ => "UNKNOWN",
    }
}

fn decode(bytes: &[u8]) -> Result<(DynamicImage, ImageFormat), PreprocessingError> {
    if bytes.is_empty() {
        return Err(PreprocessingError::EmptyData);
    }

    let format = detect_format(bytes)?;
    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| PreprocessingError::DecodeFailed(e.to_string()))?;

    Ok((img, format))
}

/// Whether the bytes decode as a supported image. Never panics.
pub fn validate(bytes: &[u8]) -> bool {
    match decode(bytes) {
        Ok(_) => true,
        Err(e) => {
            debug!("Sketch validation failed: {}", e);
            false
        }
    }
}

/// Best-effort metadata; `None` when the bytes do not decode
pub fn inspect(bytes: &[u8]) -> Option<SketchInfo> {
    let (img, format) = decode(bytes).ok()?;
    Some(SketchInfo {
        width: img.width(),
        height: img.height(),
        mode: color_mode_name(img.color()).to_string(),
        format: format_name(format).to_string(),
    })
}

/// Upload size gate, checked before any decoding
pub fn is_valid_size(bytes: &[u8], max_bytes: usize) -> bool {
    bytes.len() <= max_bytes
}

/// Whether a declared content type is an `image/*` MIME type
pub fn is_image_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false)
}

/// Drop alpha by compositing over white; palettes are already expanded by the decoder.
fn flatten(img: DynamicImage) -> DynamicImage {
    match img.color() {
        ColorType::L8 | ColorType::Rgb8 => img,
        color if color.has_alpha() => {
            let rgba = img.to_rgba8();
            let mut flat = RgbImage::new(rgba.width(), rgba.height());
            for (x, y, pixel) in rgba.enumerate_pixels() {
                let alpha = u16::from(pixel[3]);
                let blend = |channel: u8| -> u8 {
                    ((u16::from(channel) * alpha + 255 * (255 - alpha)) / 255) as u8
                };
                flat.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
            }
            DynamicImage::ImageRgb8(flat)
        }
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

/// Decode, flatten, downsample to fit 512x512 and re-encode as base64 JPEG
pub fn preprocess(bytes: &[u8]) -> Result<String, PreprocessingError> {
    let (img, format) = decode(bytes)?;
    let (src_w, src_h) = (img.width(), img.height());

    let mut img = flatten(img);
    if img.width() > MAX_SKETCH_DIMENSION || img.height() > MAX_SKETCH_DIMENSION {
        img = img.resize(MAX_SKETCH_DIMENSION, MAX_SKETCH_DIMENSION, FilterType::Lanczos3);
    }

    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    img.write_with_encoder(encoder)
        .map_err(|e| PreprocessingError::EncodeFailed(e.to_string()))?;

    debug!(
        "Sketch preprocessed: {}x{} {} -> {}x{} JPEG ({} bytes)",
        src_w,
        src_h,
        format_name(format),
        img.width(),
        img.height(),
        jpeg.len()
    );

    Ok(STANDARD.encode(&jpeg))
}

//! Pure Rust codec adapter on top of the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (PNG, JPEG, WebP) | `image::load_from_memory` (pure Rust decoders) |
//! | Encode → WebP | `webp::Encoder` (lossy VP8 at `quality`; lossless VP8L at 100) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | Encode → PNG | passthrough for in-memory bytes, `ImageFormat::Png` for conversions |
//!
//! The `image` crate only writes lossless WebP, so lossy WebP goes through
//! libwebp via the `webp` crate. Quality 100 keeps the lossless encoder.

use super::codec::{CodecError, ImageCodec};
use super::params::{Quality, TargetFormat};
use crate::assets::write_atomic;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Codec using the `image` crate's pure Rust encoders and decoders.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustCodec {
    quality: Quality,
}

impl RustCodec {
    pub fn new(quality: Quality) -> Self {
        Self { quality }
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    fn encode(&self, img: &DynamicImage, format: TargetFormat) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        match format {
            TargetFormat::WebP if self.quality.value() < 100 => {
                return encode_lossy_webp(img, self.quality);
            }
            TargetFormat::WebP => {
                let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
                rgba.write_with_encoder(WebPEncoder::new_lossless(&mut out))
            }
            TargetFormat::Avif => {
                let encoder =
                    AvifEncoder::new_with_speed_quality(&mut out, 6, self.quality.as_u8());
                img.write_with_encoder(encoder)
            }
            TargetFormat::Jpeg => {
                // JPEG has no alpha channel
                let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(
                    &mut out,
                    self.quality.as_u8(),
                ))
            }
            TargetFormat::Png => img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png),
        }
        .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(out)
    }
}

fn encode_lossy_webp(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, CodecError> {
    let rgba = img.to_rgba8();
    let encoded = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
        .encode_simple(false, quality.value() as f32)
        .map_err(|e| CodecError::Encode(format!("webp: {e:?}")))?;
    Ok(encoded.to_vec())
}

fn target_format(target: &Path) -> Result<TargetFormat, CodecError> {
    TargetFormat::from_path(target)
        .ok_or_else(|| CodecError::UnsupportedFormat(target.display().to_string()))
}

fn decode(bytes: &[u8], label: &str) -> Result<DynamicImage, CodecError> {
    image::load_from_memory(bytes)
        .map_err(|e| CodecError::Decode(format!("failed to decode {label}: {e}")))
}

impl ImageCodec for RustCodec {
    fn convert(&self, source: &Path, target: &Path) -> Result<(), CodecError> {
        let format = target_format(target)?;
        if !source.is_file() {
            return Err(CodecError::MissingSource(source.display().to_string()));
        }
        let bytes = std::fs::read(source)?;
        let img = decode(&bytes, &source.display().to_string())?;
        let encoded = self.encode(&img, format)?;
        write_atomic(target, &encoded)?;
        Ok(())
    }

    fn encode_for(&self, bytes: &[u8], target: &Path) -> Result<Vec<u8>, CodecError> {
        let format = target_format(target)?;
        if !format.is_compressed() {
            return Ok(bytes.to_vec());
        }
        let img = decode(bytes, "image data")?;
        self.encode(&img, format)
    }
}

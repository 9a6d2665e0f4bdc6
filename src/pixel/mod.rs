//! Deterministic pixel post-processing.
//!
//! Everything here is pure, synchronous and CPU-bound. Callers on an async
//! runtime should run it through `tokio::task::spawn_blocking`.

pub mod chroma;
pub mod drift;

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::asset::ImageData;
use crate::errors::PixelError;

pub use chroma::{ChromaKeyExtractor, ChromaKeySettings};
pub use drift::{DriftReport, SilhouetteDriftValidator};

/// Decode any supported encoded image into straight RGBA8.
pub fn decode_rgba(image: &ImageData) -> Result<RgbaImage, PixelError> {
    let decoded = image::load_from_memory(image.bytes()).map_err(PixelError::Decode)?;
    Ok(decoded.to_rgba8())
}

/// Encode RGBA8 pixels as PNG.
pub fn encode_png(pixels: RgbaImage) -> Result<ImageData, PixelError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(pixels)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(PixelError::Encode)?;
    Ok(ImageData::png(buf))
}

//! Silhouette drift between a base image and a gear-augmented candidate.
//!
//! Advisory only: a high score hints that synthesis invented silhouette area
//! instead of layering gear over the fixed body. Nothing here blocks a flow.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::Serialize;

use crate::asset::ImageData;
use crate::errors::PixelError;

use super::decode_rgba;

/// Side of the square both images are downscaled to.
pub const MASK_RESOLUTION: u32 = 128;
/// Manhattan RGB distance below which a pixel counts as background.
pub const BACKGROUND_TOLERANCE: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DriftReport {
    /// Share of candidate subject pixels that fall on base background, in [0, 100]
    pub percent: f64,
    pub drift_pixels: u32,
    pub subject_pixels: u32,
}

impl DriftReport {
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.percent > threshold
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SilhouetteDriftValidator;

impl SilhouetteDriftValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, base: &ImageData, candidate: &ImageData) -> Result<DriftReport, PixelError> {
        let base = decode_rgba(base)?;
        let candidate = decode_rgba(candidate)?;
        Ok(self.compare(&base, &candidate))
    }

    pub fn compare(&self, base: &RgbaImage, candidate: &RgbaImage) -> DriftReport {
        let base = downscale(base);
        let candidate = downscale(candidate);

        // Single top-left sample of the base; the candidate is classified against it too.
        let background = base.get_pixel(0, 0).0;

        let mut drift_pixels = 0u32;
        let mut subject_pixels = 0u32;
        for (base_px, cand_px) in base.pixels().zip(candidate.pixels()) {
            if !is_subject(cand_px.0, background) {
                continue;
            }
            subject_pixels += 1;
            if !is_subject(base_px.0, background) {
                drift_pixels += 1;
            }
        }

        let percent = if subject_pixels == 0 {
            0.0
        } else {
            f64::from(drift_pixels) / f64::from(subject_pixels) * 100.0
        };
        DriftReport {
            percent,
            drift_pixels,
            subject_pixels,
        }
    }
}

fn downscale(img: &RgbaImage) -> RgbaImage {
    if img.dimensions() == (MASK_RESOLUTION, MASK_RESOLUTION) {
        return img.clone();
    }
    imageops::resize(img, MASK_RESOLUTION, MASK_RESOLUTION, FilterType::Triangle)
}

fn is_subject(pixel: [u8; 4], background: [u8; 4]) -> bool {
    let diff: u32 = (0..3).map(|i| u32::from(pixel[i].abs_diff(background[i]))).sum();
    diff >= BACKGROUND_TOLERANCE
}

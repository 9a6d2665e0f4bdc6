//! Solid-background removal.
//!
//! The background color is estimated from the four corner pixels, so the
//! extractor works for any solid field, not only magenta.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::asset::ImageData;
use crate::errors::PixelError;

use super::{decode_rgba, encode_png};

/// Channel weights approximating luma sensitivity.
const WEIGHT_R: f64 = 0.3;
const WEIGHT_G: f64 = 0.59;
const WEIGHT_B: f64 = 0.11;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChromaKeySettings {
    /// Distance below which a pixel becomes fully transparent
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Width of the linear alpha ramp above `threshold`
    #[serde(default = "default_feather")]
    pub feather: f64,
}

fn default_threshold() -> f64 {
    45.0
}

fn default_feather() -> f64 {
    2.0
}

impl Default for ChromaKeySettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            feather: default_feather(),
        }
    }
}

impl ChromaKeySettings {
    pub fn validate(&self) -> Result<(), PixelError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(PixelError::InvalidParameters(format!(
                "threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }
        if !self.feather.is_finite() || self.feather < 0.0 {
            return Err(PixelError::InvalidParameters(format!(
                "feather must be a non-negative number, got {}",
                self.feather
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChromaKeyExtractor {
    settings: ChromaKeySettings,
}

impl ChromaKeyExtractor {
    pub fn new(settings: ChromaKeySettings) -> Result<Self, PixelError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> ChromaKeySettings {
        self.settings
    }

    /// Decode, key out the background and re-encode as PNG.
    pub fn extract(&self, image: &ImageData) -> Result<ImageData, PixelError> {
        let mut pixels = decode_rgba(image)?;
        self.apply(&mut pixels);
        encode_png(pixels)
    }

    /// Key out the background in place. Only alpha is written; RGB is kept.
    pub fn apply(&self, pixels: &mut RgbaImage) {
        if pixels.width() == 0 || pixels.height() == 0 {
            return;
        }
        let background = estimate_background(pixels);
        let ChromaKeySettings { threshold, feather } = self.settings;

        for pixel in pixels.pixels_mut() {
            let dist = weighted_distance(pixel.0, background);
            if dist < threshold {
                pixel.0[3] = 0;
            } else if dist < threshold + feather {
                let ramp = (dist - threshold) / feather;
                pixel.0[3] = (ramp * 255.0).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Average of the four corner pixels, per channel.
pub fn estimate_background(pixels: &RgbaImage) -> [f64; 3] {
    let (w, h) = (pixels.width() - 1, pixels.height() - 1);
    let corners = [(0, 0), (w, 0), (0, h), (w, h)];
    let mut sum = [0.0f64; 3];
    for (x, y) in corners {
        let p = pixels.get_pixel(x, y).0;
        for (acc, channel) in sum.iter_mut().zip(p) {
            *acc += f64::from(channel);
        }
    }
    sum.map(|c| c / 4.0)
}

/// Perceptually weighted Euclidean distance from a pixel to `background`.
pub fn weighted_distance(pixel: [u8; 4], background: [f64; 3]) -> f64 {
    let dr = f64::from(pixel[0]) - background[0];
    let dg = f64::from(pixel[1]) - background[1];
    let db = f64::from(pixel[2]) - background[2];
    (dr * dr * WEIGHT_R + dg * dg * WEIGHT_G + db * db * WEIGHT_B).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const MAGENTA: Rgba<u8> = Rgba([255, 0, 255, 255]);

    fn sprite(background: Rgba<u8>) -> RgbaImage {
        sprite_with(background, Rgba([40, 120, 60, 255]))
    }

    fn sprite_with(background: Rgba<u8>, body: Rgba<u8>) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(16, 16, background);
        for y in 4..12 {
            for x in 4..12 {
                img.put_pixel(x, y, body);
            }
        }
        img
    }

    #[test]
    fn test_background_becomes_transparent_subject_stays() {
        let mut img = sprite(MAGENTA);
        ChromaKeyExtractor::default().apply(&mut img);
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 255, 0]);
        assert_eq!(img.get_pixel(15, 8).0[3], 0);
        assert_eq!(img.get_pixel(8, 8).0, [40, 120, 60, 255]);
    }

    #[test]
    fn test_background_color_is_not_hard_coded() {
        let teal = Rgba([0, 128, 128, 255]);
        let mut img = sprite_with(teal, Rgba([250, 250, 0, 255]));
        ChromaKeyExtractor::default().apply(&mut img);
        assert_eq!(img.get_pixel(0, 15).0[3], 0);
        assert_eq!(img.get_pixel(5, 5).0[3], 255);
    }

    #[test]
    fn test_feather_ramp_is_partial() {
        // Offset from magenta in blue only: dist = sqrt(0.11) * db
        let mut img = RgbaImage::from_pixel(8, 8, MAGENTA);
        let settings = ChromaKeySettings {
            threshold: 45.0,
            feather: 10.0,
        };
        // db = 150 -> dist ≈ 49.75, inside [45, 55)
        img.put_pixel(3, 3, Rgba([255, 0, 105, 255]));
        ChromaKeyExtractor::new(settings).unwrap().apply(&mut img);
        let alpha = img.get_pixel(3, 3).0[3];
        assert!(alpha > 0 && alpha < 255, "alpha was {}", alpha);
    }

    #[test]
    fn test_ramp_boundaries_are_exact() {
        // Blue-only offset from magenta; corners stay pure magenta
        let edge = Rgba([255, 0, 105, 255]);
        let dist = weighted_distance(edge.0, [255.0, 0.0, 255.0]);
        assert!((16.0..=64.0).contains(&dist));

        let keyed_alpha = |threshold: f64, feather: f64| {
            let mut img = RgbaImage::from_pixel(8, 8, MAGENTA);
            img.put_pixel(3, 3, edge);
            ChromaKeyExtractor::new(ChromaKeySettings { threshold, feather })
                .unwrap()
                .apply(&mut img);
            img.get_pixel(3, 3).0[3]
        };

        // dist - 32 is exact for dist in [16, 64], so threshold + feather == dist
        let feather = dist - 32.0;
        assert_eq!(32.0 + feather, dist);
        assert_eq!(keyed_alpha(32.0, feather), 255);

        // Exactly at the threshold the ramp starts at zero
        assert_eq!(keyed_alpha(dist, 2.0), 0);
        assert_eq!(keyed_alpha(dist, 0.0), 255);
    }

    #[test]
    fn test_pixels_beyond_ramp_keep_alpha() {
        let mut img = RgbaImage::from_pixel(8, 8, MAGENTA);
        img.put_pixel(2, 2, Rgba([0, 255, 0, 255]));
        img.put_pixel(3, 3, Rgba([0, 255, 0, 90]));
        ChromaKeyExtractor::default().apply(&mut img);
        assert_eq!(img.get_pixel(2, 2).0[3], 255);
        assert_eq!(img.get_pixel(3, 3).0[3], 90);
    }

    #[test]
    fn test_zero_feather_is_a_hard_cut() {
        let mut img = sprite(MAGENTA);
        let extractor = ChromaKeyExtractor::new(ChromaKeySettings {
            threshold: 45.0,
            feather: 0.0,
        })
        .unwrap();
        extractor.apply(&mut img);
        assert!(img.pixels().all(|p| p.0[3] == 0 || p.0[3] == 255));
    }

    #[test]
    fn test_extract_is_idempotent() {
        let extractor = ChromaKeyExtractor::default();
        let once = extractor
            .extract(&encode_png(sprite(MAGENTA)).unwrap())
            .unwrap();
        let twice = extractor.extract(&once).unwrap();
        assert_eq!(decode_rgba(&once).unwrap(), decode_rgba(&twice).unwrap());
    }

    #[test]
    fn test_output_keeps_dimensions() {
        let img = RgbaImage::from_pixel(7, 3, MAGENTA);
        let out = ChromaKeyExtractor::default()
            .extract(&encode_png(img).unwrap())
            .unwrap();
        let decoded = decode_rgba(&out).unwrap();
        assert_eq!(decoded.dimensions(), (7, 3));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let bad = ChromaKeySettings {
            threshold: -1.0,
            feather: 2.0,
        };
        assert!(ChromaKeyExtractor::new(bad).is_err());
        let bad = ChromaKeySettings {
            threshold: 45.0,
            feather: f64::NAN,
        };
        assert!(ChromaKeyExtractor::new(bad).is_err());
    }

    #[test]
    fn test_decode_failure_is_reported() {
        let err = ChromaKeyExtractor::default()
            .extract(&ImageData::png(vec![0u8; 10]))
            .unwrap_err();
        assert!(matches!(err, PixelError::Decode(_)));
    }
}

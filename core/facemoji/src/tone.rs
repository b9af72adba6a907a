//! Percentile-based dual-threshold tone remap.
//!
//! The darkest `low_cutoff_percent` of pixels are pulled toward black by
//! `darken_factor`, the brightest `high_cutoff_percent` are pushed toward
//! white by `brighten_factor`. Luminance is the plain mean of R, G and B.
//!
//! When the two cutoffs add up to more than 100% a pixel can fall in both
//! sets. The dark set wins: such pixels are darkened and never brightened.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-request tone parameters, all percentages in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneParams {
    /// How far bright pixels move toward white.
    pub brighten_factor: f32,
    /// How far dark pixels move toward black.
    pub darken_factor: f32,
    /// Share of pixels treated as dark.
    pub low_cutoff_percent: f32,
    /// Share of pixels treated as bright.
    pub high_cutoff_percent: f32,
}

impl Default for ToneParams {
    fn default() -> Self {
        Self {
            brighten_factor: 50.0,
            darken_factor: 50.0,
            low_cutoff_percent: 30.0,
            high_cutoff_percent: 20.0,
        }
    }
}

impl ToneParams {
    /// Copy with every field clamped to `[0, 100]`; NaN becomes 0.
    pub fn clamped(self) -> Self {
        let clamp = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, 100.0) };
        Self {
            brighten_factor: clamp(self.brighten_factor),
            darken_factor: clamp(self.darken_factor),
            low_cutoff_percent: clamp(self.low_cutoff_percent),
            high_cutoff_percent: clamp(self.high_cutoff_percent),
        }
    }
}

/// Luminance thresholds computed for one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneThresholds {
    /// Pixels at or below this are dark. `None` when the low cutoff is 0.
    pub dark: Option<f32>,
    /// Pixels at or above this are bright. `None` when the high cutoff is 0.
    pub bright: Option<f32>,
}

/// Mean of the colour channels; alpha is ignored.
#[inline]
pub fn luminance(pixel: &[u8; 4]) -> f32 {
    (pixel[0] as f32 + pixel[1] as f32 + pixel[2] as f32) / 3.0
}

/// Percentile with linear interpolation between the closest ranks.
///
/// `sorted` must be ascending and non-empty; `percent` is clamped to
/// `[0, 100]`.
pub fn percentile(sorted: &[f32], percent: f32) -> f32 {
    debug_assert!(!sorted.is_empty());
    let last = sorted.len() - 1;
    let rank = percent.clamp(0.0, 100.0) as f64 / 100.0 * last as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = (rank - lower as f64) as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Compute both thresholds over every pixel of `image`.
pub fn thresholds(image: &RgbaImage, params: &ToneParams) -> ToneThresholds {
    let params = params.clamped();
    let mut values: Vec<f32> = image.pixels().map(|p| luminance(&p.0)).collect();
    if values.is_empty() {
        return ToneThresholds {
            dark: None,
            bright: None,
        };
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));

    let dark = (params.low_cutoff_percent > 0.0)
        .then(|| percentile(&values, params.low_cutoff_percent));
    let bright = (params.high_cutoff_percent > 0.0)
        .then(|| percentile(&values, 100.0 - params.high_cutoff_percent));
    ToneThresholds { dark, bright }
}

/// Apply the dual-threshold remap and return the new image. Alpha is
/// preserved.
pub fn remap_tones(image: &RgbaImage, params: &ToneParams) -> RgbaImage {
    let params = params.clamped();
    let mut out = image.clone();
    let ToneThresholds { dark, bright } = thresholds(image, &params);

    let darken = params.darken_factor / 100.0;
    let brighten = params.brighten_factor / 100.0;
    let mut darkened = 0usize;
    let mut brightened = 0usize;

    for pixel in out.pixels_mut() {
        let lum = luminance(&pixel.0);
        if dark.is_some_and(|t| lum <= t) {
            if darken > 0.0 {
                for c in pixel.0.iter_mut().take(3) {
                    let v = *c as f32;
                    *c = (v - v * darken).round().clamp(0.0, 255.0) as u8;
                }
            }
            darkened += 1;
        } else if bright.is_some_and(|t| lum >= t) {
            if brighten > 0.0 {
                for c in pixel.0.iter_mut().take(3) {
                    let v = *c as f32;
                    *c = (v + (255.0 - v) * brighten).round().clamp(0.0, 255.0) as u8;
                }
            }
            brightened += 1;
        }
    }

    debug!(?dark, ?bright, darkened, brightened, "tone remap");
    out
}

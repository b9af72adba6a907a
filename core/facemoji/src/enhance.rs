//! Fixed colour enhancement battery.
//!
//! Steps run in a fixed order and each is skipped when its parameter is
//! at the identity value: brightness, exposure, contrast, saturation,
//! vibrance, temperature, hue, lightness. Alpha is never touched.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::clamp_field;
use crate::error::{FacemojiError, Stage};

/// Process-wide enhancement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceParams {
    /// Brightness multiplier (1.0 = no change).
    pub brightness: f32,
    /// Second, independent brightness multiplier.
    pub exposure: f32,
    /// Contrast around the image's mean gray (1.0 = no change).
    pub contrast: f32,
    /// Saturation multiplier (1.0 = no change).
    pub saturation: f32,
    /// Vibrance in percent (0 = no change).
    pub vibrance: f32,
    /// Warm (+) / cool (-) shift in 8-bit levels (0 = no change).
    pub temperature: f32,
    /// Hue rotation in degrees (0 = no change).
    pub hue: f32,
    /// Final brightness multiplier (1.0 = no change).
    pub lightness: f32,
}

impl Default for EnhanceParams {
    fn default() -> Self {
        Self {
            brightness: 1.1,
            exposure: 1.0,
            contrast: 1.2,
            saturation: 1.1,
            vibrance: 10.0,
            temperature: 5.0,
            hue: 0.0,
            lightness: 1.1,
        }
    }
}

impl EnhanceParams {
    /// Parameters that leave every pixel unchanged.
    pub fn identity() -> Self {
        Self {
            brightness: 1.0,
            exposure: 1.0,
            contrast: 1.0,
            saturation: 1.0,
            vibrance: 0.0,
            temperature: 0.0,
            hue: 0.0,
            lightness: 1.0,
        }
    }

    pub(crate) fn sanitize(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        clamp_field(&mut self.brightness, 0.0, 4.0, "enhance.brightness", &mut warnings);
        clamp_field(&mut self.exposure, 0.0, 4.0, "enhance.exposure", &mut warnings);
        clamp_field(&mut self.contrast, 0.0, 4.0, "enhance.contrast", &mut warnings);
        clamp_field(&mut self.saturation, 0.0, 4.0, "enhance.saturation", &mut warnings);
        clamp_field(&mut self.vibrance, -100.0, 100.0, "enhance.vibrance", &mut warnings);
        clamp_field(&mut self.temperature, -100.0, 100.0, "enhance.temperature", &mut warnings);
        clamp_field(&mut self.hue, -360.0, 360.0, "enhance.hue", &mut warnings);
        clamp_field(&mut self.lightness, 0.0, 4.0, "enhance.lightness", &mut warnings);
        warnings
    }

    fn validate(&self) -> Result<(), FacemojiError> {
        let fields = [
            ("brightness", self.brightness),
            ("exposure", self.exposure),
            ("contrast", self.contrast),
            ("saturation", self.saturation),
            ("vibrance", self.vibrance),
            ("temperature", self.temperature),
            ("hue", self.hue),
            ("lightness", self.lightness),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(FacemojiError::processing(
                    Stage::Enhance,
                    format!("{name} is not finite"),
                ));
            }
        }
        Ok(())
    }
}

/// Run the whole battery.
pub fn apply_enhancements(
    image: &RgbaImage,
    params: &EnhanceParams,
) -> Result<RgbaImage, FacemojiError> {
    params.validate()?;
    let mut out = image.clone();

    if params.brightness != 1.0 {
        scale_rgb(&mut out, params.brightness);
    }
    if params.exposure != 1.0 {
        scale_rgb(&mut out, params.exposure);
    }
    if params.contrast != 1.0 {
        adjust_contrast(&mut out, params.contrast);
    }
    if params.saturation != 1.0 {
        adjust_saturation(&mut out, params.saturation);
    }
    if params.vibrance != 0.0 {
        adjust_vibrance(&mut out, params.vibrance);
    }
    if params.temperature != 0.0 {
        shift_temperature(&mut out, params.temperature);
    }
    if params.hue != 0.0 {
        rotate_hue(&mut out, params.hue);
    }
    if params.lightness != 1.0 {
        scale_rgb(&mut out, params.lightness);
    }

    debug!(?params, "enhancements applied");
    Ok(out)
}

#[inline]
fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// ITU-R 601-2 luma, matching the grayscale used for contrast and style.
#[inline]
pub(crate) fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Multiply R, G and B by `factor`.
pub fn scale_rgb(image: &mut RgbaImage, factor: f32) {
    for pixel in image.pixels_mut() {
        for c in pixel.0.iter_mut().take(3) {
            *c = to_u8(*c as f32 * factor);
        }
    }
}

/// Blend each channel with the image's mean gray.
pub fn adjust_contrast(image: &mut RgbaImage, factor: f32) {
    let count = image.width() as usize * image.height() as usize;
    if count == 0 {
        return;
    }
    let total: f64 = image
        .pixels()
        .map(|p| luma(p.0[0], p.0[1], p.0[2]).round() as f64)
        .sum();
    let mean = (total / count as f64).round() as f32;
    for pixel in image.pixels_mut() {
        for c in pixel.0.iter_mut().take(3) {
            *c = to_u8(mean + (*c as f32 - mean) * factor);
        }
    }
}

/// Blend each pixel with its own gray value.
pub fn adjust_saturation(image: &mut RgbaImage, factor: f32) {
    for pixel in image.pixels_mut() {
        let [r, g, b, _] = pixel.0;
        let gray = luma(r, g, b);
        for c in pixel.0.iter_mut().take(3) {
            *c = to_u8(gray + (*c as f32 - gray) * factor);
        }
    }
}

/// Saturation boost that favours muted pixels: below 0.5 saturation the
/// boost is `v / 100`, at or above it is halved.
pub fn adjust_vibrance(image: &mut RgbaImage, vibrance: f32) {
    for pixel in image.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let (h, s, v) = rgb_to_hsv(r, g, b);
        let boost = if s < 0.5 {
            1.0 + vibrance / 100.0
        } else {
            1.0 + vibrance / 200.0
        };
        let (r, g, b) = hsv_to_rgb(h, (s * boost).clamp(0.0, 1.0), v);
        pixel.0 = [r, g, b, a];
    }
}

/// Warm shift: `+t` red, `+0.3t` green, `-0.5t` blue.
pub fn shift_temperature(image: &mut RgbaImage, temperature: f32) {
    let deltas = [temperature, temperature * 0.3, -temperature * 0.5];
    for pixel in image.pixels_mut() {
        for (c, delta) in pixel.0.iter_mut().zip(deltas) {
            *c = to_u8(*c as f32 + delta);
        }
    }
}

/// Rotate hue by `degrees`, wrapping around the colour circle.
pub fn rotate_hue(image: &mut RgbaImage, degrees: f32) {
    let shift = degrees / 360.0;
    for pixel in image.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let (h, s, v) = rgb_to_hsv(r, g, b);
        let h = (h + shift).rem_euclid(1.0);
        let (r, g, b) = hsv_to_rgb(h, s, v);
        pixel.0 = [r, g, b, a];
    }
}

/// RGB to HSV with every component in `[0, 1]`.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta / max } else { 0.0 };
    if delta == 0.0 {
        return (0.0, s, v);
    }
    let h = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    (h / 6.0, s, v)
}

/// Inverse of [`rgb_to_hsv`].
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let h6 = h.rem_euclid(1.0) * 6.0;
    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match sector as u8 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    (to_u8(r * 255.0), to_u8(g * 255.0), to_u8(b * 255.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn swatch() -> RgbaImage {
        RgbaImage::from_fn(16, 16, |x, y| {
            Rgba([(x * 16) as u8, (y * 16) as u8, ((x + y) * 8) as u8, 200])
        })
    }

    #[test]
    fn identity_params_are_a_no_op() {
        let image = swatch();
        let out = apply_enhancements(&image, &EnhanceParams::identity()).unwrap();
        assert_eq!(out, image);
    }

    #[test]
    fn defaults_preserve_alpha_and_size() {
        let image = swatch();
        let out = apply_enhancements(&image, &EnhanceParams::default()).unwrap();
        assert_eq!(out.dimensions(), image.dimensions());
        assert!(out.pixels().all(|p| p.0[3] == 200));
    }

    #[test]
    fn non_finite_parameter_is_a_processing_failure() {
        let params = EnhanceParams {
            contrast: f32::INFINITY,
            ..EnhanceParams::identity()
        };
        let err = apply_enhancements(&swatch(), &params).unwrap_err();
        assert!(matches!(
            err,
            FacemojiError::ProcessingFailure {
                stage: Stage::Enhance,
                ..
            }
        ));
    }

    #[test]
    fn brightness_scales_and_clamps() {
        let mut image = RgbaImage::from_pixel(1, 1, Rgba([100, 200, 0, 255]));
        scale_rgb(&mut image, 1.5);
        assert_eq!(image.get_pixel(0, 0).0, [150, 255, 0, 255]);
    }

    #[test]
    fn contrast_pushes_away_from_mean() {
        let mut image = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([100, 100, 100, 255])
            } else {
                Rgba([200, 200, 200, 255])
            }
        });
        adjust_contrast(&mut image, 2.0);
        assert_eq!(image.get_pixel(0, 0).0[0], 50);
        assert_eq!(image.get_pixel(1, 0).0[0], 250);
    }

    #[test]
    fn zero_saturation_gives_gray() {
        let mut image = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255]));
        adjust_saturation(&mut image, 0.0);
        let [r, g, b, _] = image.get_pixel(0, 0).0;
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn vibrance_boosts_muted_pixels_more() {
        // s = 0.25 (muted) and s = 0.75 (saturated).
        let mut image = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([200, 150, 150, 255])
            } else {
                Rgba([200, 50, 50, 255])
            }
        });
        adjust_vibrance(&mut image, 40.0);
        let saturation = |x: u32| {
            let [r, g, b, _] = image.get_pixel(x, 0).0;
            rgb_to_hsv(r, g, b).1
        };
        let (muted, vivid) = (saturation(0), saturation(1));
        assert!((muted - 0.35).abs() < 0.01, "muted saturation {muted}");
        assert!((vivid - 0.9).abs() < 0.01, "vivid saturation {vivid}");
    }

    #[test]
    fn temperature_warms_red_and_cools_blue() {
        let mut image = RgbaImage::from_pixel(1, 1, Rgba([100, 100, 100, 255]));
        shift_temperature(&mut image, 10.0);
        assert_eq!(image.get_pixel(0, 0).0, [110, 103, 95, 255]);
    }

    #[test]
    fn hue_rotation_wraps_around() {
        let mut image = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255]));
        rotate_hue(&mut image, 120.0);
        assert_eq!(image.get_pixel(0, 0).0, [0, 255, 0, 255]);
        rotate_hue(&mut image, 240.0);
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0, 255]);
        rotate_hue(&mut image, -120.0);
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 255, 255]);
    }

    #[test]
    fn hsv_round_trip_on_primaries() {
        for (r, g, b) in [(255, 0, 0), (0, 255, 0), (0, 0, 255), (128, 128, 128), (12, 200, 90)] {
            let (h, s, v) = rgb_to_hsv(r, g, b);
            assert_eq!(hsv_to_rgb(h, s, v), (r, g, b));
        }
    }
}

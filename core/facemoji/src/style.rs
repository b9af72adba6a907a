use image::{GrayImage, Luma, RgbaImage};

use crate::enhance::luma;

/// Convert to the grayscale emoji style.
///
/// The colour channels collapse to luma, contrast is boosted by `contrast`
/// around the mean gray, and the result is widened back to three equal
/// channels. The alpha channel is copied through unchanged.
pub fn stylize(image: &RgbaImage, contrast: f32) -> RgbaImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b, _] = pixel.0;
        gray.put_pixel(x, y, Luma([luma(r, g, b).round().clamp(0.0, 255.0) as u8]));
    }

    if contrast != 1.0 && width > 0 && height > 0 {
        let total: u64 = gray.iter().map(|&v| v as u64).sum();
        let mean = (total as f64 / gray.len() as f64).round() as f32;
        for value in gray.iter_mut() {
            *value = (mean + (*value as f32 - mean) * contrast)
                .round()
                .clamp(0.0, 255.0) as u8;
        }
    }

    let mut out = RgbaImage::new(width, height);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let v = gray.get_pixel(x, y).0[0];
        let alpha = image.get_pixel(x, y).0[3];
        *pixel = image::Rgba([v, v, v, alpha]);
    }
    out
}

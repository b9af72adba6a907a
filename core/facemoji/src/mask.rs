use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// What happens to pixels that fall outside the face ellipse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskPolicy {
    /// Set alpha to 0 and leave the colour channels as they were.
    #[default]
    Transparent,
    /// Replace the pixel with a solid colour.
    Fill([u8; 4]),
}

/// Axis-aligned ellipse in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    /// Centre x.
    pub cx: f64,
    /// Centre y.
    pub cy: f64,
    /// Horizontal half-axis.
    pub rx: f64,
    /// Vertical half-axis.
    pub ry: f64,
}

impl Ellipse {
    /// Whether the centre of pixel `(x, y)` lies inside the ellipse.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        if self.rx <= 0.0 || self.ry <= 0.0 {
            return false;
        }
        let dx = (x as f64 + 0.5 - self.cx) / self.rx;
        let dy = (y as f64 + 0.5 - self.cy) / self.ry;
        dx * dx + dy * dy <= 1.0
    }

    /// Ellipse centred in an image of the given size.
    pub fn centered_in(width: u32, height: u32, rx: f64, ry: f64) -> Self {
        Self {
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
            rx,
            ry,
        }
    }
}

/// Apply `policy` to every pixel of `image` outside `ellipse`.
///
/// Pixels inside are untouched, so applying the same mask twice is a no-op.
pub fn apply_ellipse_mask(image: &mut RgbaImage, ellipse: &Ellipse, policy: MaskPolicy) {
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if ellipse.contains(x, y) {
            continue;
        }
        match policy {
            MaskPolicy::Transparent => pixel.0[3] = 0,
            MaskPolicy::Fill(color) => *pixel = Rgba(color),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opaque(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]))
    }

    #[test]
    fn centre_is_inside_corner_is_outside() {
        let ellipse = Ellipse::centered_in(100, 80, 40.0, 30.0);
        assert!(ellipse.contains(50, 40));
        assert!(!ellipse.contains(0, 0));
        assert!(!ellipse.contains(99, 79));
    }

    #[test]
    fn degenerate_ellipse_contains_nothing() {
        let ellipse = Ellipse::centered_in(10, 10, 0.0, 5.0);
        assert!(!ellipse.contains(5, 5));
    }

    #[test]
    fn transparent_policy_keeps_colour() {
        let mut image = opaque(20, 20);
        apply_ellipse_mask(&mut image, &Ellipse::centered_in(20, 20, 8.0, 8.0), MaskPolicy::Transparent);
        assert_eq!(image.get_pixel(0, 0), &Rgba([10, 20, 30, 0]));
        assert_eq!(image.get_pixel(10, 10), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn fill_policy_replaces_outside_pixels() {
        let mut image = opaque(20, 20);
        let fill = MaskPolicy::Fill([255, 255, 255, 255]);
        apply_ellipse_mask(&mut image, &Ellipse::centered_in(20, 20, 8.0, 8.0), fill);
        assert_eq!(image.get_pixel(0, 19), &Rgba([255, 255, 255, 255]));
        assert_eq!(image.get_pixel(10, 10), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn masking_is_idempotent() {
        let ellipse = Ellipse::centered_in(31, 17, 12.0, 6.0);
        let mut once = opaque(31, 17);
        apply_ellipse_mask(&mut once, &ellipse, MaskPolicy::Transparent);
        let mut twice = once.clone();
        apply_ellipse_mask(&mut twice, &ellipse, MaskPolicy::Transparent);
        assert_eq!(once, twice);
    }
}

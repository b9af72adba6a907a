use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::debug;

use crate::config::CompositeConfig;
use crate::error::{FacemojiError, Stage};
use crate::label::{draw_label, label_height, label_width};

/// Gap between the fallback face and its frame.
const FRAME_GAP: u32 = 5;

/// Places a styled face onto a template with the "over" operator.
#[derive(Debug, Clone)]
pub struct Compositor {
    config: CompositeConfig,
}

impl Compositor {
    /// Create a compositor with the given placement settings.
    pub fn new(config: &CompositeConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Size the face's longest side is resized to on a `width`×`height`
    /// template.
    pub fn target_face_size(&self, width: u32, height: u32) -> u32 {
        let short_side = width.min(height) as f32;
        let ceiling = (short_side * self.config.max_face_ratio).floor() as u32;
        let wanted = (short_side * self.config.face_size_ratio).round() as u32;
        wanted.max(self.config.min_face_size).min(ceiling).max(1)
    }

    /// Composite `face` centred on `template`.
    ///
    /// The output always has the template's dimensions. Template pixels
    /// outside the face's footprint are copied through untouched.
    pub fn composite(&self, template: &RgbaImage, face: &RgbaImage) -> Result<RgbaImage, FacemojiError> {
        if template.width() == 0 || template.height() == 0 {
            return Err(FacemojiError::processing(Stage::Composite, "empty template"));
        }
        if face.width() == 0 || face.height() == 0 {
            return Err(FacemojiError::processing(Stage::Composite, "empty face image"));
        }

        let target = self.target_face_size(template.width(), template.height());
        let resized = fit_longest(face, target);

        let x = template.width().saturating_sub(resized.width()) / 2;
        let y = template.height().saturating_sub(resized.height()) / 2;

        let mut out = template.clone();
        blend_over(&mut out, &resized, x, y);

        debug!(
            template_w = template.width(),
            template_h = template.height(),
            face_w = resized.width(),
            face_h = resized.height(),
            x,
            y,
            "face composited"
        );
        Ok(out)
    }

    /// Deterministic canvas used when no template is available for
    /// `style`: tinted background, the face centred inside a frame, and a
    /// caption naming the missing style.
    pub fn fallback(&self, face: &RgbaImage, style: &str) -> RgbaImage {
        let (width, height) = self.config.fallback_size;
        let [r, g, b] = fallback_background(style);
        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]));

        let (face_x, face_y, face_w, face_h) = if face.width() > 0 && face.height() > 0 {
            let resized = fit_longest(face, self.config.fallback_face_size);
            let x = width.saturating_sub(resized.width()) / 2;
            let y = height.saturating_sub(resized.height()) / 2;
            blend_over(&mut canvas, &resized, x, y);
            (x, y, resized.width(), resized.height())
        } else {
            let side = self.config.fallback_face_size;
            (width.saturating_sub(side) / 2, height.saturating_sub(side) / 2, side, side)
        };

        let [br, bg, bb] = self.config.fallback_border_color;
        let left = face_x as i64 - FRAME_GAP as i64;
        let top = face_y as i64 - FRAME_GAP as i64;
        let right = (face_x + face_w + FRAME_GAP) as i64;
        let bottom = (face_y + face_h + FRAME_GAP) as i64;
        draw_frame(
            &mut canvas,
            (left, top, right, bottom),
            self.config.fallback_border_width,
            Rgba([br, bg, bb, 255]),
        );

        let text = format!("template missing: {style}");
        let scale = if label_width(&text, 2) + 8 <= width { 2 } else { 1 };
        let text_w = label_width(&text, scale) as i64;
        let text_h = label_height(scale) as i64;
        let below = (height as i64 - bottom - 1).max(0);
        let text_x = (width as i64 - text_w) / 2;
        let text_y = bottom + 1 + (below - text_h).max(0) / 2;
        let [lr, lg, lb] = self.config.fallback_label_color;
        draw_label(&mut canvas, &text, text_x, text_y, scale, Rgba([lr, lg, lb, 255]));

        debug!(style, width, height, "fallback canvas generated");
        canvas
    }
}

/// Background tint of the fallback canvas for `style`.
pub fn fallback_background(style: &str) -> [u8; 3] {
    match style {
        "panda" => [200, 200, 200],
        "mushroom" => [255, 200, 200],
        "dragon" => [200, 255, 200],
        _ => [200, 200, 255],
    }
}

/// Resize so the longest side equals `target`, keeping the aspect ratio.
fn fit_longest(image: &RgbaImage, target: u32) -> RgbaImage {
    let (src_w, src_h) = image.dimensions();
    let (new_w, new_h) = if src_w >= src_h {
        let h = ((src_h as f64 / src_w as f64) * target as f64).round() as u32;
        (target, h.max(1))
    } else {
        let w = ((src_w as f64 / src_h as f64) * target as f64).round() as u32;
        (w.max(1), target)
    };
    if (new_w, new_h) == (src_w, src_h) {
        return image.clone();
    }
    imageops::resize(image, new_w, new_h, FilterType::Lanczos3)
}

/// Blend `face` onto `base` at `(x, y)` with the "over" operator. Face
/// pixels that fall outside `base` are clipped.
fn blend_over(base: &mut RgbaImage, face: &RgbaImage, x: u32, y: u32) {
    let cols = face.width().min(base.width().saturating_sub(x));
    let rows = face.height().min(base.height().saturating_sub(y));
    for fy in 0..rows {
        for fx in 0..cols {
            let [fr, fg, fb, fa] = face.get_pixel(fx, fy).0;
            let dst = base.get_pixel_mut(x + fx, y + fy);
            let [tr, tg, tb, ta] = dst.0;
            let mix = |f: u8, t: u8| -> u8 {
                let (f, t, a) = (f as u32, t as u32, fa as u32);
                ((f * a + t * (255 - a) + 127) / 255) as u8
            };
            *dst = Rgba([mix(fr, tr), mix(fg, tg), mix(fb, tb), fa.max(ta)]);
        }
    }
}

/// Outline the inclusive rectangle `(left, top, right, bottom)` with a
/// stroke `width` pixels wide, drawn inward as nested one-pixel outlines.
/// Clipped to the canvas.
fn draw_frame(canvas: &mut RgbaImage, rect: (i64, i64, i64, i64), width: u32, color: Rgba<u8>) {
    let (left, top, right, bottom) = rect;
    for inset in 0..width as i64 {
        let w = right - left + 1 - 2 * inset;
        let h = bottom - top + 1 - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let outline = Rect::at((left + inset) as i32, (top + inset) as i32).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, outline, color);
    }
}

//! Face localisation, confidence scoring and elliptical cropping.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, RgbaImage};
use imageproc::contrast::equalize_histogram_mut;
use tracing::{debug, info, warn};

use crate::config::DetectionConfig;
use crate::error::FacemojiError;
use crate::face_locator::{FaceBounds, FaceLocator};
use crate::mask::{apply_ellipse_mask, Ellipse, MaskPolicy};

/// Smallest half-axis (pixels) border cleanup will shrink an ellipse to.
const BORDER_AXIS_FLOOR: f64 = 10.0;

/// Ellipse that defined the face crop, recorded at detection time.
///
/// `center` and `axes` are in source-image pixels. After the crop has been
/// resized only the ellipse's proportions carry over: use
/// [`EllipseDescriptor::scaled_axes`] and re-centre on the current image.
#[derive(Debug, Clone, PartialEq)]
pub struct EllipseDescriptor {
    /// Ellipse centre in the source image.
    pub center: (f64, f64),
    /// Half-axes `(rx, ry)` in source pixels.
    pub axes: (f64, f64),
    /// Size of the image detection ran on.
    pub source_image_size: (u32, u32),
    /// Resized crop dimension divided by the original crop dimension.
    pub scale_factor: f64,
    /// Face bounding box in source coordinates.
    pub face_rect: FaceBounds,
}

impl EllipseDescriptor {
    /// Half-axes in the resized crop's coordinate frame.
    pub fn scaled_axes(&self) -> (f64, f64) {
        (self.axes.0 * self.scale_factor, self.axes.1 * self.scale_factor)
    }
}

/// Where a sub-feature rectangle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSource {
    /// Reported by a sub-feature locator.
    Detected,
    /// Placed geometrically because no locator was configured.
    Estimated,
}

/// A nose or mouth rectangle in source coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRegion {
    /// Rectangle in source-image pixels.
    pub bounds: FaceBounds,
    /// Whether a locator found it or it was estimated.
    pub source: FeatureSource,
}

/// Approximate eye, nose and mouth locations inside the chosen face.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacialFeatures {
    /// Eye boxes; empty when no eye locator is configured.
    pub eyes: Vec<FaceBounds>,
    /// Nose region, detected or estimated.
    pub nose: Option<FeatureRegion>,
    /// Mouth region, detected or estimated.
    pub mouth: Option<FeatureRegion>,
}

impl FacialFeatures {
    /// Number of feature groups found by an actual locator. Estimated
    /// rectangles do not count.
    pub fn detected_count(&self) -> usize {
        let detected = |region: &Option<FeatureRegion>| {
            matches!(region, Some(r) if r.source == FeatureSource::Detected)
        };
        usize::from(!self.eyes.is_empty())
            + usize::from(detected(&self.nose))
            + usize::from(detected(&self.mouth))
    }
}

/// Output of [`FeatureDetector::detect`].
///
/// A missing `face_image` together with a confidence of 0 means no face was
/// found; callers must stop there.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// Masked, resized face crop.
    pub face_image: Option<RgbaImage>,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f32,
    /// Ellipse used for the crop.
    pub ellipse: Option<EllipseDescriptor>,
    /// Sub-features inside the face box.
    pub features: FacialFeatures,
}

/// A successful detection, unwrapped from [`DetectionResult`].
#[derive(Debug, Clone)]
pub struct DetectedFace {
    /// Masked, resized face crop.
    pub image: RgbaImage,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f32,
    /// Ellipse used for the crop.
    pub ellipse: EllipseDescriptor,
    /// Sub-features inside the face box.
    pub features: FacialFeatures,
}

impl DetectionResult {
    fn not_found() -> Self {
        Self {
            face_image: None,
            confidence: 0.0,
            ellipse: None,
            features: FacialFeatures::default(),
        }
    }

    /// Whether a face was found.
    pub fn is_found(&self) -> bool {
        self.face_image.is_some()
    }

    /// Convert into a [`DetectedFace`], or [`FacemojiError::NoFaceDetected`].
    pub fn into_face(self) -> Result<DetectedFace, FacemojiError> {
        match (self.face_image, self.ellipse) {
            (Some(image), Some(ellipse)) => Ok(DetectedFace {
                image,
                confidence: self.confidence,
                ellipse,
                features: self.features,
            }),
            _ => Err(FacemojiError::NoFaceDetected),
        }
    }
}

/// Locates the largest face in a photo and cuts it out as an elliptical,
/// fixed-size RGBA crop.
///
/// The face locator is required; eye, nose and mouth locators are optional
/// and only influence the confidence score and the reported features.
pub struct FeatureDetector {
    config: DetectionConfig,
    face: Box<dyn FaceLocator>,
    eyes: Option<Box<dyn FaceLocator>>,
    nose: Option<Box<dyn FaceLocator>>,
    mouth: Option<Box<dyn FaceLocator>>,
}

impl FeatureDetector {
    /// Create a detector around a face locator.
    pub fn new(config: &DetectionConfig, face: Box<dyn FaceLocator>) -> Self {
        Self {
            config: config.clone(),
            face,
            eyes: None,
            nose: None,
            mouth: None,
        }
    }

    /// Add an eye locator, run inside the detected face box.
    pub fn eye_locator(mut self, locator: Box<dyn FaceLocator>) -> Self {
        self.eyes = Some(locator);
        self
    }

    /// Add a nose locator, run inside the detected face box.
    pub fn nose_locator(mut self, locator: Box<dyn FaceLocator>) -> Self {
        self.nose = Some(locator);
        self
    }

    /// Add a mouth locator, run inside the detected face box.
    pub fn mouth_locator(mut self, locator: Box<dyn FaceLocator>) -> Self {
        self.mouth = Some(locator);
        self
    }

    /// Mask policy used for cropping and border cleanup.
    pub fn mask_policy(&self) -> MaskPolicy {
        self.config.mask_policy
    }

    /// Find the largest face and return its elliptical crop.
    pub fn detect(&self, image: &DynamicImage) -> DetectionResult {
        let (img_w, img_h) = image.dimensions();
        if img_w == 0 || img_h == 0 {
            return DetectionResult::not_found();
        }

        let mut gray = image::imageops::grayscale(image);
        if self.config.equalize_histogram {
            equalize_histogram_mut(&mut gray);
        }

        let Some(face) = largest_face(self.scan(&gray)) else {
            info!(width = img_w, height = img_h, "no face detected");
            return DetectionResult::not_found();
        };
        let Some(face) = clamp_to_image(&face, img_w, img_h) else {
            warn!(?face, "face box lies outside the image");
            return DetectionResult::not_found();
        };

        let features = self.locate_features(&gray, &face);
        let confidence = score_confidence(
            face.area(),
            img_w as f64 * img_h as f64,
            features.detected_count(),
            &self.config,
        );

        let (cx, cy) = face.center();
        let rx = face.width * self.config.ellipse_width_ratio / 2.0;
        let ry = face.height * self.config.ellipse_height_ratio / 2.0;

        // Crop to the ellipse's bounding rectangle, clamped to the image.
        let x0 = (cx - rx).floor().max(0.0) as u32;
        let y0 = (cy - ry).floor().max(0.0) as u32;
        let x1 = ((cx + rx).ceil() as u32).min(img_w);
        let y1 = ((cy + ry).ceil() as u32).min(img_h);
        if x1 <= x0 || y1 <= y0 {
            warn!(?face, "face ellipse collapsed to an empty crop");
            return DetectionResult::not_found();
        }
        let (crop_w, crop_h) = (x1 - x0, y1 - y0);

        let mut crop = image.crop_imm(x0, y0, crop_w, crop_h).to_rgba8();
        let local = Ellipse {
            cx: cx - x0 as f64,
            cy: cy - y0 as f64,
            rx,
            ry,
        };
        apply_ellipse_mask(&mut crop, &local, self.config.mask_policy);

        let target = self
            .config
            .max_face_dimension
            .max(self.config.min_face_dimension);
        let (resized, scale_factor) = resize_to_longest(&crop, target);

        if confidence < self.config.low_confidence_warning {
            warn!(confidence, "weak face detection");
        }
        info!(
            confidence,
            face_width = face.width,
            face_height = face.height,
            crop_width = resized.width(),
            crop_height = resized.height(),
            features = features.detected_count(),
            "face detected"
        );

        DetectionResult {
            face_image: Some(resized),
            confidence,
            ellipse: Some(EllipseDescriptor {
                center: (cx, cy),
                axes: (rx, ry),
                source_image_size: (img_w, img_h),
                scale_factor,
                face_rect: face,
            }),
            features,
        }
    }

    /// Shrink the face ellipse by `inset` pixels and re-apply the mask.
    /// See [`cleanup_border`].
    pub fn cleanup_border(&self, image: &RgbaImage, ellipse: &EllipseDescriptor, inset: u32) -> RgbaImage {
        cleanup_border(image, ellipse, inset, self.config.mask_policy)
    }

    /// Strict pass first; the relaxed pass only runs when it finds nothing.
    fn scan(&self, gray: &GrayImage) -> Vec<FaceBounds> {
        let (w, h) = gray.dimensions();
        let strict = self.face.locate(gray.as_raw(), w, h, &self.config.strict_pass);
        if !strict.is_empty() {
            debug!(candidates = strict.len(), "strict pass found faces");
            return strict;
        }
        debug!("strict pass found no face, retrying with relaxed parameters");
        let relaxed = self.face.locate(gray.as_raw(), w, h, &self.config.relaxed_pass);
        debug!(candidates = relaxed.len(), "relaxed pass finished");
        relaxed
    }

    fn locate_features(&self, gray: &GrayImage, face: &FaceBounds) -> FacialFeatures {
        let (fx, fy) = (face.x as u32, face.y as u32);
        let (fw, fh) = (face.width as u32, face.height as u32);
        let region = image::imageops::crop_imm(gray, fx, fy, fw, fh).to_image();
        let pass = &self.config.feature_pass;

        let run = |locator: &Box<dyn FaceLocator>| -> Vec<FaceBounds> {
            locator
                .locate(region.as_raw(), region.width(), region.height(), pass)
                .into_iter()
                .map(|b| b.translated(face.x, face.y))
                .collect()
        };

        let eyes = self.eyes.as_ref().map(run).unwrap_or_default();

        let nose = match self.nose.as_ref() {
            Some(locator) => detected_region(run(locator)),
            None => Some(FeatureRegion {
                bounds: estimate_nose(face),
                source: FeatureSource::Estimated,
            }),
        };
        let mouth = match self.mouth.as_ref() {
            Some(locator) => detected_region(run(locator)),
            None => Some(FeatureRegion {
                bounds: estimate_mouth(face),
                source: FeatureSource::Estimated,
            }),
        };

        debug!(
            eyes = eyes.len(),
            nose = ?nose.as_ref().map(|n| n.source),
            mouth = ?mouth.as_ref().map(|m| m.source),
            "facial features located"
        );
        FacialFeatures { eyes, nose, mouth }
    }
}

/// Shrink the recorded face ellipse by `inset` pixels and re-apply the mask
/// to `image`.
///
/// The ellipse is rescaled by the descriptor's `scale_factor`, its half-axes
/// reduced by `2 × inset` (never below 10 px) and re-centred on `image`,
/// since the original detection centre no longer applies after cropping and
/// resizing. `inset == 0` returns the image unchanged.
pub fn cleanup_border(
    image: &RgbaImage,
    ellipse: &EllipseDescriptor,
    inset: u32,
    policy: MaskPolicy,
) -> RgbaImage {
    let mut out = image.clone();
    if inset == 0 {
        return out;
    }
    let (rx, ry) = ellipse.scaled_axes();
    let shrink = 2.0 * inset as f64;
    let rx = (rx - shrink).max(BORDER_AXIS_FLOOR);
    let ry = (ry - shrink).max(BORDER_AXIS_FLOOR);
    let mask = Ellipse::centered_in(out.width(), out.height(), rx, ry);
    debug!(inset, rx, ry, "border cleanup");
    apply_ellipse_mask(&mut out, &mask, policy);
    out
}

/// `min(face_area / image_area × K, cap) + feature_bonus`, clamped to [0, 1].
pub fn score_confidence(
    face_area: f64,
    image_area: f64,
    detected_features: usize,
    config: &DetectionConfig,
) -> f32 {
    if image_area <= 0.0 || face_area <= 0.0 {
        return 0.0;
    }
    let area_term = ((face_area / image_area) as f32 * config.area_weight).min(config.area_cap);
    let bonus = config.feature_bonus[detected_features.min(3)];
    (area_term + bonus).clamp(0.0, 1.0)
}

/// Resize so the longest side equals `target`, preserving aspect ratio.
/// Returns the image and the applied scale factor.
fn resize_to_longest(image: &RgbaImage, target: u32) -> (RgbaImage, f64) {
    let (src_w, src_h) = image.dimensions();
    let longest = src_w.max(src_h);
    let scale = target as f64 / longest as f64;

    let (new_w, new_h) = if src_w >= src_h {
        let h = (src_h as f64 * scale).round() as u32;
        (target, h.max(1))
    } else {
        let w = (src_w as f64 * scale).round() as u32;
        (w.max(1), target)
    };

    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Lanczos3);
    (resized, scale)
}

/// Largest box by area; the first one wins a tie.
fn largest_face(candidates: Vec<FaceBounds>) -> Option<FaceBounds> {
    candidates
        .into_iter()
        .filter(|c| c.area() > 0.0 && c.x.is_finite() && c.y.is_finite())
        .fold(None, |best, candidate| match best {
            Some(b) if b.area() >= candidate.area() => Some(b),
            _ => Some(candidate),
        })
}

/// Intersect `face` with the image and snap it to whole pixels.
fn clamp_to_image(face: &FaceBounds, img_w: u32, img_h: u32) -> Option<FaceBounds> {
    let x0 = face.x.max(0.0).floor();
    let y0 = face.y.max(0.0).floor();
    let x1 = (face.x + face.width).min(img_w as f64).ceil();
    let y1 = (face.y + face.height).min(img_h as f64).ceil();
    if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
        return None;
    }
    Some(FaceBounds {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
        score: face.score,
    })
}

fn detected_region(found: Vec<FaceBounds>) -> Option<FeatureRegion> {
    largest_face(found).map(|bounds| FeatureRegion {
        bounds,
        source: FeatureSource::Detected,
    })
}

/// Nose: a quarter of the face, centred on it.
fn estimate_nose(face: &FaceBounds) -> FaceBounds {
    let (cx, cy) = face.center();
    let (w, h) = (face.width / 4.0, face.height / 4.0);
    FaceBounds::new(cx - w / 2.0, cy - h / 2.0, w, h)
}

/// Mouth: half the face width, centred horizontally in the lower third.
fn estimate_mouth(face: &FaceBounds) -> FaceBounds {
    let (cx, _) = face.center();
    let (w, h) = (face.width / 2.0, face.height / 6.0);
    let third_top = face.y + face.height * 2.0 / 3.0;
    let y = third_top + (face.height / 3.0 - h) / 2.0;
    FaceBounds::new(cx - w / 2.0, y, w, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face_locator::ScanPass;
    use image::Rgba;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct FixedLocator(Vec<FaceBounds>);

    impl FaceLocator for FixedLocator {
        fn locate(&self, _: &[u8], _: u32, _: u32, _: &ScanPass) -> Vec<FaceBounds> {
            self.0.clone()
        }
    }

    /// Finds a face only on the passes it is told to and counts calls.
    struct CountingLocator {
        calls: Arc<AtomicUsize>,
        hit_on_strict: bool,
    }

    impl FaceLocator for CountingLocator {
        fn locate(&self, _: &[u8], _: u32, _: u32, pass: &ScanPass) -> Vec<FaceBounds> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hit_on_strict || pass == &ScanPass::relaxed() {
                vec![FaceBounds::new(50.0, 50.0, 100.0, 100.0)]
            } else {
                vec![]
            }
        }
    }

    fn scan_count(hit_on_strict: bool) -> (bool, usize) {
        let calls = Arc::new(AtomicUsize::new(0));
        let locator = CountingLocator {
            calls: calls.clone(),
            hit_on_strict,
        };
        let detector = FeatureDetector::new(&DetectionConfig::default(), Box::new(locator));
        let result = detector.detect(&photo(300, 300));
        assert!(result.confidence > 0.0);
        (result.is_found(), calls.load(Ordering::SeqCst))
    }

    fn photo(width: u32, height: u32) -> DynamicImage {
        let mut img = RgbaImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255]);
        }
        DynamicImage::ImageRgba8(img)
    }

    fn detector(faces: Vec<FaceBounds>) -> FeatureDetector {
        FeatureDetector::new(&DetectionConfig::default(), Box::new(FixedLocator(faces)))
    }

    #[test]
    fn blank_canvas_yields_no_face() {
        let result = detector(vec![]).detect(&photo(200, 200));
        assert!(!result.is_found());
        assert_eq!(result.confidence, 0.0);
        assert!(result.ellipse.is_none());
        assert!(matches!(result.into_face(), Err(FacemojiError::NoFaceDetected)));
    }

    #[test]
    fn zero_sized_image_yields_no_face() {
        let result = detector(vec![FaceBounds::new(0.0, 0.0, 10.0, 10.0)])
            .detect(&DynamicImage::ImageRgba8(RgbaImage::new(0, 0)));
        assert!(!result.is_found());
    }

    #[test]
    fn largest_face_is_selected() {
        let result = detector(vec![
            FaceBounds::new(10.0, 10.0, 40.0, 40.0),
            FaceBounds::new(100.0, 100.0, 120.0, 80.0),
            FaceBounds::new(0.0, 200.0, 60.0, 60.0),
        ])
        .detect(&photo(400, 400));
        let ellipse = result.ellipse.unwrap();
        assert_eq!(ellipse.face_rect, FaceBounds::new(100.0, 100.0, 120.0, 80.0));
        assert_eq!(ellipse.center, (160.0, 140.0));
    }

    #[test]
    fn tie_keeps_first_candidate() {
        let first = FaceBounds::new(10.0, 10.0, 50.0, 50.0);
        let second = FaceBounds::new(200.0, 200.0, 50.0, 50.0);
        assert_eq!(largest_face(vec![first.clone(), second]), Some(first));
    }

    #[test]
    fn relaxed_pass_is_the_fallback() {
        assert_eq!(scan_count(false), (true, 2));
    }

    #[test]
    fn strict_hit_skips_relaxed_pass() {
        assert_eq!(scan_count(true), (true, 1));
    }

    #[test]
    fn crop_longest_side_matches_max_dimension() {
        for face in [
            FaceBounds::new(100.0, 100.0, 200.0, 200.0),
            FaceBounds::new(20.0, 30.0, 50.0, 90.0),
            FaceBounds::new(0.0, 0.0, 399.0, 120.0),
        ] {
            let result = detector(vec![face]).detect(&photo(400, 400));
            let image = result.face_image.unwrap();
            assert_eq!(image.width().max(image.height()), 256);
        }
    }

    #[test]
    fn crop_outside_ellipse_is_transparent() {
        let result = detector(vec![FaceBounds::new(100.0, 100.0, 200.0, 200.0)])
            .detect(&photo(400, 400));
        let image = result.face_image.unwrap();
        let (w, h) = image.dimensions();
        assert_eq!(image.get_pixel(0, 0).0[3], 0);
        assert_eq!(image.get_pixel(w - 1, h - 1).0[3], 0);
        assert!(image.get_pixel(w / 2, h / 2).0[3] > 250);
    }

    #[test]
    fn scale_factor_maps_ellipse_into_crop() {
        let result = detector(vec![FaceBounds::new(100.0, 100.0, 200.0, 200.0)])
            .detect(&photo(400, 400));
        let ellipse = result.ellipse.unwrap();
        // Axes: 0.45 × 200 = 90, 0.4 × 200 = 80. Crop is 180 × 160 → 256 × 228.
        assert_eq!(ellipse.axes, (90.0, 80.0));
        assert!((ellipse.scale_factor - 256.0 / 180.0).abs() < 1e-9);
        let (rx, _) = ellipse.scaled_axes();
        assert!((rx - 128.0).abs() < 1e-9);
    }

    #[test]
    fn face_box_is_clamped_to_image() {
        let result = detector(vec![FaceBounds::new(-50.0, -50.0, 150.0, 150.0)])
            .detect(&photo(200, 200));
        let ellipse = result.ellipse.unwrap();
        assert_eq!(ellipse.face_rect, FaceBounds::new(0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn confidence_combines_area_and_features() {
        let config = DetectionConfig::default();
        // 10% of the image × 8 = 0.8, capped at 0.6.
        assert!((score_confidence(1000.0, 10_000.0, 0, &config) - 0.6).abs() < 1e-6);
        // 1% × 8 = 0.08, plus 0.25 for two features.
        assert!((score_confidence(100.0, 10_000.0, 2, &config) - 0.33).abs() < 1e-6);
        // Never exceeds 1.
        assert!((score_confidence(10_000.0, 10_000.0, 7, &config) - 0.95).abs() < 1e-6);
        assert_eq!(score_confidence(0.0, 10_000.0, 3, &config), 0.0);
    }

    #[test]
    fn estimated_features_do_not_boost_confidence() {
        let result = detector(vec![FaceBounds::new(0.0, 0.0, 40.0, 40.0)]).detect(&photo(400, 400));
        let features = &result.features;
        assert!(features.eyes.is_empty());
        assert_eq!(features.nose.as_ref().unwrap().source, FeatureSource::Estimated);
        assert_eq!(features.mouth.as_ref().unwrap().source, FeatureSource::Estimated);
        assert_eq!(features.detected_count(), 0);
        // 1% of the image × 8.
        assert!((result.confidence - 0.08).abs() < 1e-6);
    }

    #[test]
    fn detected_features_are_mapped_to_source_coordinates() {
        let detector = detector(vec![FaceBounds::new(100.0, 100.0, 200.0, 200.0)])
            .eye_locator(Box::new(FixedLocator(vec![
                FaceBounds::new(40.0, 50.0, 30.0, 20.0),
                FaceBounds::new(130.0, 50.0, 30.0, 20.0),
            ])))
            .nose_locator(Box::new(FixedLocator(vec![FaceBounds::new(85.0, 80.0, 30.0, 40.0)])))
            .mouth_locator(Box::new(FixedLocator(vec![])));
        let result = detector.detect(&photo(400, 400));
        let features = &result.features;
        assert_eq!(features.eyes[0].x, 140.0);
        assert_eq!(features.eyes[1].y, 150.0);
        let nose = features.nose.as_ref().unwrap();
        assert_eq!(nose.source, FeatureSource::Detected);
        assert_eq!((nose.bounds.x, nose.bounds.y), (185.0, 180.0));
        assert!(features.mouth.is_none());
        assert_eq!(features.detected_count(), 2);
    }

    #[test]
    fn estimated_nose_and_mouth_positions() {
        let face = FaceBounds::new(0.0, 0.0, 120.0, 120.0);
        let nose = estimate_nose(&face);
        assert_eq!(nose.center(), (60.0, 60.0));
        let mouth = estimate_mouth(&face);
        assert_eq!(mouth.center().0, 60.0);
        assert!(mouth.y >= 80.0 && mouth.y + mouth.height <= 120.0);
    }

    #[test]
    fn border_cleanup_with_zero_inset_is_identity() {
        let result = detector(vec![FaceBounds::new(100.0, 100.0, 200.0, 200.0)])
            .detect(&photo(400, 400));
        let face = result.clone().into_face().unwrap();
        let cleaned = cleanup_border(&face.image, &face.ellipse, 0, MaskPolicy::Transparent);
        assert_eq!(cleaned, face.image);
    }

    #[test]
    fn border_cleanup_recentres_on_current_image() {
        let image = RgbaImage::from_pixel(100, 60, Rgba([50, 60, 70, 255]));
        let descriptor = EllipseDescriptor {
            // Far away from the crop; must not matter.
            center: (900.0, 900.0),
            axes: (100.0, 60.0),
            source_image_size: (2000, 2000),
            scale_factor: 0.5,
            face_rect: FaceBounds::new(800.0, 800.0, 200.0, 200.0),
        };
        let cleaned = cleanup_border(&image, &descriptor, 5, MaskPolicy::Transparent);
        // Scaled axes 50 × 30, minus 10 → 40 × 20 around (50, 30).
        assert_eq!(cleaned.get_pixel(50, 30).0[3], 255);
        assert_eq!(cleaned.get_pixel(89, 30).0[3], 255);
        assert_eq!(cleaned.get_pixel(92, 30).0[3], 0);
        assert_eq!(cleaned.get_pixel(50, 5).0[3], 0);
    }

    #[test]
    fn border_cleanup_respects_axis_floor() {
        let image = RgbaImage::from_pixel(40, 40, Rgba([1, 2, 3, 255]));
        let descriptor = EllipseDescriptor {
            center: (20.0, 20.0),
            axes: (20.0, 20.0),
            source_image_size: (40, 40),
            scale_factor: 1.0,
            face_rect: FaceBounds::new(0.0, 0.0, 40.0, 40.0),
        };
        let cleaned = cleanup_border(&image, &descriptor, 50, MaskPolicy::Transparent);
        // Floor of 10 px keeps the centre visible.
        assert_eq!(cleaned.get_pixel(20, 20).0[3], 255);
        assert_eq!(cleaned.get_pixel(20, 8).0[3], 0);
    }

    /// Records the grayscale range each scan receives.
    struct RangeRecorder(Arc<Mutex<Vec<(u8, u8)>>>);

    impl FaceLocator for RangeRecorder {
        fn locate(&self, gray: &[u8], _: u32, _: u32, _: &ScanPass) -> Vec<FaceBounds> {
            let min = gray.iter().copied().min().unwrap_or(0);
            let max = gray.iter().copied().max().unwrap_or(0);
            self.0.lock().unwrap().push((min, max));
            vec![]
        }
    }

    fn scanned_range(equalize: bool) -> (u8, u8) {
        let narrow = DynamicImage::ImageRgba8(RgbaImage::from_fn(16, 16, |x, _| {
            let v = 100 + (x % 4) as u8;
            Rgba([v, v, v, 255])
        }));
        let config = DetectionConfig {
            equalize_histogram: equalize,
            ..DetectionConfig::default()
        };
        let seen = Arc::new(Mutex::new(Vec::new()));
        FeatureDetector::new(&config, Box::new(RangeRecorder(seen.clone()))).detect(&narrow);
        let ranges = seen.lock().unwrap();
        ranges[0]
    }

    #[test]
    fn equalization_widens_the_scanned_range() {
        assert_eq!(scanned_range(false), (100, 103));
        let (lo, hi) = scanned_range(true);
        assert_eq!(hi, 255);
        assert!(hi - lo > 150, "range {lo}..{hi}");
    }
}

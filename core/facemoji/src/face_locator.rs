/// Bounding box of a detected face (or facial feature) within an image.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBounds {
    /// X coordinate of the top-left corner (pixels).
    pub x: f64,
    /// Y coordinate of the top-left corner (pixels).
    pub y: f64,
    /// Width of the bounding box (pixels).
    pub width: f64,
    /// Height of the bounding box (pixels).
    pub height: f64,
    /// Detector-specific score. Not comparable across backends.
    pub score: f64,
}

impl FaceBounds {
    /// Create a box with a zero score.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            score: 0.0,
        }
    }

    /// Area of the box in square pixels.
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Centre point of the box.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Shift the box by `(dx, dy)`. Used to map sub-feature boxes found in
    /// a face crop back into source coordinates.
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self.clone()
        }
    }
}

/// Sliding-window scan parameters for one detection attempt.
///
/// Detection runs a strict pass first and retries with a relaxed pass only
/// when the strict one finds nothing.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScanPass {
    /// Smallest face side (pixels) the scan considers.
    pub min_size: u32,
    /// Classifier score a window needs to be reported.
    pub score_threshold: f64,
    /// Image pyramid downscale per level, in (0, 1). Lower values take
    /// larger scale steps.
    pub pyramid_scale: f32,
    /// Horizontal and vertical window step (pixels).
    pub step: u32,
}

impl Default for ScanPass {
    fn default() -> Self {
        ScanPass::strict()
    }
}

impl ScanPass {
    /// Conservative parameters used on the first attempt.
    pub fn strict() -> Self {
        Self {
            min_size: 40,
            score_threshold: 2.0,
            pyramid_scale: 0.8,
            step: 4,
        }
    }

    /// Permissive parameters for the retry: coarser pyramid, lower score
    /// threshold and a smaller minimum size.
    pub fn relaxed() -> Self {
        Self {
            min_size: 20,
            score_threshold: 0.5,
            pyramid_scale: 0.7,
            step: 2,
        }
    }
}

/// Pluggable cascade-style locator.
///
/// Implement this trait to provide a face detector (SeetaFace, ONNX, dlib,
/// ...) or a sub-feature detector for eyes, nose and mouth, and pass it to
/// [`crate::FeatureDetector`].
pub trait FaceLocator: Send + Sync {
    /// Locate candidate regions in a row-major grayscale buffer of
    /// `width` × `height` bytes.
    fn locate(&self, gray: &[u8], width: u32, height: u32, pass: &ScanPass) -> Vec<FaceBounds>;
}

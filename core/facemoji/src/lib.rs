//! Turn a portrait photo into a stylised face emoji.
//!
//! The pipeline finds the largest face, cuts it out as an ellipse, runs a
//! percentile tone remap and a fixed colour enhancement battery, converts
//! it to high-contrast grayscale and places it on a named style template.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use facemoji::{EmojiPipeline, EmojiRequest, PipelineConfig, RustfaceLocator, TemplateRegistry};
//!
//! let locator = RustfaceLocator::from_path("model/seeta_fd_frontal_v1.0.bin").unwrap();
//! let registry = Arc::new(TemplateRegistry::open("styles").unwrap());
//! let pipeline = EmojiPipeline::new(PipelineConfig::default(), Box::new(locator), registry);
//!
//! let photo = std::fs::read("photo.jpg").unwrap();
//! let emoji = pipeline
//!     .generate(&photo, &EmojiRequest::new("panda").border_cleanup_pixels(3))
//!     .unwrap();
//! std::fs::write("emoji.png", &emoji.png).unwrap();
//! ```
#![warn(missing_docs)]

mod codec;
mod composite;
mod config;
mod detect;
mod enhance;
mod error;
/// Face locator trait and bounding-box types.
pub mod face_locator;
mod label;
mod mask;
mod pipeline;
mod processor;
mod registry;
#[cfg(feature = "rustface")]
/// Built-in SeetaFace-based face locator backend.
pub mod rustface_backend;
mod style;
mod tone;
mod upload;

pub use codec::{decode_image, detect_format, encode_png, SUPPORTED_FORMATS};
pub use composite::{fallback_background, Compositor};
pub use config::{CompositeConfig, DetectionConfig, PipelineConfig, StyleConfig, UploadConfig};
pub use detect::{
    cleanup_border, score_confidence, DetectedFace, DetectionResult, EllipseDescriptor,
    FacialFeatures, FeatureDetector, FeatureRegion, FeatureSource,
};
pub use enhance::{apply_enhancements, EnhanceParams};
/// Error type returned by facemoji operations.
pub use error::{FacemojiError, Stage};
/// Face locator trait and face bounding-box type.
pub use face_locator::{FaceBounds, FaceLocator, ScanPass};
pub use mask::{apply_ellipse_mask, Ellipse, MaskPolicy};
pub use pipeline::EmojiPipeline;
pub use processor::ToneProcessor;
pub use registry::{
    validate_name, StyleTemplate, TemplateInfo, TemplateMetadata, TemplateRegistry,
    TemplateSummary, BUILTIN_STYLES, SIDECAR_FILE,
};
#[cfg(feature = "rustface")]
/// Built-in locator wrapping the SeetaFace frontal cascade.
pub use rustface_backend::RustfaceLocator;
pub use style::stylize;
pub use tone::{luminance, percentile, remap_tones, thresholds, ToneParams, ToneThresholds};
pub use upload::{sweep_older_than, ResultStore, StagedUpload, UploadStore};

/// Default style when a request does not name one.
pub const DEFAULT_STYLE: &str = "panda";

/// Largest accepted border cleanup inset, in pixels.
pub const MAX_BORDER_CLEANUP: u32 = 100;

/// Default border cleanup inset, in pixels.
const DEFAULT_BORDER_CLEANUP: u32 = 3;

/// Per-request settings for [`EmojiPipeline::generate`].
#[derive(Debug, Clone, PartialEq)]
pub struct EmojiRequest {
    /// Template name to composite onto.
    pub style: String,

    /// Tone remap parameters; clamped to `0..=100` when applied.
    pub tone: ToneParams,

    /// How far the face ellipse is pulled in after processing.
    pub border_cleanup_pixels: u32,
}

impl Default for EmojiRequest {
    fn default() -> Self {
        Self::new(DEFAULT_STYLE)
    }
}

impl EmojiRequest {
    /// Request for `style` with default tone and border settings.
    pub fn new(style: impl Into<String>) -> Self {
        Self {
            style: style.into(),
            tone: ToneParams::default(),
            border_cleanup_pixels: DEFAULT_BORDER_CLEANUP,
        }
    }

    /// Set the tone remap parameters. Out-of-range values are clamped.
    pub fn tone(mut self, tone: ToneParams) -> Self {
        self.tone = tone.clamped();
        self
    }

    /// Set the border cleanup inset (default: 3, at most 100).
    pub fn border_cleanup_pixels(mut self, pixels: u32) -> Self {
        self.border_cleanup_pixels = pixels.min(MAX_BORDER_CLEANUP);
        self
    }
}

/// Result of a single [`EmojiPipeline::generate`] call.
#[derive(Debug, Clone)]
pub struct GeneratedEmoji {
    /// The PNG-encoded RGBA image.
    pub png: Vec<u8>,

    /// Width of the output image in pixels.
    pub width: u32,

    /// Height of the output image in pixels.
    pub height: u32,

    /// Face detection confidence in `[0, 1]`.
    pub confidence: f32,

    /// `true` when no template was registered for the style and the
    /// fallback canvas was rendered instead.
    pub used_fallback: bool,

    /// Style that was requested.
    pub style: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let request = EmojiRequest::default();
        assert_eq!(request.style, "panda");
        assert_eq!(request.tone, ToneParams::default());
        assert_eq!(request.border_cleanup_pixels, 3);
    }

    #[test]
    fn border_cleanup_is_capped() {
        let request = EmojiRequest::new("dragon").border_cleanup_pixels(250);
        assert_eq!(request.border_cleanup_pixels, 100);
        let request = EmojiRequest::new("dragon").border_cleanup_pixels(0);
        assert_eq!(request.border_cleanup_pixels, 0);
    }

    #[test]
    fn tone_is_clamped_on_the_request() {
        let request = EmojiRequest::new("mushroom").tone(ToneParams {
            brighten_factor: 120.0,
            darken_factor: -1.0,
            low_cutoff_percent: 30.0,
            high_cutoff_percent: 20.0,
        });
        assert_eq!(request.tone.brighten_factor, 100.0);
        assert_eq!(request.tone.darken_factor, 0.0);
    }
}

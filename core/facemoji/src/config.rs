//! Process-wide pipeline configuration.
//!
//! A [`PipelineConfig`] is built once at startup (defaults or a JSON file)
//! and handed by reference to each component constructor. Nothing in the
//! pipeline reads configuration from global state.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::enhance::EnhanceParams;
use crate::error::FacemojiError;
use crate::face_locator::ScanPass;
use crate::mask::MaskPolicy;

/// Complete configuration for every pipeline component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Face localisation, scoring and cropping.
    pub detection: DetectionConfig,
    /// Colour enhancement battery run after the tone remap.
    pub enhance: EnhanceParams,
    /// Grayscale style conversion.
    pub style: StyleConfig,
    /// Template compositing and the fallback canvas.
    pub composite: CompositeConfig,
    /// Upload validation and housekeeping.
    pub uploads: UploadConfig,
}

/// Face localisation, confidence scoring and cropping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Longest side of the cropped face after resizing (pixels).
    pub max_face_dimension: u32,
    /// Lower bound for `max_face_dimension`.
    pub min_face_dimension: u32,
    /// Equalize the grayscale histogram before scanning.
    pub equalize_histogram: bool,
    /// First detection attempt.
    pub strict_pass: ScanPass,
    /// Retry used only when the strict pass finds nothing.
    pub relaxed_pass: ScanPass,
    /// Parameters for the eye, nose and mouth locators.
    pub feature_pass: ScanPass,
    /// Multiplier K applied to `face_area / image_area`.
    pub area_weight: f32,
    /// Cap on the area term of the confidence score.
    pub area_cap: f32,
    /// Confidence bonus for 0, 1, 2 and 3+ detected sub-features.
    pub feature_bonus: [f32; 4],
    /// Full ellipse width as a fraction of the face box width.
    pub ellipse_width_ratio: f64,
    /// Full ellipse height as a fraction of the face box height.
    pub ellipse_height_ratio: f64,
    /// Detections below this confidence are logged as weak.
    pub low_confidence_warning: f32,
    /// What happens to pixels outside the face ellipse.
    pub mask_policy: MaskPolicy,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_face_dimension: 256,
            min_face_dimension: 100,
            equalize_histogram: true,
            strict_pass: ScanPass::strict(),
            relaxed_pass: ScanPass::relaxed(),
            feature_pass: ScanPass {
                min_size: 8,
                score_threshold: 1.0,
                pyramid_scale: 0.8,
                step: 2,
            },
            area_weight: 8.0,
            area_cap: 0.6,
            feature_bonus: [0.0, 0.15, 0.25, 0.35],
            ellipse_width_ratio: 0.9,
            ellipse_height_ratio: 0.8,
            low_confidence_warning: 0.3,
            mask_policy: MaskPolicy::Transparent,
        }
    }
}

/// Grayscale style conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// Contrast factor applied to the luminance image.
    pub contrast_boost: f32,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            contrast_boost: 1.2,
        }
    }
}

/// Face placement on the template and the no-template fallback canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    /// Face's longest side as a fraction of the template's shorter side.
    pub face_size_ratio: f32,
    /// Smallest face side placed on a template (pixels).
    pub min_face_size: u32,
    /// Largest face side as a fraction of the template's shorter side.
    pub max_face_ratio: f32,
    /// Fallback canvas size (width, height).
    pub fallback_size: (u32, u32),
    /// Longest side of the face on the fallback canvas.
    pub fallback_face_size: u32,
    /// Width of the frame drawn around the fallback face.
    pub fallback_border_width: u32,
    /// Frame colour on the fallback canvas.
    pub fallback_border_color: [u8; 3],
    /// Label colour on the fallback canvas.
    pub fallback_label_color: [u8; 3],
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            face_size_ratio: 0.5,
            min_face_size: 80,
            max_face_ratio: 0.6,
            fallback_size: (512, 512),
            fallback_face_size: 300,
            fallback_border_width: 3,
            fallback_border_color: [100, 100, 100],
            fallback_label_color: [255, 0, 0],
        }
    }
}

/// Upload validation and temp-file housekeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Accepted file extensions (lowercase, without the dot).
    pub allowed_extensions: Vec<String>,
    /// Largest accepted upload.
    pub max_upload_bytes: usize,
    /// Files older than this are removed by a sweep.
    pub stale_after_hours: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: ["jpg", "jpeg", "png", "gif"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_upload_bytes: 5 * 1024 * 1024,
            stale_after_hours: 24,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON configuration file. Missing fields take their defaults;
    /// out-of-range values are clamped, with a warning logged per change.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, FacemojiError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Parse a JSON configuration document, then sanitize it.
    pub fn from_json_str(contents: &str) -> Result<Self, FacemojiError> {
        let config: PipelineConfig = serde_json::from_str(contents)
            .map_err(|e| FacemojiError::InvalidConfig(e.to_string()))?;
        let (config, warnings) = config.sanitize();
        for warning in &warnings {
            tracing::warn!(%warning, "configuration value adjusted");
        }
        Ok(config)
    }

    /// Clamp every value into its valid range.
    ///
    /// Returns the corrected configuration and one message per adjusted field.
    pub fn sanitize(mut self) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();

        let d = &mut self.detection;
        if d.min_face_dimension == 0 {
            warnings.push("detection.min_face_dimension must be > 0, using 100".to_string());
            d.min_face_dimension = 100;
        }
        if d.max_face_dimension < d.min_face_dimension {
            warnings.push(format!(
                "detection.max_face_dimension {} below floor, using {}",
                d.max_face_dimension, d.min_face_dimension
            ));
            d.max_face_dimension = d.min_face_dimension;
        }
        clamp_field(&mut d.area_weight, 0.0, 100.0, "detection.area_weight", &mut warnings);
        clamp_field(&mut d.area_cap, 0.0, 1.0, "detection.area_cap", &mut warnings);
        for bonus in d.feature_bonus.iter_mut() {
            clamp_field(bonus, 0.0, 1.0, "detection.feature_bonus", &mut warnings);
        }
        clamp_field(
            &mut d.ellipse_width_ratio,
            0.05,
            1.0,
            "detection.ellipse_width_ratio",
            &mut warnings,
        );
        clamp_field(
            &mut d.ellipse_height_ratio,
            0.05,
            1.0,
            "detection.ellipse_height_ratio",
            &mut warnings,
        );
        for (name, pass) in [
            ("strict_pass", &mut d.strict_pass),
            ("relaxed_pass", &mut d.relaxed_pass),
            ("feature_pass", &mut d.feature_pass),
        ] {
            if !(pass.pyramid_scale > 0.0 && pass.pyramid_scale < 1.0) {
                warnings.push(format!(
                    "detection.{name}.pyramid_scale {} outside (0, 1), using 0.8",
                    pass.pyramid_scale
                ));
                pass.pyramid_scale = 0.8;
            }
            if pass.step == 0 {
                warnings.push(format!("detection.{name}.step must be > 0, using 1"));
                pass.step = 1;
            }
        }

        warnings.extend(self.enhance.sanitize());

        clamp_field(
            &mut self.style.contrast_boost,
            0.0,
            10.0,
            "style.contrast_boost",
            &mut warnings,
        );

        let c = &mut self.composite;
        clamp_field(&mut c.max_face_ratio, 0.05, 1.0, "composite.max_face_ratio", &mut warnings);
        clamp_field(
            &mut c.face_size_ratio,
            0.05,
            c.max_face_ratio,
            "composite.face_size_ratio",
            &mut warnings,
        );
        if c.fallback_size.0 == 0 || c.fallback_size.1 == 0 {
            warnings.push("composite.fallback_size must be non-zero, using 512x512".to_string());
            c.fallback_size = (512, 512);
        }
        let fallback_limit = c.fallback_size.0.min(c.fallback_size.1);
        if c.fallback_face_size == 0 || c.fallback_face_size > fallback_limit {
            let corrected = (fallback_limit * 3 / 5).max(1);
            warnings.push(format!(
                "composite.fallback_face_size {} invalid for canvas, using {corrected}",
                c.fallback_face_size
            ));
            c.fallback_face_size = corrected;
        }

        let u = &mut self.uploads;
        for ext in u.allowed_extensions.iter_mut() {
            let normalized = ext.trim_start_matches('.').to_ascii_lowercase();
            if normalized != *ext {
                warnings.push(format!("uploads.allowed_extensions entry '{ext}' normalized"));
                *ext = normalized;
            }
        }

        (self, warnings)
    }
}

pub(crate) fn clamp_field<T>(value: &mut T, min: T, max: T, name: &str, warnings: &mut Vec<String>)
where
    T: Copy + PartialOrd + std::fmt::Display,
{
    if (*value).partial_cmp(&min).is_none() {
        warnings.push(format!("{name} is not a number, using {min}"));
        *value = min;
    } else if *value < min || *value > max {
        let clamped = if *value < min { min } else { max };
        warnings.push(format!("{name} {value} outside [{min}, {max}], using {clamped}"));
        *value = clamped;
    }
}

use std::path::Path;

use crate::error::FacemojiError;
use crate::face_locator::{FaceBounds, FaceLocator, ScanPass};

/// Face locator backed by the `rustface` crate (SeetaFace engine).
///
/// The SeetaFace frontal model (`seeta_fd_frontal_v1.0.bin`) is not bundled;
/// load it from disk or from bytes once at startup and share the locator.
pub struct RustfaceLocator {
    model: rustface::Model,
}

impl RustfaceLocator {
    /// Load the SeetaFace model from `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FacemojiError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    /// Load the SeetaFace model from an in-memory buffer.
    pub fn from_bytes(model_data: &[u8]) -> Result<Self, FacemojiError> {
        let model = rustface::read_model(std::io::Cursor::new(model_data)).map_err(|e| {
            FacemojiError::InvalidConfig(format!("failed to load SeetaFace model: {e}"))
        })?;
        Ok(Self { model })
    }
}

impl FaceLocator for RustfaceLocator {
    fn locate(&self, gray: &[u8], width: u32, height: u32, pass: &ScanPass) -> Vec<FaceBounds> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(pass.min_size.max(20));
        detector.set_score_thresh(pass.score_threshold);
        detector.set_pyramid_scale_factor(pass.pyramid_scale);
        detector.set_slide_window_step(pass.step.max(1), pass.step.max(1));

        let faces = detector.detect(&rustface::ImageData::new(gray, width, height));

        faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceBounds {
                    x: bbox.x() as f64,
                    y: bbox.y() as f64,
                    width: bbox.width() as f64,
                    height: bbox.height() as f64,
                    score: face.score(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_file_is_io_error() {
        let result = RustfaceLocator::from_path("/nonexistent/seeta_fd_frontal_v1.0.bin");
        assert!(matches!(result, Err(FacemojiError::Io(_))));
    }
}

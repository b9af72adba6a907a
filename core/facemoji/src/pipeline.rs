use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, info, info_span, warn};

use crate::codec::{decode_image, encode_png};
use crate::composite::Compositor;
use crate::config::PipelineConfig;
use crate::detect::{DetectedFace, FeatureDetector};
use crate::error::FacemojiError;
use crate::face_locator::FaceLocator;
use crate::processor::ToneProcessor;
use crate::registry::TemplateRegistry;
use crate::upload::StagedUpload;
use crate::{EmojiRequest, GeneratedEmoji, MAX_BORDER_CLEANUP};

/// Photo-to-emoji pipeline.
///
/// Built once at startup and shared across requests; every request runs
/// synchronously on the calling thread. The only shared mutable state is
/// the template registry, which guards itself.
pub struct EmojiPipeline {
    config: PipelineConfig,
    detector: FeatureDetector,
    processor: ToneProcessor,
    compositor: Compositor,
    registry: Arc<TemplateRegistry>,
}

impl EmojiPipeline {
    /// Build a pipeline around a face locator.
    pub fn new(config: PipelineConfig, locator: Box<dyn FaceLocator>, registry: Arc<TemplateRegistry>) -> Self {
        let detector = FeatureDetector::new(&config.detection, locator);
        Self::with_detector(config, detector, registry)
    }

    /// Build a pipeline around a fully configured detector, e.g. one with
    /// eye, nose and mouth locators attached.
    pub fn with_detector(config: PipelineConfig, detector: FeatureDetector, registry: Arc<TemplateRegistry>) -> Self {
        Self {
            processor: ToneProcessor::new(&config),
            compositor: Compositor::new(&config.composite),
            detector,
            registry,
            config,
        }
    }

    /// Configuration the pipeline was built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The shared template registry.
    pub fn registry(&self) -> &Arc<TemplateRegistry> {
        &self.registry
    }

    /// Face detector stage.
    pub fn detector(&self) -> &FeatureDetector {
        &self.detector
    }

    /// Run the whole pipeline on encoded image bytes.
    ///
    /// Detection failure is returned immediately as
    /// [`FacemojiError::NoFaceDetected`]. An unknown style is not an error:
    /// the fallback canvas is rendered instead and flagged in the result.
    pub fn generate(&self, input: &[u8], request: &EmojiRequest) -> Result<GeneratedEmoji, FacemojiError> {
        let span = info_span!("generate", style = %request.style, bytes = input.len());
        let _enter = span.enter();

        self.run(input, request).inspect_err(|e| {
            warn!(
                error = %e,
                user_correctable = e.is_user_correctable(),
                tone = ?request.tone,
                border_cleanup_pixels = request.border_cleanup_pixels,
                "emoji generation failed"
            );
        })
    }

    fn run(&self, input: &[u8], request: &EmojiRequest) -> Result<GeneratedEmoji, FacemojiError> {
        let decoded = decode_image(input)?;
        debug!(width = decoded.width(), height = decoded.height(), "input decoded");

        let face = self.detector.detect(&decoded).into_face()?;
        let confidence = face.confidence;
        let (image, used_fallback) = self.render(&face, request)?;
        let png = encode_png(&image)?;

        info!(
            confidence,
            used_fallback,
            width = image.width(),
            height = image.height(),
            png_bytes = png.len(),
            "emoji generated"
        );
        Ok(GeneratedEmoji {
            png,
            width: image.width(),
            height: image.height(),
            confidence,
            used_fallback,
            style: request.style.clone(),
        })
    }

    /// Run the pipeline on a staged upload. The upload is consumed and its
    /// file removed before this returns, on success and on failure.
    pub fn generate_from_upload(&self, upload: StagedUpload, request: &EmojiRequest) -> Result<GeneratedEmoji, FacemojiError> {
        let bytes = upload.read()?;
        drop(upload);
        self.generate(&bytes, request)
    }

    /// Tone-process a detected face, clean its border and place it on the
    /// requested template. Returns the image and whether the fallback
    /// canvas was used.
    pub fn render(&self, face: &DetectedFace, request: &EmojiRequest) -> Result<(RgbaImage, bool), FacemojiError> {
        let styled = self.processor.process(&face.image, &request.tone)?;
        let inset = request.border_cleanup_pixels.min(MAX_BORDER_CLEANUP);
        let cleaned = self.detector.cleanup_border(&styled, &face.ellipse, inset);

        match self.registry.get(&request.style) {
            Some(template) => Ok((self.compositor.composite(&template.image, &cleaned)?, false)),
            None => {
                warn!(style = %request.style, "no template registered, using fallback canvas");
                Ok((self.compositor.fallback(&cleaned, &request.style), true))
            }
        }
    }
}

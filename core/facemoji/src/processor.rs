use image::RgbaImage;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::enhance::{apply_enhancements, EnhanceParams};
use crate::error::{FacemojiError, Stage};
use crate::style::stylize;
use crate::tone::{remap_tones, ToneParams};

/// Tone remap, enhancement battery and grayscale style conversion, in
/// that order.
///
/// Any stage failure aborts the whole call with a single
/// [`FacemojiError::ProcessingFailure`] naming the stage; no partially
/// processed image is ever returned.
#[derive(Debug, Clone)]
pub struct ToneProcessor {
    enhance: EnhanceParams,
    contrast_boost: f32,
}

impl ToneProcessor {
    /// Build a processor from the enhance and style sections of `config`.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            enhance: config.enhance.clone(),
            contrast_boost: config.style.contrast_boost,
        }
    }

    /// Enhancement parameters this processor applies.
    pub fn enhance_params(&self) -> &EnhanceParams {
        &self.enhance
    }

    /// Run remap, enhancement and style conversion on `face`.
    ///
    /// `tone` is clamped before use. Alpha is carried through unchanged.
    pub fn process(&self, face: &RgbaImage, tone: &ToneParams) -> Result<RgbaImage, FacemojiError> {
        if face.width() == 0 || face.height() == 0 {
            return Err(FacemojiError::processing(Stage::ToneRemap, "empty face image"));
        }
        let tone = tone.clamped();

        let remapped = remap_tones(face, &tone);
        let enhanced = apply_enhancements(&remapped, &self.enhance)?;
        if !self.contrast_boost.is_finite() {
            return Err(FacemojiError::processing(
                Stage::Style,
                "contrast boost is not finite",
            ));
        }
        let styled = stylize(&enhanced, self.contrast_boost);

        debug!(
            width = styled.width(),
            height = styled.height(),
            ?tone,
            "face processed"
        );
        Ok(styled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn face() -> RgbaImage {
        RgbaImage::from_fn(40, 40, |x, y| {
            let inside = (x as i32 - 20).pow(2) + (y as i32 - 20).pow(2) < 18 * 18;
            Rgba([(x * 6) as u8, (y * 6) as u8, 150, if inside { 255 } else { 0 }])
        })
    }

    #[test]
    fn output_is_grayscale_with_original_alpha() {
        let processor = ToneProcessor::new(&PipelineConfig::default());
        let input = face();
        let out = processor.process(&input, &ToneParams::default()).unwrap();
        assert_eq!(out.dimensions(), input.dimensions());
        for (src, dst) in input.pixels().zip(out.pixels()) {
            assert_eq!(dst.0[0], dst.0[1]);
            assert_eq!(dst.0[1], dst.0[2]);
            assert_eq!(dst.0[3], src.0[3]);
        }
    }

    #[test]
    fn empty_image_is_a_typed_failure() {
        let processor = ToneProcessor::new(&PipelineConfig::default());
        let err = processor
            .process(&RgbaImage::new(0, 0), &ToneParams::default())
            .unwrap_err();
        assert!(matches!(
            err,
            FacemojiError::ProcessingFailure {
                stage: Stage::ToneRemap,
                ..
            }
        ));
    }

    #[test]
    fn bad_enhance_params_abort_the_call() {
        let mut config = PipelineConfig::default();
        config.enhance.hue = f32::NAN;
        let processor = ToneProcessor::new(&config);
        assert!(processor.process(&face(), &ToneParams::default()).is_err());
    }

    #[test]
    fn out_of_range_tone_params_are_clamped() {
        let processor = ToneProcessor::new(&PipelineConfig::default());
        let wild = ToneParams {
            brighten_factor: 500.0,
            darken_factor: -20.0,
            low_cutoff_percent: 250.0,
            high_cutoff_percent: -1.0,
        };
        let tame = ToneParams {
            brighten_factor: 100.0,
            darken_factor: 0.0,
            low_cutoff_percent: 100.0,
            high_cutoff_percent: 0.0,
        };
        let a = processor.process(&face(), &wild).unwrap();
        let b = processor.process(&face(), &tame).unwrap();
        assert_eq!(a, b);
    }
}

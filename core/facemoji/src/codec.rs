use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, ImageFormat, RgbaImage};

use crate::error::FacemojiError;

/// Input formats the pipeline accepts.
pub const SUPPORTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

/// Detect the input image format from the raw bytes.
pub fn detect_format(input: &[u8]) -> Result<ImageFormat, FacemojiError> {
    let format = image::guess_format(input).map_err(|_| FacemojiError::UnsupportedFormat)?;
    if SUPPORTED_FORMATS.contains(&format) {
        Ok(format)
    } else {
        Err(FacemojiError::UnsupportedFormat)
    }
}

/// Decode input bytes into a `DynamicImage`.
///
/// Only the formats in [`SUPPORTED_FORMATS`] are accepted; anything else is
/// [`FacemojiError::UnsupportedFormat`] before any decoding is attempted.
pub fn decode_image(input: &[u8]) -> Result<DynamicImage, FacemojiError> {
    let format = detect_format(input)?;
    let decoded = image::load_from_memory_with_format(input, format)
        .map_err(|e| FacemojiError::DecodeError(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(FacemojiError::ZeroDimensions);
    }
    Ok(decoded)
}

/// Encode an RGBA image as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, FacemojiError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(FacemojiError::ZeroDimensions);
    }
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| FacemojiError::EncodeError(e.to_string()))?;
    Ok(buffer)
}

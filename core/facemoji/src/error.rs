use thiserror::Error;

/// Pipeline stage that raised a [`FacemojiError::ProcessingFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Face localisation, cropping and masking.
    Detection,
    /// Dual-threshold tone remap.
    ToneRemap,
    /// Fixed colour enhancement battery.
    Enhance,
    /// Grayscale style conversion.
    Style,
    /// Elliptical border cleanup after processing.
    BorderCleanup,
    /// Template compositing.
    Composite,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Detection => "detection",
            Stage::ToneRemap => "tone remap",
            Stage::Enhance => "enhance",
            Stage::Style => "style",
            Stage::BorderCleanup => "border cleanup",
            Stage::Composite => "composite",
        };
        f.write_str(name)
    }
}

/// Errors returned by facemoji operations.
#[derive(Debug, Error)]
pub enum FacemojiError {
    /// Neither scan pass found a face.
    #[error("no face detected in the input image")]
    NoFaceDetected,

    /// Input is not PNG, JPEG, GIF or WebP.
    #[error("unsupported image format")]
    UnsupportedFormat,

    /// Recognised format, but the bytes could not be decoded.
    #[error("failed to decode image: {0}")]
    DecodeError(String),

    /// PNG encoding of the result failed.
    #[error("failed to encode image: {0}")]
    EncodeError(String),

    /// Decoded image has zero width or height.
    #[error("image dimensions are zero")]
    ZeroDimensions,

    /// Upload exceeds [`UploadConfig::max_upload_bytes`](crate::UploadConfig).
    #[error("upload of {size} bytes exceeds the {limit} byte limit")]
    UploadTooLarge {
        /// Size of the rejected upload in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },

    /// No template is registered under this style name.
    #[error("no template registered for style '{0}'")]
    TemplateNotFound(String),

    /// `put` was called with a name already in use.
    #[error("a template named '{0}' already exists")]
    TemplateExists(String),

    /// Built-in templates cannot be deleted.
    #[error("built-in template '{0}' cannot be removed")]
    BuiltinTemplate(String),

    /// Template name fails [`validate_name`](crate::validate_name).
    #[error("invalid template name '{0}': use 1-32 characters from a-z, 0-9, '-' and '_'")]
    InvalidTemplateName(String),

    /// A processing stage failed; no partial result is returned.
    #[error("{stage} failed: {message}")]
    ProcessingFailure {
        /// Stage that failed.
        stage: Stage,
        /// What went wrong.
        message: String,
    },

    /// Configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Template metadata sidecar could not be read or written.
    #[error("template sidecar error: {0}")]
    Sidecar(#[from] serde_json::Error),
}

impl FacemojiError {
    pub(crate) fn processing(stage: Stage, message: impl Into<String>) -> Self {
        FacemojiError::ProcessingFailure {
            stage,
            message: message.into(),
        }
    }

    /// Whether the caller can fix this by supplying different input.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            FacemojiError::NoFaceDetected
                | FacemojiError::UnsupportedFormat
                | FacemojiError::DecodeError(_)
                | FacemojiError::ZeroDimensions
                | FacemojiError::UploadTooLarge { .. }
                | FacemojiError::TemplateExists(_)
                | FacemojiError::InvalidTemplateName(_)
        )
    }
}

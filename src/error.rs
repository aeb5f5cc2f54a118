//! Error kinds produced by the core engine, grouped the way spec §7 groups
//! them: by how they are expected to propagate, not by which component
//! raised them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("image not found: {path}")]
    ImageNotFound { path: String },

    #[error("unsupported image mode {mode:?} in {path}")]
    UnsupportedImageMode { path: String, mode: String },

    #[error("unsupported profile colour space: {space}")]
    UnsupportedProfileColorSpace { space: String },

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("crop failure for {path}: {reason}")]
    CropFailure { path: String, reason: String },

    #[error("downsample failure for {path}: {reason}")]
    DownsampleFailure { path: String, reason: String },

    #[error("colour transform failure for {path}: {reason}")]
    ColorTransformFailure { path: String, reason: String },

    #[error("ambiguous name resolution for {path}: {candidates:?}")]
    NameResolutionAmbiguous {
        path: String,
        candidates: Vec<String>,
    },

    #[error("name resolution exhausted for {path}")]
    NameResolutionExhausted { path: String },

    /// Not counted against `error_count` (spec §7) — the caller passes the
    /// buffered graphics-state region through unchanged instead of aborting.
    #[error("unsupported image format: {path}")]
    UnsupportedImageFormat { path: String },
}

impl EngineError {
    /// Whether this error kind is gated by `abort_on_error` (as opposed to
    /// `abort_on_file_not_found`, or never counted at all).
    pub fn is_image_not_found(&self) -> bool {
        matches!(self, EngineError::ImageNotFound { .. })
    }

    pub fn is_name_resolution(&self) -> bool {
        matches!(
            self,
            EngineError::NameResolutionAmbiguous { .. } | EngineError::NameResolutionExhausted { .. }
        )
    }

    /// `unsupported_image_format` is explicitly not an error per spec §7.
    pub fn counts_as_error(&self) -> bool {
        !matches!(self, EngineError::UnsupportedImageFormat { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

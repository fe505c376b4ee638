//! Error types shared across Clipweave crates.

use std::path::PathBuf;

/// Top-level error type for Clipweave operations.
#[derive(Debug, thiserror::Error)]
pub enum ClipweaveError {
    #[error("Media load error for clip '{clip_id}': {message}")]
    MediaLoad { clip_id: String, message: String },

    #[error("Transcode error: {message}")]
    Transcode { message: String },

    #[error("Animated image encoding timed out after {timeout_secs}s")]
    EncodeTimeout { timeout_secs: u64 },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Invalid sequence: {message}")]
    InvalidSequence { message: String },

    #[error("Invalid export settings: {message}")]
    InvalidSettings { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ClipweaveError.
pub type ClipweaveResult<T> = Result<T, ClipweaveError>;

impl ClipweaveError {
    pub fn media_load(clip_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MediaLoad {
            clip_id: clip_id.into(),
            message: msg.into(),
        }
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        Self::Transcode {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn invalid_sequence(msg: impl Into<String>) -> Self {
        Self::InvalidSequence {
            message: msg.into(),
        }
    }

    pub fn invalid_settings(msg: impl Into<String>) -> Self {
        Self::InvalidSettings {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error came out of the delegated transcode pipeline.
    pub fn is_transcode(&self) -> bool {
        matches!(self, Self::Transcode { .. })
    }
}

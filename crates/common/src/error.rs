//! Error types shared across Backdrop crates.

use std::path::PathBuf;

/// Top-level error type for Backdrop operations.
#[derive(Debug, thiserror::Error)]
pub enum BackdropError {
    #[error("Probe error: {message}")]
    Probe { message: String },

    #[error("Composition error: {message}")]
    Composition { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Pipeline error: {message}")]
    Pipeline { message: String },

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

/// Result type alias using BackdropError.
pub type BackdropResult<T> = Result<T, BackdropError>;

impl BackdropError {
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe {
            message: msg.into(),
        }
    }

    pub fn composition(msg: impl Into<String>) -> Self {
        Self::Composition {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }
}

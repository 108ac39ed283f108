//! Error types for HXMP Space

use thiserror::Error;

/// Result type alias for HXMP operations
pub type HxmpResult<T> = Result<T, HxmpError>;

/// Main error type for HXMP
#[derive(Error, Debug)]
pub enum HxmpError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Version error: {0}")]
    Version(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HxmpError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new version error
    pub fn version(msg: impl Into<String>) -> Self {
        Self::Version(msg.into())
    }
}

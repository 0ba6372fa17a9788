//! Error types for rendering operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors raised by the swath rendering collaborators.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Filename does not match the swath naming pattern: {0}")]
    InvalidFilename(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid swath pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("{tool} failed: {message}")]
    CommandFailed {
        tool: String,
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("{tool} timed out after {secs} seconds")]
    Timeout { tool: String, secs: u64 },

    #[error("Expected output file was not produced: {0}")]
    MissingOutput(PathBuf),

    #[error("Invalid tool output: {0}")]
    InvalidOutput(String),

    #[error("Map service answered with {content_type}: {message}")]
    ServiceException {
        content_type: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RenderError {
    /// Create a command failure error.
    pub fn command_failed(
        tool: impl Into<String>,
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::CommandFailed {
            tool: tool.into(),
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an invalid output error.
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    /// Whether the error stems from the caller's input rather than the tooling.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            RenderError::InvalidFilename(_) | RenderError::FileNotFound(_)
        )
    }
}

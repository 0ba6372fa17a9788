//! Worker error types.

use std::time::Duration;

use swath_models::{InputError, JobError};
use swath_render::RenderError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Exception code for inputs the process cannot work with.
pub const INVALID_PARAMETER_VALUE: &str = "InvalidParameterValue";
/// Exception code for every other failure.
pub const NO_APPLICABLE_CODE: &str = "NoApplicableCode";

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unknown process: {0}")]
    UnknownProcess(String),

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Job timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("Job was dismissed")]
    Revoked,

    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error("Job task aborted: {0}")]
    Aborted(String),

    #[error("Queue error: {0}")]
    Queue(#[from] swath_queue::QueueError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<InputError> for WorkerError {
    fn from(e: InputError) -> Self {
        Self::InvalidParameter(e.to_string())
    }
}

impl WorkerError {
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Exception code recorded with the failed job.
    pub fn code(&self) -> &'static str {
        match self {
            WorkerError::InvalidParameter(_) => INVALID_PARAMETER_VALUE,
            WorkerError::Render(e) if e.is_invalid_input() => INVALID_PARAMETER_VALUE,
            _ => NO_APPLICABLE_CODE,
        }
    }

    /// Error detail stored in the job record.
    pub fn to_job_error(&self) -> JobError {
        JobError::new(self.code(), self.to_string())
    }
}

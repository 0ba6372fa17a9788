//! Queue error types.

use std::time::Duration;

use swath_models::JobId;
use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Dispatch timed out after {0:?}")]
    DispatchTimeout(Duration),

    #[error("Unexpected script reply: {0}")]
    UnexpectedReply(String),

    #[error("Record of job {job_id} is malformed: {reason}")]
    MalformedRecord { job_id: JobId, reason: String },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn malformed_record(job_id: &JobId, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            job_id: job_id.clone(),
            reason: reason.into(),
        }
    }

    /// Whether the backend could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        match self {
            QueueError::ConnectionFailed(_) | QueueError::DispatchTimeout(_) => true,
            QueueError::Redis(e) => {
                e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() || e.is_timeout()
            }
            _ => false,
        }
    }
}

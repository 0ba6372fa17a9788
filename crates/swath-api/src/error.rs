//! API error types.
//!
//! Every error is rendered as an OGC style exception body:
//! `{"type": "no-such-job", "detail": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use swath_models::{JobError, JobId, JobStatus};
use swath_queue::ManagerError;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Job not found: {0}")]
    NoSuchJob(JobId),

    #[error("Result of job {job_id} is not ready yet (status: {status})")]
    ResultNotReady { job_id: JobId, status: JobStatus },

    #[error("Job {job_id} finished without a result (status: {status})")]
    ResultUnavailable {
        job_id: JobId,
        status: JobStatus,
        error: Option<JobError>,
    },

    #[error("Process not found: {0}")]
    NoSuchProcess(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Exception type reported in the body.
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::NoSuchJob(_) => "no-such-job",
            ApiError::ResultNotReady { .. } => "result-not-ready",
            ApiError::ResultUnavailable { .. } => "result-unavailable",
            ApiError::NoSuchProcess(_) => "no-such-process",
            ApiError::InvalidParameter(_) => "invalid-parameter",
            ApiError::Conflict(_) => "conflict",
            ApiError::DispatchFailed(_) => "dispatch-failed",
            ApiError::Internal(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoSuchJob(_) | ApiError::ResultNotReady { .. } | ApiError::NoSuchProcess(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::ResultUnavailable { .. } => StatusCode::GONE,
            ApiError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::DispatchFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ManagerError> for ApiError {
    fn from(e: ManagerError) -> Self {
        match e {
            ManagerError::Input(e) => ApiError::InvalidParameter(e.to_string()),
            ManagerError::Dispatch(e) => ApiError::DispatchFailed(e.to_string()),
            ManagerError::Conflict(job_id) => {
                ApiError::Conflict(format!("job identifier '{}' is already in use", job_id))
            }
            ManagerError::NotFound(job_id) => ApiError::NoSuchJob(job_id),
            ManagerError::ResultNotReady { job_id, status } => ApiError::ResultNotReady { job_id, status },
            ManagerError::ResultUnavailable {
                job_id,
                status,
                error,
            } => ApiError::ResultUnavailable {
                job_id,
                status,
                error,
            },
            e @ (ManagerError::ResultDecode { .. }
            | ManagerError::StatusMapping { .. }
            | ManagerError::Store(_)) => {
                error!("Job manager failure: {}", e);
                ApiError::Internal(e.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    #[serde(rename = "type")]
    error_type: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JobError>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        // Internal details are logged where they occur, never sent
        let (detail, error) = match self {
            ApiError::Internal(_) => ("An internal error occurred".to_string(), None),
            ApiError::ResultUnavailable { ref error, .. } => (self.to_string(), error.clone()),
            other => (other.to_string(), None),
        };

        let body = ErrorResponse {
            error_type,
            detail,
            error,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swath_models::InputError;
    use swath_queue::QueueError;

    #[test]
    fn test_manager_errors_map_to_exception_types() {
        let cases = [
            (ManagerError::Input(InputError::Missing("netcdf_file")), "invalid-parameter", 400),
            (
                ManagerError::Dispatch(QueueError::connection_failed("refused")),
                "dispatch-failed",
                503,
            ),
            (ManagerError::Conflict(JobId::from("job-1")), "conflict", 409),
            (ManagerError::NotFound(JobId::from("job-1")), "no-such-job", 404),
            (
                ManagerError::ResultNotReady {
                    job_id: JobId::from("job-1"),
                    status: JobStatus::Running,
                },
                "result-not-ready",
                404,
            ),
            (
                ManagerError::ResultUnavailable {
                    job_id: JobId::from("job-1"),
                    status: JobStatus::Failed,
                    error: None,
                },
                "result-unavailable",
                410,
            ),
            (
                ManagerError::ResultDecode {
                    job_id: JobId::from("job-1"),
                    reason: "bad base64".into(),
                },
                "internal",
                500,
            ),
        ];

        for (err, error_type, status) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.error_type(), error_type);
            assert_eq!(api.status_code().as_u16(), status);
        }
    }

    #[tokio::test]
    async fn test_internal_detail_is_not_sent() {
        let response = ApiError::Internal("redis://secret@host refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["type"], "internal");
        assert_eq!(body["detail"], "An internal error occurred");
        assert!(body.get("error").is_none());
    }
}

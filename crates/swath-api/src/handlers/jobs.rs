//! Job status, result and dismissal handlers.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use swath_models::{JobId, JobStatus, JobSummary};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Query parameters for the job list.
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    /// Only return jobs in this status.
    #[serde(default)]
    pub status: Option<String>,
}

/// Job list response.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
}

/// List jobs, optionally filtered by status.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<JobListResponse>> {
    let filter = match query.status.as_deref() {
        None | Some("") => None,
        Some(value) => Some(
            JobStatus::parse(value)
                .ok_or_else(|| ApiError::invalid_parameter(format!("unknown job status '{}'", value)))?,
        ),
    };

    let jobs = state.manager.list_jobs(filter).await?;
    Ok(Json(JobListResponse { jobs }))
}

/// Current status of a job.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobSummary>> {
    let summary = state.manager.get_job(&JobId::from(job_id)).await?;
    Ok(Json(summary))
}

/// Raw result of a successful job, served with its stored content type.
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let envelope = state.manager.get_job_result(&JobId::from(job_id)).await?;
    Ok(([(header::CONTENT_TYPE, envelope.content_type)], envelope.payload).into_response())
}

/// Dismissal response.
#[derive(Debug, Serialize)]
pub struct DismissResponse {
    #[serde(rename = "jobID")]
    pub job_id: JobId,
    /// Whether this request recorded the revoke
    pub dismissed: bool,
    /// Status after the request
    pub status: JobStatus,
}

/// Cancel a job.
///
/// Finished jobs keep their status and report `dismissed: false`.
pub async fn dismiss_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<DismissResponse>> {
    let job_id = JobId::from(job_id);
    let dismissed = state.manager.cancel(&job_id).await?;

    let status = if dismissed {
        metrics::record_job_cancelled();
        info!(job_id = %job_id, "Job dismissed by client");
        JobStatus::Dismissed
    } else {
        state.manager.get_job(&job_id).await?.status
    };

    Ok(Json(DismissResponse {
        job_id,
        dismissed,
        status,
    }))
}

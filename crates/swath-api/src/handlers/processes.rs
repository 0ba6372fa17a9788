//! Process description and execution handlers.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use swath_models::{JobId, JobStatus, ProcessDescription, ProcessInputs};
use swath_queue::ManagerError;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Known process descriptions.
fn descriptions() -> Vec<ProcessDescription> {
    vec![ProcessDescription::netcdf()]
}

fn find_process(id: &str) -> ApiResult<ProcessDescription> {
    descriptions()
        .into_iter()
        .find(|p| p.id == id)
        .ok_or_else(|| ApiError::NoSuchProcess(id.to_string()))
}

/// Process list response.
#[derive(Serialize)]
pub struct ProcessListResponse {
    pub processes: Vec<ProcessDescription>,
}

/// List the processes this service can run.
pub async fn list_processes() -> Json<ProcessListResponse> {
    Json(ProcessListResponse {
        processes: descriptions(),
    })
}

/// Describe one process.
pub async fn get_process(Path(process_id): Path<String>) -> ApiResult<Json<ProcessDescription>> {
    Ok(Json(find_process(&process_id)?))
}

/// Query parameters of an execute request.
#[derive(Debug, Deserialize)]
pub struct ExecuteQuery {
    /// Caller chosen job identifier; a UUID is assigned when absent.
    #[serde(default)]
    pub job_id: Option<String>,
}

/// Execute request body.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub inputs: Value,
}

/// Status document returned for an accepted job.
#[derive(Debug, Serialize)]
pub struct StatusInfo {
    #[serde(rename = "jobID")]
    pub job_id: JobId,
    #[serde(rename = "processID")]
    pub process_id: String,
    #[serde(rename = "type")]
    pub job_type: &'static str,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub links: Vec<Link>,
}

#[derive(Debug, Serialize)]
pub struct Link {
    pub href: String,
    pub rel: &'static str,
}

/// Submit a job for asynchronous execution.
///
/// Responds `201 Created` with the job location as soon as the invocation is
/// enqueued; the status document always reports `accepted`.
pub async fn execute_process(
    State(state): State<AppState>,
    Path(process_id): Path<String>,
    query: Result<Query<ExecuteQuery>, QueryRejection>,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    find_process(&process_id)?;

    let Query(query) = query.map_err(|e| ApiError::invalid_parameter(e.body_text()))?;
    let Json(request) = body.map_err(|e| ApiError::invalid_parameter(e.body_text()))?;

    let job_id = match query.job_id {
        Some(id) if id.trim().is_empty() => {
            return Err(ApiError::invalid_parameter("job_id must not be empty"));
        }
        Some(id) => JobId::from(id),
        None => JobId::new(),
    };

    let inputs = ProcessInputs::from_value(&request.inputs).map_err(|e| {
        metrics::record_job_rejected(&process_id, "invalid_input");
        ApiError::from(ManagerError::Input(e))
    })?;

    let outcome = state
        .manager
        .submit(&process_id, &job_id, &inputs)
        .await
        .map_err(|e| {
            let reason = match &e {
                ManagerError::Conflict(_) => "conflict",
                ManagerError::Input(_) => "invalid_input",
                _ => "dispatch",
            };
            metrics::record_job_rejected(&process_id, reason);
            ApiError::from(e)
        })?;

    metrics::record_job_submitted(&process_id);
    info!(job_id = %job_id, process_id = %process_id, "Execute request accepted");

    let location = format!("/jobs/{}", job_id);
    let body = StatusInfo {
        job_id,
        process_id,
        job_type: "process",
        status: outcome.status,
        result: outcome.result,
        links: vec![Link {
            href: location.clone(),
            rel: "status",
        }],
    };

    Ok((
        StatusCode::CREATED,
        [
            (header::LOCATION, location),
            (header::CONTENT_TYPE, outcome.content_type.to_string()),
        ],
        Json(body),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use swath_models::PROCESS_ID;

    #[test]
    fn test_find_process() {
        assert_eq!(find_process(PROCESS_ID).unwrap().id, PROCESS_ID);
        assert!(matches!(
            find_process("hello-world"),
            Err(ApiError::NoSuchProcess(_))
        ));
    }
}

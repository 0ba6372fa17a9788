//! Job manager.
//!
//! Sole point of contact between the HTTP surface and the task store for job
//! lifecycle operations. Every read goes to the store; nothing about in-flight
//! jobs is cached in this process.

use std::sync::Arc;
use std::time::Duration;

use swath_models::{
    EnvelopeError, InputError, JobError, JobId, JobStatus, JobSummary, ProcessInputs,
    ResultEnvelope, TaskState,
};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::error::QueueError;
use crate::job::TaskInvocation;
use crate::record::{RecordError, TaskRecord};
use crate::store::{DispatchOutcome, TaskStore, TaskUpdate, Transition};

pub type ManagerResult<T> = Result<T, ManagerError>;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    #[error("Dispatch failed: {0}")]
    Dispatch(QueueError),

    #[error("Job already exists: {0}")]
    Conflict(JobId),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Result of job {job_id} is not ready (status: {status})")]
    ResultNotReady { job_id: JobId, status: JobStatus },

    #[error("Job {job_id} finished without a result (status: {status})")]
    ResultUnavailable {
        job_id: JobId,
        status: JobStatus,
        error: Option<JobError>,
    },

    #[error("Result of job {job_id} cannot be decoded: {reason}")]
    ResultDecode { job_id: JobId, reason: String },

    #[error("Record of job {job_id} is invalid: {source}")]
    StatusMapping {
        job_id: JobId,
        #[source]
        source: RecordError,
    },

    #[error("Store error: {0}")]
    Store(#[from] QueueError),
}

/// Response of a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub content_type: &'static str,
    pub result: Option<serde_json::Value>,
    pub status: JobStatus,
}

/// Job lifecycle operations over a task store.
#[derive(Clone)]
pub struct JobManager {
    store: Arc<dyn TaskStore>,
    dispatch_timeout: Duration,
}

impl JobManager {
    pub fn new(store: Arc<dyn TaskStore>, dispatch_timeout: Duration) -> Self {
        Self {
            store,
            dispatch_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Dispatch a job and return immediately with status `accepted`.
    ///
    /// The dispatch round trip is bounded by the configured timeout; failures
    /// are reported to the caller and never retried here.
    pub async fn submit(
        &self,
        process_id: &str,
        job_id: &JobId,
        inputs: &ProcessInputs,
    ) -> ManagerResult<SubmitOutcome> {
        if job_id.is_empty() {
            return Err(InputError::EmptyJobId.into());
        }
        inputs.validate()?;

        let invocation = TaskInvocation::new(process_id, job_id.clone(), inputs.clone());
        let dispatched = tokio::time::timeout(self.dispatch_timeout, self.store.dispatch(&invocation))
            .await
            .map_err(|_| QueueError::DispatchTimeout(self.dispatch_timeout))
            .and_then(|r| r);

        match dispatched {
            Ok(DispatchOutcome::Dispatched) => {
                info!(job_id = %job_id, process_id = %process_id, "Job accepted");
                Ok(SubmitOutcome {
                    content_type: "application/json",
                    result: None,
                    status: JobStatus::Accepted,
                })
            }
            Ok(DispatchOutcome::Duplicate) => {
                warn!(job_id = %job_id, "Job identifier already in use");
                Err(ManagerError::Conflict(job_id.clone()))
            }
            Err(e) => {
                error!(job_id = %job_id, "Dispatch failed: {}", e);
                Err(ManagerError::Dispatch(e))
            }
        }
    }

    /// List known jobs, optionally filtered by status, oldest submission first.
    ///
    /// Entries that cannot be decoded are skipped with a warning.
    pub async fn list_jobs(&self, filter: Option<JobStatus>) -> ManagerResult<Vec<JobSummary>> {
        let raw = self.store.scan().await?;

        let mut jobs: Vec<JobSummary> = raw
            .iter()
            .filter_map(|entry| match TaskRecord::from_raw(entry) {
                Ok(record) => Some(record.summary()),
                Err(e) => {
                    warn!(job_id = %entry.job_id, "Skipping malformed job record: {}", e);
                    None
                }
            })
            .filter(|summary| filter.map_or(true, |status| summary.status == status))
            .collect();

        jobs.sort_by(|a, b| {
            a.job_submitted_datetime
                .cmp(&b.job_submitted_datetime)
                .then_with(|| a.identifier.as_str().cmp(b.identifier.as_str()))
        });
        Ok(jobs)
    }

    async fn record(&self, job_id: &JobId) -> ManagerResult<TaskRecord> {
        let raw = self
            .store
            .fetch(job_id)
            .await?
            .ok_or_else(|| ManagerError::NotFound(job_id.clone()))?;

        TaskRecord::from_raw(&raw).map_err(|source| {
            error!(job_id = %job_id, "Job record cannot be decoded: {}", source);
            ManagerError::StatusMapping {
                job_id: job_id.clone(),
                source,
            }
        })
    }

    /// Current status of a job.
    pub async fn get_job(&self, job_id: &JobId) -> ManagerResult<JobSummary> {
        Ok(self.record(job_id).await?.summary())
    }

    /// Result envelope of a successful job.
    ///
    /// Failed and dismissed jobs never get a result; they are reported apart
    /// from jobs that are still queued or running.
    pub async fn get_job_result(&self, job_id: &JobId) -> ManagerResult<ResultEnvelope> {
        let record = self.record(job_id).await?;
        match record.state {
            TaskState::Success => {}
            TaskState::Pending | TaskState::Started => {
                return Err(ManagerError::ResultNotReady {
                    job_id: job_id.clone(),
                    status: record.state.job_status(),
                });
            }
            TaskState::Failure | TaskState::Revoked => {
                return Err(ManagerError::ResultUnavailable {
                    job_id: job_id.clone(),
                    status: record.state.job_status(),
                    error: record.error,
                });
            }
        }

        let stored = record.result.ok_or_else(|| ManagerError::ResultDecode {
            job_id: job_id.clone(),
            reason: "successful job has no stored result".to_string(),
        })?;

        ResultEnvelope::decode(&stored).map_err(|e: EnvelopeError| {
            error!(job_id = %job_id, "Stored result cannot be decoded: {}", e);
            ManagerError::ResultDecode {
                job_id: job_id.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// Request cancellation.
    ///
    /// Returns `true` when the revoke was recorded, `false` when the job had
    /// already finished. Whether a running worker actually stops is not
    /// observed here.
    pub async fn cancel(&self, job_id: &JobId) -> ManagerResult<bool> {
        match self.store.transition(job_id, &TaskUpdate::revoked()).await? {
            Transition::Applied(previous) => {
                info!(job_id = %job_id, "Job dismissed (was {})", previous);
                Ok(true)
            }
            Transition::Refused(current) => {
                info!(job_id = %job_id, "Cancel ignored, job already {}", current);
                Ok(false)
            }
            Transition::Missing => Err(ManagerError::NotFound(job_id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTaskStore;

    fn manager() -> (Arc<MemoryTaskStore>, JobManager) {
        let store = Arc::new(MemoryTaskStore::new());
        let manager = JobManager::new(store.clone(), Duration::from_millis(200));
        (store, manager)
    }

    fn inputs() -> ProcessInputs {
        ProcessInputs::new("noaa19-avhrr-20230113072221-20230113073600.nc")
    }

    #[tokio::test]
    async fn test_submit_returns_accepted() {
        let (store, manager) = manager();
        let job_id = JobId::from("job-1");

        let outcome = manager.submit("process-netcdf", &job_id, &inputs()).await.unwrap();
        assert_eq!(outcome.status, JobStatus::Accepted);
        assert_eq!(outcome.content_type, "application/json");
        assert!(outcome.result.is_none());
        assert_eq!(store.queued().await, 1);

        let summary = manager.get_job(&job_id).await.unwrap();
        assert_eq!(summary.status, JobStatus::Accepted);
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_job_id() {
        let (store, manager) = manager();
        let err = manager
            .submit("process-netcdf", &JobId::from(""), &inputs())
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::Input(InputError::EmptyJobId)));
        assert_eq!(store.queued().await, 0);
    }

    #[tokio::test]
    async fn test_submit_rejects_missing_source() {
        let (store, manager) = manager();
        let err = manager
            .submit("process-netcdf", &JobId::from("job-1"), &ProcessInputs::new(" "))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::Input(InputError::Missing("netcdf_file"))));
        assert_eq!(store.queued().await, 0);
    }

    #[tokio::test]
    async fn test_submit_duplicate_is_conflict() {
        let (_, manager) = manager();
        let job_id = JobId::from("job-1");
        manager.submit("process-netcdf", &job_id, &inputs()).await.unwrap();
        let err = manager
            .submit("process-netcdf", &job_id, &inputs())
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_submit_unreachable_store() {
        let (store, manager) = manager();
        store.set_available(false);
        let err = manager
            .submit("process-netcdf", &JobId::from("job-1"), &inputs())
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::Dispatch(_)));
    }

    #[tokio::test]
    async fn test_submit_bounded_by_dispatch_timeout() {
        let (store, manager) = manager();
        store.set_dispatch_delay(Some(Duration::from_secs(30))).await;

        let started = std::time::Instant::now();
        let err = manager
            .submit("process-netcdf", &JobId::from("job-1"), &inputs())
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(err, ManagerError::Dispatch(QueueError::DispatchTimeout(_))));
    }

    #[tokio::test]
    async fn test_get_job_unknown() {
        let (_, manager) = manager();
        let err = manager.get_job(&JobId::from("nope")).await.unwrap_err();
        assert!(matches!(err, ManagerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_job_unmapped_status_is_defect() {
        let (store, manager) = manager();
        store.insert_raw("job-1", &[("status", "RETRY")]).await;
        let err = manager.get_job(&JobId::from("job-1")).await.unwrap_err();
        assert!(matches!(
            err,
            ManagerError::StatusMapping {
                source: RecordError::UnmappedStatus(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_result_not_ready() {
        let (store, manager) = manager();
        let job_id = JobId::from("job-1");
        manager.submit("process-netcdf", &job_id, &inputs()).await.unwrap();

        let err = manager.get_job_result(&job_id).await.unwrap_err();
        assert!(matches!(
            err,
            ManagerError::ResultNotReady {
                status: JobStatus::Accepted,
                ..
            }
        ));

        store.transition(&job_id, &TaskUpdate::started()).await.unwrap();
        let err = manager.get_job_result(&job_id).await.unwrap_err();
        assert!(matches!(
            err,
            ManagerError::ResultNotReady {
                status: JobStatus::Running,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_result_round_trip_all_sizes() {
        let (store, manager) = manager();
        for (i, len) in [0usize, 512, 1024 * 1024 + 3].into_iter().enumerate() {
            let job_id = JobId::from(format!("job-{}", i));
            manager.submit("process-netcdf", &job_id, &inputs()).await.unwrap();
            let payload: Vec<u8> = (0..len).map(|b| (b % 251) as u8).collect();
            let envelope = ResultEnvelope::new("image/png", payload);
            store.transition(&job_id, &TaskUpdate::started()).await.unwrap();
            store
                .transition(&job_id, &TaskUpdate::succeeded(&envelope))
                .await
                .unwrap();

            assert_eq!(manager.get_job_result(&job_id).await.unwrap(), envelope);
        }
    }

    #[tokio::test]
    async fn test_terminal_reads_are_stable() {
        let (store, manager) = manager();
        let job_id = JobId::from("job-1");
        manager.submit("process-netcdf", &job_id, &inputs()).await.unwrap();
        let envelope = ResultEnvelope::new("image/png", vec![9; 64]);
        store
            .transition(&job_id, &TaskUpdate::succeeded(&envelope))
            .await
            .unwrap();

        let first = manager.get_job(&job_id).await.unwrap();
        let first_result = manager.get_job_result(&job_id).await.unwrap();
        for _ in 0..3 {
            assert_eq!(manager.get_job(&job_id).await.unwrap(), first);
            assert_eq!(manager.get_job_result(&job_id).await.unwrap(), first_result);
        }
        assert_eq!(first.status, JobStatus::Successful);
        assert_eq!(first.mimetype.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_result_decode_error() {
        let (store, manager) = manager();
        store
            .insert_raw("job-1", &[("status", "SUCCESS"), ("result", "['image/png', b'x']")])
            .await;
        let err = manager.get_job_result(&JobId::from("job-1")).await.unwrap_err();
        assert!(matches!(err, ManagerError::ResultDecode { .. }));

        store.insert_raw("job-2", &[("status", "SUCCESS")]).await;
        let err = manager.get_job_result(&JobId::from("job-2")).await.unwrap_err();
        assert!(matches!(err, ManagerError::ResultDecode { .. }));
    }

    #[tokio::test]
    async fn test_cancel_then_late_result_stays_dismissed() {
        let (store, manager) = manager();
        let job_id = JobId::from("job-1");
        manager.submit("process-netcdf", &job_id, &inputs()).await.unwrap();
        store.transition(&job_id, &TaskUpdate::started()).await.unwrap();

        assert!(manager.cancel(&job_id).await.unwrap());

        // The worker finishes anyway
        let late = store
            .transition(
                &job_id,
                &TaskUpdate::succeeded(&ResultEnvelope::new("image/png", vec![1])),
            )
            .await
            .unwrap();
        assert_eq!(late, Transition::Refused(TaskState::Revoked));

        assert_eq!(manager.get_job(&job_id).await.unwrap().status, JobStatus::Dismissed);
        assert!(matches!(
            manager.get_job_result(&job_id).await.unwrap_err(),
            ManagerError::ResultUnavailable {
                status: JobStatus::Dismissed,
                error: None,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_failed_job_result_carries_error() {
        let (store, manager) = manager();
        let job_id = JobId::from("job-1");
        manager.submit("process-netcdf", &job_id, &inputs()).await.unwrap();
        store.transition(&job_id, &TaskUpdate::started()).await.unwrap();
        store
            .transition(
                &job_id,
                &TaskUpdate::failed(JobError::new("NoApplicableCode", "mapserv crashed")),
            )
            .await
            .unwrap();

        match manager.get_job_result(&job_id).await.unwrap_err() {
            ManagerError::ResultUnavailable { status, error, .. } => {
                assert_eq!(status, JobStatus::Failed);
                assert_eq!(
                    error,
                    Some(JobError::new("NoApplicableCode", "mapserv crashed"))
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_finished_job_returns_false() {
        let (store, manager) = manager();
        let job_id = JobId::from("job-1");
        manager.submit("process-netcdf", &job_id, &inputs()).await.unwrap();
        store
            .transition(&job_id, &TaskUpdate::failed(JobError::new("NoApplicableCode", "boom")))
            .await
            .unwrap();

        assert!(!manager.cancel(&job_id).await.unwrap());
        assert_eq!(manager.get_job(&job_id).await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let (_, manager) = manager();
        assert!(matches!(
            manager.cancel(&JobId::from("nope")).await.unwrap_err(),
            ManagerError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_jobs_skips_malformed_and_filters() {
        let (store, manager) = manager();
        manager
            .submit("process-netcdf", &JobId::from("a"), &inputs())
            .await
            .unwrap();
        manager
            .submit("process-netcdf", &JobId::from("b"), &inputs())
            .await
            .unwrap();
        store
            .transition(&JobId::from("b"), &TaskUpdate::started())
            .await
            .unwrap();
        store.insert_raw("broken-1", &[("task_name", "process-netcdf")]).await;
        store.insert_raw("broken-2", &[("status", "WHATEVER")]).await;

        let all = manager.list_jobs(None).await.unwrap();
        let ids: Vec<_> = all.iter().map(|j| j.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let running = manager.list_jobs(Some(JobStatus::Running)).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].identifier.as_str(), "b");
    }
}

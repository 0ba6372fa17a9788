//! Task store abstraction shared by the job manager and the workers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use swath_models::{JobError, JobId, ResultEnvelope, TaskState};

use crate::error::QueueResult;
use crate::job::TaskInvocation;
use crate::record::RawRecord;

/// Outcome of dispatching an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Record created and invocation enqueued
    Dispatched,
    /// A record already exists for this job identifier; nothing was written
    Duplicate,
}

/// Outcome of a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Applied on top of the given previous state
    Applied(TaskState),
    /// Refused because the record is already in the given terminal state
    Refused(TaskState),
    /// No record for this job identifier
    Missing,
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

/// A state change written by a worker or by cancellation.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpdate {
    pub state: TaskState,
    pub result: Option<String>,
    pub error: Option<JobError>,
    pub at: DateTime<Utc>,
}

impl TaskUpdate {
    fn new(state: TaskState) -> Self {
        Self {
            state,
            result: None,
            error: None,
            at: Utc::now(),
        }
    }

    pub fn started() -> Self {
        Self::new(TaskState::Started)
    }

    pub fn succeeded(envelope: &ResultEnvelope) -> Self {
        Self {
            result: Some(envelope.encode()),
            ..Self::new(TaskState::Success)
        }
    }

    pub fn failed(error: JobError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(TaskState::Failure)
        }
    }

    pub fn revoked() -> Self {
        Self::new(TaskState::Revoked)
    }

    /// Fields written alongside the new status.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        match self.state {
            TaskState::Started => fields.push(("date_started", self.at.to_rfc3339())),
            state if state.is_terminal() => fields.push(("date_done", self.at.to_rfc3339())),
            _ => {}
        }
        if let Some(result) = &self.result {
            fields.push(("result", result.clone()));
        }
        if let Some(error) = &self.error {
            fields.push(("error_code", error.code.clone()));
            fields.push(("error_description", error.description.clone()));
        }
        fields
    }
}

/// An invocation handed to a worker, to be acknowledged once handled.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub delivery_id: String,
    pub invocation: TaskInvocation,
}

/// Task queue plus job store.
///
/// Implementations must make `dispatch` and `transition` atomic: dispatch
/// never overwrites an existing record, and no transition leaves a terminal
/// state.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create the `PENDING` record and enqueue the invocation.
    async fn dispatch(&self, invocation: &TaskInvocation) -> QueueResult<DispatchOutcome>;

    /// Read one record.
    async fn fetch(&self, job_id: &JobId) -> QueueResult<Option<RawRecord>>;

    /// Read every record under the store's key prefix.
    async fn scan(&self) -> QueueResult<Vec<RawRecord>>;

    /// Apply a state change unless the record is terminal.
    async fn transition(&self, job_id: &JobId, update: &TaskUpdate) -> QueueResult<Transition>;

    /// Take up to `count` new invocations, waiting at most `block`.
    async fn consume(&self, consumer: &str, block: Duration, count: usize) -> QueueResult<Vec<Delivery>>;

    /// Take over invocations delivered to another consumer and idle for `min_idle`.
    async fn claim_stale(&self, consumer: &str, min_idle: Duration, count: usize) -> QueueResult<Vec<Delivery>>;

    /// Acknowledge a delivery.
    async fn ack(&self, delivery_id: &str) -> QueueResult<()>;

    /// Check backend connectivity.
    async fn ping(&self) -> QueueResult<()>;
}

/// Describe a status field that no transition can start from.
pub(crate) fn status_reason(status: &str) -> String {
    if status.is_empty() {
        "no status field".to_string()
    } else {
        format!("unknown status '{}'", status)
    }
}

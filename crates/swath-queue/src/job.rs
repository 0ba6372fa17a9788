//! Task invocations carried by the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swath_models::{JobId, ProcessInputs, TaskState};

/// One request to run a task, keyed by the caller's job identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInvocation {
    /// Registered task (process) name
    pub task_name: String,
    /// Job identifier, also the idempotency key
    pub job_id: JobId,
    /// Process inputs
    pub inputs: ProcessInputs,
    /// When the job was submitted
    pub submitted_at: DateTime<Utc>,
}

impl TaskInvocation {
    pub fn new(task_name: impl Into<String>, job_id: JobId, inputs: ProcessInputs) -> Self {
        Self {
            task_name: task_name.into(),
            job_id,
            inputs,
            submitted_at: Utc::now(),
        }
    }

    /// Fields of the initial `PENDING` record.
    pub fn initial_fields(&self) -> serde_json::Result<Vec<(&'static str, String)>> {
        Ok(vec![
            ("task_name", self.task_name.clone()),
            ("inputs", serde_json::to_string(&self.inputs)?),
            ("status", TaskState::Pending.as_str().to_string()),
            ("date_submitted", self.submitted_at.to_rfc3339()),
        ])
    }
}

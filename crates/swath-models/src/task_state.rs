//! Queue-native task states and their mapping onto job statuses.
//!
//! Workers and the store speak the queue vocabulary (`PENDING`, `STARTED`,
//! ...). Clients only ever see [`JobStatus`]. The mapping is a plain
//! exhaustive `match`, so a new task state cannot be added without giving it
//! a job status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::JobStatus;

/// A status string read from the store that has no task state.
///
/// This indicates a defect (a writer using an unknown vocabulary), never a
/// condition to default past.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unmapped task status '{0}'")]
pub struct UnmappedStatus(pub String);

/// Task state as recorded by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Dispatched, not yet picked up
    Pending,
    /// Picked up by a worker
    Started,
    /// Finished with a result envelope
    Success,
    /// Finished with an error
    Failure,
    /// Cancelled before or while running
    Revoked,
}

impl TaskState {
    /// All states the queue can emit.
    pub const ALL: [TaskState; 5] = [
        TaskState::Pending,
        TaskState::Started,
        TaskState::Success,
        TaskState::Failure,
        TaskState::Revoked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Started => "STARTED",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
            TaskState::Revoked => "REVOKED",
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failure | TaskState::Revoked
        )
    }

    /// Map onto the client-facing job status.
    pub fn job_status(&self) -> JobStatus {
        match self {
            TaskState::Pending => JobStatus::Accepted,
            TaskState::Started => JobStatus::Running,
            TaskState::Success => JobStatus::Successful,
            TaskState::Failure => JobStatus::Failed,
            TaskState::Revoked => JobStatus::Dismissed,
        }
    }
}

impl From<TaskState> for JobStatus {
    fn from(state: TaskState) -> Self {
        state.job_status()
    }
}

impl FromStr for TaskState {
    type Err = UnmappedStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnmappedStatus(s.to_string()))
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//! Shared data models for the swath processing service.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job summaries and the framework status vocabulary
//! - Queue-native task states and their mapping onto job statuses
//! - The versioned result envelope stored by workers
//! - Process inputs and the process description document

pub mod envelope;
pub mod job;
pub mod process;
pub mod task_state;

// Re-export common types
pub use envelope::{EnvelopeError, ResultEnvelope, ENVELOPE_VERSION};
pub use job::{JobError, JobId, JobStatus, JobSummary};
pub use process::{InputError, ProcessDescription, ProcessInputs, DEFAULT_PRODUCT, PROCESS_ID};
pub use task_state::{TaskState, UnmappedStatus};

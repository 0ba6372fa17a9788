//! Redis Streams task queue and job store.
//!
//! This crate provides:
//! - Task dispatch keyed by the caller's job identifier
//! - Per-job task records with sticky terminal states
//! - Worker consumption through a consumer group
//! - The job manager translating records into client-facing job summaries

pub mod error;
pub mod job;
pub mod manager;
pub mod memory;
pub mod queue;
pub mod record;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use job::TaskInvocation;
pub use manager::{JobManager, ManagerError, ManagerResult, SubmitOutcome};
pub use memory::MemoryTaskStore;
pub use queue::{QueueConfig, RedisTaskStore};
pub use record::{RawRecord, RecordError, TaskRecord};
pub use store::{Delivery, DispatchOutcome, TaskStore, TaskUpdate, Transition};

//! Swath processing worker.
//!
//! This crate provides:
//! - The `Process` capability and the swath rendering process
//! - Job executor consuming invocations from the task queue
//! - Cancellation, timeout and panic containment per job
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod process;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{ExecutionContext, JobExecutor, JobOutcome};
pub use logging::JobLogger;
pub use process::{NetcdfProcess, Process, ProcessRegistry};

//! Structured job logging.
//!
//! Every lifecycle event of a job is logged with the same `job_id` and
//! `process_id` fields so a job can be followed across log lines.

use std::time::Instant;

use swath_models::{JobError, JobId};
use tracing::{error, info, warn, Span};

/// Lifecycle logger bound to one job execution.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    process_id: String,
    started: Instant,
}

impl JobLogger {
    pub fn new(job_id: &JobId, process_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            process_id: process_id.to_string(),
            started: Instant::now(),
        }
    }

    pub fn log_start(&self) {
        info!(
            job_id = %self.job_id,
            process_id = %self.process_id,
            "Job running"
        );
    }

    /// Log a processing step.
    pub fn log_step(&self, step: &str, message: &str) {
        info!(
            job_id = %self.job_id,
            process_id = %self.process_id,
            step,
            "{}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            process_id = %self.process_id,
            "Job warning: {}", message
        );
    }

    pub fn log_success(&self, content_type: &str, bytes: usize) {
        info!(
            job_id = %self.job_id,
            process_id = %self.process_id,
            elapsed_ms = self.elapsed_ms(),
            content_type,
            bytes,
            "Job successful"
        );
    }

    pub fn log_failure(&self, error: &JobError) {
        error!(
            job_id = %self.job_id,
            process_id = %self.process_id,
            elapsed_ms = self.elapsed_ms(),
            code = %error.code,
            "Job failed: {}", error.description
        );
    }

    pub fn log_dismissed(&self) {
        info!(
            job_id = %self.job_id,
            process_id = %self.process_id,
            elapsed_ms = self.elapsed_ms(),
            "Job dismissed, execution aborted"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Span covering the job execution.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            process_id = %self.process_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "process-netcdf");

        assert_eq!(logger.job_id(), job_id.to_string());
        assert_eq!(logger.process_id(), "process-netcdf");
        assert!(logger.elapsed_ms() < 60_000);
    }
}

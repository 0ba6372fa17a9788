//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "swath_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "swath_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "swath_jobs_failed_total";
    pub const JOBS_DISMISSED_TOTAL: &str = "swath_jobs_dismissed_total";
    pub const LATE_RESULTS_DISCARDED_TOTAL: &str = "swath_late_results_discarded_total";
    pub const JOB_DURATION_SECONDS: &str = "swath_job_duration_seconds";
}

/// Install the recorder and serve `/metrics` on the given port.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()
}

pub fn record_job_started(process_id: &str) {
    let labels = [("process", process_id.to_string())];
    counter!(names::JOBS_STARTED_TOTAL, &labels).increment(1);
}

pub fn record_job_completed(process_id: &str, duration_secs: f64) {
    let labels = [("process", process_id.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_failed(process_id: &str, code: &str) {
    let labels = [
        ("process", process_id.to_string()),
        ("code", code.to_string()),
    ];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_job_dismissed(process_id: &str) {
    let labels = [("process", process_id.to_string())];
    counter!(names::JOBS_DISMISSED_TOTAL, &labels).increment(1);
}

pub fn record_late_result_discarded(process_id: &str) {
    let labels = [("process", process_id.to_string())];
    counter!(names::LATE_RESULTS_DISCARDED_TOTAL, &labels).increment(1);
}

//! Worker configuration.

use std::time::Duration;

use swath_render::RenderConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Job timeout
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often a running job checks whether it was dismissed
    pub revoke_poll_interval: Duration,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed (crash recovery).
    /// Kept above `job_timeout` so a job still running elsewhere is never taken over.
    pub claim_min_idle: Duration,
    /// Port of the Prometheus scrape endpoint, disabled when unset
    pub metrics_port: Option<u16>,
    /// External tools and work directory
    pub render: RenderConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let job_timeout = Duration::from_secs(1800);
        Self {
            max_concurrent_jobs: 2,
            job_timeout,
            shutdown_timeout: Duration::from_secs(30),
            revoke_poll_interval: Duration::from_millis(1000),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: job_timeout + Duration::from_secs(60),
            metrics_port: None,
            render: RenderConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let job_timeout = Duration::from_secs(
            std::env::var("WORKER_JOB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1800),
        );

        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(2),
            job_timeout,
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            revoke_poll_interval: Duration::from_millis(
                std::env::var("WORKER_REVOKE_POLL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            claim_min_idle: std::env::var("WORKER_CLAIM_MIN_IDLE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(job_timeout + Duration::from_secs(60)),
            metrics_port: std::env::var("WORKER_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
            render: RenderConfig::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_idle_exceeds_job_timeout() {
        let config = WorkerConfig::default();
        assert!(config.claim_min_idle > config.job_timeout);
        assert_eq!(config.max_concurrent_jobs, 2);
        assert!(config.metrics_port.is_none());
    }
}

//! Job executor.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use swath_models::{JobError, JobId, ResultEnvelope, TaskState};
use swath_queue::{
    Delivery, QueueError, QueueResult, TaskInvocation, TaskStore, TaskUpdate, Transition,
};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::process::ProcessRegistry;

/// How a delivered invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Result stored, job successful
    Succeeded,
    /// Error stored, job failed
    Failed(JobError),
    /// Dismissed before or while running; nothing stored
    Dismissed,
    /// Record missing, malformed or already finished; not executed
    Skipped,
}

/// Shared state for executing invocations.
#[derive(Clone)]
pub struct ExecutionContext {
    store: Arc<dyn TaskStore>,
    processes: ProcessRegistry,
    job_timeout: Duration,
    revoke_poll_interval: Duration,
}

impl ExecutionContext {
    pub fn new(store: Arc<dyn TaskStore>, processes: ProcessRegistry, config: &WorkerConfig) -> Self {
        Self {
            store,
            processes,
            job_timeout: config.job_timeout,
            revoke_poll_interval: config.revoke_poll_interval.max(Duration::from_millis(10)),
        }
    }

    /// Execute a delivery and acknowledge it.
    ///
    /// A store failure leaves the delivery unacknowledged so it is claimed
    /// again later.
    pub async fn handle(&self, delivery: Delivery) -> QueueResult<JobOutcome> {
        let job_id = delivery.invocation.job_id.clone();
        let logger = JobLogger::new(&job_id, &delivery.invocation.task_name);

        let outcome = self
            .execute(&logger, delivery.invocation)
            .instrument(logger.create_span())
            .await;

        match outcome {
            Ok(outcome) => {
                if let Err(e) = self.store.ack(&delivery.delivery_id).await {
                    error!(job_id = %job_id, "Failed to ack delivery {}: {}", delivery.delivery_id, e);
                }
                Ok(outcome)
            }
            Err(e) => {
                error!(
                    job_id = %job_id,
                    "Store failure, leaving delivery {} pending: {}",
                    delivery.delivery_id,
                    e
                );
                Err(e)
            }
        }
    }

    async fn execute(&self, logger: &JobLogger, invocation: TaskInvocation) -> QueueResult<JobOutcome> {
        let job_id = invocation.job_id.clone();
        let process_id = invocation.task_name.clone();

        match self.store.transition(&job_id, &TaskUpdate::started()).await {
            Ok(Transition::Applied(_)) => {}
            Ok(Transition::Refused(state)) => {
                info!(job_id = %job_id, "Skipping job already {}", state);
                return Ok(JobOutcome::Skipped);
            }
            Ok(Transition::Missing) => {
                logger.log_warning("skipping job without record");
                return Ok(JobOutcome::Skipped);
            }
            Err(QueueError::MalformedRecord { reason, .. }) => {
                logger.log_warning(&format!("skipping job with malformed record: {}", reason));
                return Ok(JobOutcome::Skipped);
            }
            Err(e) => return Err(e),
        }

        logger.log_start();
        metrics::record_job_started(&process_id);
        let started = Instant::now();

        let (update, produced) = match self.run_process(invocation).await {
            Ok(envelope) => (
                TaskUpdate::succeeded(&envelope),
                Some((envelope.content_type.clone(), envelope.len())),
            ),
            Err(WorkerError::Revoked) => {
                logger.log_dismissed();
                metrics::record_job_dismissed(&process_id);
                return Ok(JobOutcome::Dismissed);
            }
            Err(e) => (TaskUpdate::failed(e.to_job_error()), None),
        };

        match self.store.transition(&job_id, &update).await? {
            Transition::Applied(_) => {}
            Transition::Refused(state) => {
                logger.log_warning(&format!("discarding late result, job already {}", state));
                metrics::record_late_result_discarded(&process_id);
                return Ok(if state == TaskState::Revoked {
                    JobOutcome::Dismissed
                } else {
                    JobOutcome::Skipped
                });
            }
            Transition::Missing => {
                logger.log_warning("job record disappeared, result dropped");
                return Ok(JobOutcome::Skipped);
            }
        }

        match (update.error, produced) {
            (Some(error), _) => {
                logger.log_failure(&error);
                metrics::record_job_failed(&process_id, &error.code);
                Ok(JobOutcome::Failed(error))
            }
            (None, produced) => {
                let (content_type, bytes) = produced.unwrap_or_default();
                logger.log_success(&content_type, bytes);
                metrics::record_job_completed(&process_id, started.elapsed().as_secs_f64());
                Ok(JobOutcome::Succeeded)
            }
        }
    }

    /// Run the process in its own task, bounded by the job timeout and
    /// aborted on dismissal. Panics stay inside the task.
    async fn run_process(&self, invocation: TaskInvocation) -> WorkerResult<ResultEnvelope> {
        let process = self
            .processes
            .get(&invocation.task_name)
            .ok_or_else(|| WorkerError::UnknownProcess(invocation.task_name.clone()))?;

        let job_id = invocation.job_id.clone();
        let inputs = invocation.inputs;
        let mut handle = tokio::spawn(async move { process.execute(&job_id, &inputs).await });

        let stopped = tokio::select! {
            joined = &mut handle => {
                return match joined {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => Err(WorkerError::Panicked(panic_message(e.into_panic()))),
                    Err(e) => Err(WorkerError::Aborted(e.to_string())),
                };
            }
            _ = tokio::time::sleep(self.job_timeout) => WorkerError::Timeout(self.job_timeout),
            _ = self.wait_for_revoke(&invocation.job_id) => WorkerError::Revoked,
        };

        // Dropping the process future kills any tool it is running
        handle.abort();
        Err(stopped)
    }

    /// Resolve once the job record is dismissed or gone.
    async fn wait_for_revoke(&self, job_id: &JobId) {
        let mut interval = tokio::time::interval(self.revoke_poll_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            match self.store.fetch(job_id).await {
                Ok(Some(raw)) => {
                    if raw.fields.get("status").map(String::as_str) == Some(TaskState::Revoked.as_str()) {
                        return;
                    }
                }
                Ok(None) => {
                    warn!(job_id = %job_id, "Job record disappeared while running");
                    return;
                }
                Err(e) => debug!(job_id = %job_id, "Revoke check failed: {}", e),
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Job executor that processes invocations from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    ctx: Arc<ExecutionContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, store: Arc<dyn TaskStore>, processes: ProcessRegistry) -> Self {
        let ctx = Arc::new(ExecutionContext::new(store, processes, &config));
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            ctx,
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Start the executor. Returns after shutdown once in-flight jobs are
    /// done or the shutdown timeout has passed.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs (processes: {})",
            self.consumer_name,
            self.config.max_concurrent_jobs,
            self.ctx.processes.ids().join(", ")
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = self.spawn_claim_task();

        // Main job consumption loop
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "Shutdown timeout of {:?} reached with jobs still running",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically take over deliveries left behind by dead workers.
    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let claim_interval = self.config.claim_interval;
        let min_idle = self.config.claim_min_idle;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match ctx.store.claim_stale(&consumer_name, min_idle, 5).await {
                            Ok(deliveries) if !deliveries.is_empty() => {
                                info!("Claimed {} stale deliveries", deliveries.len());
                                for delivery in deliveries {
                                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                        break;
                                    };
                                    let ctx = Arc::clone(&ctx);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        ctx.handle(delivery).await.ok();
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Failed to claim stale deliveries: {}", e),
                        }
                    }
                }
            }
        })
    }

    /// Consume and process invocations from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .ctx
            .store
            .consume(&self.consumer_name, Duration::from_secs(1), available.min(5))
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} deliveries from queue", deliveries.len());

        for delivery in deliveries {
            let ctx = Arc::clone(&self.ctx);
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::config_error("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                ctx.handle(delivery).await.ok();
            });
        }

        Ok(())
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

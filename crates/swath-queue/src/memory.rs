//! In-process task store.
//!
//! Same semantics as [`RedisTaskStore`](crate::RedisTaskStore) without a
//! server: atomic dispatch, sticky terminal states, consumer deliveries that
//! stay pending until acknowledged. Used by tests and local single-process
//! runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use swath_models::{JobId, TaskState};
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::job::TaskInvocation;
use crate::record::RawRecord;
use crate::store::{
    status_reason, Delivery, DispatchOutcome, TaskStore, TaskUpdate, Transition,
};

struct PendingDelivery {
    consumer: String,
    delivered_at: Instant,
    invocation: TaskInvocation,
}

#[derive(Default)]
struct State {
    records: HashMap<JobId, HashMap<String, String>>,
    stream: VecDeque<Delivery>,
    pending: HashMap<String, PendingDelivery>,
}

/// Task store kept in process memory.
#[derive(Default)]
pub struct MemoryTaskStore {
    state: Mutex<State>,
    notify: Notify,
    next_id: AtomicU64,
    unavailable: AtomicBool,
    dispatch_delay: Mutex<Option<Duration>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable backend.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Delay every dispatch, to simulate a slow backend.
    pub async fn set_dispatch_delay(&self, delay: Option<Duration>) {
        *self.dispatch_delay.lock().await = delay;
    }

    /// Write raw record fields, bypassing validation.
    pub async fn insert_raw(&self, job_id: impl Into<JobId>, fields: &[(&str, &str)]) {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.state.lock().await.records.insert(job_id.into(), fields);
    }

    /// Number of invocations waiting in the stream.
    pub async fn queued(&self) -> usize {
        self.state.lock().await.stream.len()
    }

    /// Number of delivered but unacknowledged invocations.
    pub async fn pending(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    fn check_available(&self) -> QueueResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::connection_failed("memory store marked unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn dispatch(&self, invocation: &TaskInvocation) -> QueueResult<DispatchOutcome> {
        let delay = *self.dispatch_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_available()?;

        let fields = invocation.initial_fields()?;
        let mut state = self.state.lock().await;
        if state.records.contains_key(&invocation.job_id) {
            return Ok(DispatchOutcome::Duplicate);
        }

        state.records.insert(
            invocation.job_id.clone(),
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        );
        let delivery_id = format!("{}-0", self.next_id.fetch_add(1, Ordering::SeqCst));
        state.stream.push_back(Delivery {
            delivery_id,
            invocation: invocation.clone(),
        });
        drop(state);

        self.notify.notify_waiters();
        Ok(DispatchOutcome::Dispatched)
    }

    async fn fetch(&self, job_id: &JobId) -> QueueResult<Option<RawRecord>> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.records.get(job_id).map(|fields| RawRecord {
            job_id: job_id.clone(),
            fields: fields.clone(),
        }))
    }

    async fn scan(&self) -> QueueResult<Vec<RawRecord>> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .map(|(job_id, fields)| RawRecord {
                job_id: job_id.clone(),
                fields: fields.clone(),
            })
            .collect())
    }

    async fn transition(&self, job_id: &JobId, update: &TaskUpdate) -> QueueResult<Transition> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let Some(fields) = state.records.get_mut(job_id) else {
            return Ok(Transition::Missing);
        };

        let current = fields
            .get("status")
            .map(String::as_str)
            .unwrap_or_default();
        let current: TaskState = current
            .parse()
            .map_err(|_| QueueError::malformed_record(job_id, status_reason(current)))?;

        if current.is_terminal() {
            debug!(job_id = %job_id, "Refused {} -> {}", current, update.state);
            return Ok(Transition::Refused(current));
        }

        fields.insert("status".to_string(), update.state.as_str().to_string());
        for (field, value) in update.fields() {
            fields.insert(field.to_string(), value);
        }
        Ok(Transition::Applied(current))
    }

    async fn consume(&self, consumer: &str, block: Duration, count: usize) -> QueueResult<Vec<Delivery>> {
        let deadline = tokio::time::Instant::now() + block;
        loop {
            self.check_available()?;
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if !state.stream.is_empty() {
                    let take = count.min(state.stream.len());
                    let batch: Vec<Delivery> = state.stream.drain(..take).collect();
                    for delivery in &batch {
                        state.pending.insert(
                            delivery.delivery_id.clone(),
                            PendingDelivery {
                                consumer: consumer.to_string(),
                                delivered_at: Instant::now(),
                                invocation: delivery.invocation.clone(),
                            },
                        );
                    }
                    return Ok(batch);
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn claim_stale(&self, consumer: &str, min_idle: Duration, count: usize) -> QueueResult<Vec<Delivery>> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let mut claimed = Vec::new();
        for (delivery_id, pending) in state.pending.iter_mut() {
            if claimed.len() >= count {
                break;
            }
            if pending.consumer != consumer && pending.delivered_at.elapsed() >= min_idle {
                pending.consumer = consumer.to_string();
                pending.delivered_at = Instant::now();
                claimed.push(Delivery {
                    delivery_id: delivery_id.clone(),
                    invocation: pending.invocation.clone(),
                });
            }
        }
        Ok(claimed)
    }

    async fn ack(&self, delivery_id: &str) -> QueueResult<()> {
        self.check_available()?;
        self.state.lock().await.pending.remove(delivery_id);
        Ok(())
    }

    async fn ping(&self) -> QueueResult<()> {
        self.check_available()
    }
}

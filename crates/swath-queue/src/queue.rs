//! Task queue and job store on Redis.
//!
//! Invocations travel through a Redis stream read by a consumer group. Each
//! job has a hash `<key_prefix><job_id>` holding its task record; terminal
//! records expire after `result_ttl`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use redis::Script;
use swath_models::{JobId, TaskState};
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::TaskInvocation;
use crate::record::RawRecord;
use crate::store::{
    status_reason, Delivery, DispatchOutcome, TaskStore, TaskUpdate, Transition,
};

/// Creates the record and appends to the stream, unless the record exists.
const DISPATCH_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
for i = 3, #ARGV, 2 do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
redis.call('XADD', KEYS[2], '*', 'job', ARGV[2], 'job_id', ARGV[1])
return 1
"#;

/// Applies a status change unless the record is missing, malformed or
/// terminal.
const TRANSITION_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return {'missing', ''}
end
local current = redis.call('HGET', KEYS[1], 'status')
if not current then
    return {'malformed', ''}
end
if current == 'SUCCESS' or current == 'FAILURE' or current == 'REVOKED' then
    return {'refused', current}
end
if current ~= 'PENDING' and current ~= 'STARTED' then
    return {'malformed', current}
end
redis.call('HSET', KEYS[1], 'status', ARGV[1])
for i = 3, #ARGV, 2 do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
local ttl = tonumber(ARGV[2])
if ttl > 0 then
    redis.call('EXPIRE', KEYS[1], ttl)
end
return {'applied', current}
"#;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for task invocations
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Prefix of the per-job record keys
    pub key_prefix: String,
    /// Retention of terminal records
    pub result_ttl: Duration,
    /// Upper bound for a dispatch round trip
    pub dispatch_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "swath:tasks".to_string(),
            consumer_group: "swath:workers".to_string(),
            key_prefix: "swath:task-meta:".to_string(),
            result_ttl: Duration::from_secs(3600),
            dispatch_timeout: Duration::from_millis(5000),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    ///
    /// `REDIS_URL` wins; otherwise the URL is built from `REDIS_HOST` and
    /// `REDIS_PORT`, defaulting to a local instance.
    pub fn from_env() -> Self {
        let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| {
            let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
            let port = std::env::var("REDIS_PORT")
                .ok()
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(6379);
            format!("redis://{}:{}", host, port)
        });

        Self {
            redis_url,
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or_else(|_| "swath:tasks".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "swath:workers".to_string()),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX")
                .unwrap_or_else(|_| "swath:task-meta:".to_string()),
            result_ttl: Duration::from_secs(
                std::env::var("QUEUE_RESULT_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            dispatch_timeout: Duration::from_millis(
                std::env::var("QUEUE_DISPATCH_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5000),
            ),
        }
    }

    /// Record key of a job.
    pub fn record_key(&self, job_id: &JobId) -> String {
        format!("{}{}", self.key_prefix, job_id)
    }
}

/// Redis-backed task store.
pub struct RedisTaskStore {
    client: redis::Client,
    config: QueueConfig,
    dispatch_script: Script,
    transition_script: Script,
}

impl RedisTaskStore {
    /// Create a new store. No connection is made until first use.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            dispatch_script: Script::new(DISPATCH_SCRIPT),
            transition_script: Script::new(TRANSITION_SCRIPT),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = redis::cmd("XLEN")
            .arg(&self.config.stream_name)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    fn job_id_from_key(&self, key: &str) -> Option<JobId> {
        key.strip_prefix(&self.config.key_prefix)
            .filter(|id| !id.is_empty())
            .map(JobId::from)
    }

    /// Parse stream entries, acking the ones that cannot be parsed.
    async fn parse_entries(&self, entries: Vec<StreamId>) -> Vec<Delivery> {
        let mut deliveries = Vec::new();

        for entry in entries {
            let delivery_id = entry.id.clone();
            let payload = match entry.map.get("job") {
                Some(redis::Value::BulkString(payload)) => String::from_utf8_lossy(payload).into_owned(),
                _ => {
                    warn!("Stream entry {} has no job payload", delivery_id);
                    self.ack(&delivery_id).await.ok();
                    continue;
                }
            };

            match serde_json::from_str::<TaskInvocation>(&payload) {
                Ok(invocation) => {
                    debug!("Consumed job {} from stream", invocation.job_id);
                    deliveries.push(Delivery {
                        delivery_id,
                        invocation,
                    });
                }
                Err(e) => {
                    warn!("Failed to parse job payload {}: {}", delivery_id, e);
                    // Ack the malformed message to prevent reprocessing
                    self.ack(&delivery_id).await.ok();
                }
            }
        }

        deliveries
    }
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn dispatch(&self, invocation: &TaskInvocation) -> QueueResult<DispatchOutcome> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(invocation)?;

        let mut call = self.dispatch_script.prepare_invoke();
        call.key(self.config.record_key(&invocation.job_id))
            .key(&self.config.stream_name)
            .arg(invocation.job_id.as_str())
            .arg(&payload);
        for (field, value) in invocation.initial_fields()? {
            call.arg(field).arg(value);
        }

        let created: i32 = call.invoke_async(&mut conn).await?;
        if created == 1 {
            info!(job_id = %invocation.job_id, "Dispatched task {}", invocation.task_name);
            Ok(DispatchOutcome::Dispatched)
        } else {
            warn!(job_id = %invocation.job_id, "Duplicate job rejected");
            Ok(DispatchOutcome::Duplicate)
        }
    }

    async fn fetch(&self, job_id: &JobId) -> QueueResult<Option<RawRecord>> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.config.record_key(job_id))
            .query_async(&mut conn)
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(RawRecord {
            job_id: job_id.clone(),
            fields,
        }))
    }

    async fn scan(&self) -> QueueResult<Vec<RawRecord>> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", self.config.key_prefix);

        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(job_id) = self.job_id_from_key(&key) else {
                warn!("Skipping store key without job id: {}", key);
                continue;
            };
            let fields: Result<HashMap<String, String>, redis::RedisError> =
                redis::cmd("HGETALL").arg(&key).query_async(&mut conn).await;
            match fields {
                // Expired between SCAN and HGETALL
                Ok(fields) if fields.is_empty() => continue,
                Ok(fields) => records.push(RawRecord { job_id, fields }),
                Err(e) => warn!(job_id = %job_id, "Skipping unreadable store entry {}: {}", key, e),
            }
        }

        Ok(records)
    }

    async fn transition(&self, job_id: &JobId, update: &TaskUpdate) -> QueueResult<Transition> {
        let mut conn = self.connection().await?;

        let ttl = if update.state.is_terminal() {
            self.config.result_ttl.as_secs()
        } else {
            0
        };

        let mut call = self.transition_script.prepare_invoke();
        call.key(self.config.record_key(job_id))
            .arg(update.state.as_str())
            .arg(ttl);
        for (field, value) in update.fields() {
            call.arg(field).arg(value);
        }

        let reply: Vec<String> = call.invoke_async(&mut conn).await?;
        match reply.as_slice() {
            [outcome, _] if outcome == "missing" => Ok(Transition::Missing),
            [outcome, status] if outcome == "malformed" => {
                Err(QueueError::malformed_record(job_id, status_reason(status)))
            }
            [outcome, previous] if outcome == "refused" || outcome == "applied" => {
                let previous: TaskState = previous
                    .parse()
                    .map_err(|e| QueueError::UnexpectedReply(format!("{}", e)))?;
                if outcome == "refused" {
                    Ok(Transition::Refused(previous))
                } else {
                    Ok(Transition::Applied(previous))
                }
            }
            other => Err(QueueError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    async fn consume(&self, consumer: &str, block: Duration, count: usize) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let entries = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();

        Ok(self.parse_entries(entries).await)
    }

    async fn claim_stale(&self, consumer: &str, min_idle: Duration, count: usize) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let stale: Vec<String> = pending
            .ids
            .into_iter()
            .filter(|p| p.consumer != consumer && p.last_delivered_ms as u64 >= min_idle_ms)
            .map(|p| p.id)
            .collect();

        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle_ms)
            .arg(&stale)
            .query_async(&mut conn)
            .await?;

        let deliveries = self.parse_entries(claimed.ids).await;
        if !deliveries.is_empty() {
            info!("Claimed {} stale deliveries", deliveries.len());
        }
        Ok(deliveries)
    }

    async fn ack(&self, delivery_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(delivery_id)
            .query_async::<()>(&mut conn)
            .await?;

        // Delete the message from the stream
        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(delivery_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged delivery: {}", delivery_id);
        Ok(())
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

//! Redis task store integration tests.

use std::sync::Arc;
use std::time::Duration;

use swath_models::{JobId, JobStatus, ProcessInputs, ResultEnvelope};
use redis::AsyncCommands;
use swath_queue::{
    DispatchOutcome, JobManager, QueueError, RedisTaskStore, TaskInvocation, TaskStore, TaskUpdate,
    Transition,
};

async fn store() -> RedisTaskStore {
    dotenvy::dotenv().ok();
    let store = RedisTaskStore::from_env().expect("Failed to create store");
    store.init().await.expect("Failed to initialize store");
    store
}

fn invocation(job_id: &JobId) -> TaskInvocation {
    TaskInvocation::new(
        "process-netcdf",
        job_id.clone(),
        ProcessInputs::new("noaa19-avhrr-20230113072221-20230113073600.nc"),
    )
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_connection() {
    let store = store().await;
    store.ping().await.expect("Failed to ping");

    let len = store.len().await.expect("Failed to get stream length");
    println!("Stream length: {}", len);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_dispatch_consume_ack() {
    let store = store().await;
    let job_id = JobId::new();

    let outcome = store.dispatch(&invocation(&job_id)).await.expect("Failed to dispatch");
    assert_eq!(outcome, DispatchOutcome::Dispatched);

    let again = store.dispatch(&invocation(&job_id)).await.expect("Failed to dispatch");
    assert_eq!(again, DispatchOutcome::Duplicate);

    // Other tests may share the stream, so drain until our job shows up
    let mut found = None;
    for _ in 0..10 {
        let batch = store
            .consume("test-consumer", Duration::from_millis(500), 10)
            .await
            .expect("Failed to consume");
        for delivery in batch {
            store.ack(&delivery.delivery_id).await.expect("Failed to ack");
            if delivery.invocation.job_id == job_id {
                found = Some(delivery);
            }
        }
        if found.is_some() {
            break;
        }
    }
    let delivery = found.expect("dispatched job was not consumed");
    assert_eq!(delivery.invocation.task_name, "process-netcdf");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_terminal_state_is_sticky() {
    let store = store().await;
    let job_id = JobId::new();
    store.dispatch(&invocation(&job_id)).await.expect("Failed to dispatch");

    let started = store
        .transition(&job_id, &TaskUpdate::started())
        .await
        .expect("Failed to transition");
    assert!(started.is_applied());

    store
        .transition(&job_id, &TaskUpdate::revoked())
        .await
        .expect("Failed to revoke");

    let late = store
        .transition(
            &job_id,
            &TaskUpdate::succeeded(&ResultEnvelope::new("image/png", vec![1, 2, 3])),
        )
        .await
        .expect("Failed to transition");
    assert!(matches!(late, Transition::Refused(_)));
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_record_without_status_is_malformed() {
    let store = store().await;
    let job_id = JobId::new();
    let key = store.config().record_key(&job_id);

    let client = redis::Client::open(store.config().redis_url.as_str()).expect("Failed to open client");
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("Failed to connect");
    let _: () = conn
        .hset(&key, "task_name", "process-netcdf")
        .await
        .expect("Failed to write record");

    let err = store
        .transition(&job_id, &TaskUpdate::started())
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::MalformedRecord { .. }));

    let status: Option<String> = conn.hget(&key, "status").await.expect("Failed to read");
    assert_eq!(status, None);
    let _: () = conn.del(&key).await.expect("Failed to clean up");

    let missing = store
        .transition(&JobId::new(), &TaskUpdate::started())
        .await
        .expect("Failed to transition");
    assert_eq!(missing, Transition::Missing);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_manager_round_trip() {
    let store = Arc::new(store().await);
    let manager = JobManager::new(store.clone(), Duration::from_secs(5));
    let job_id = JobId::new();

    manager
        .submit("process-netcdf", &job_id, &invocation(&job_id).inputs)
        .await
        .expect("Failed to submit");
    assert_eq!(
        manager.get_job(&job_id).await.expect("Failed to get job").status,
        JobStatus::Accepted
    );

    let payload: Vec<u8> = (0..(1024 * 1024 + 5)).map(|i| (i % 256) as u8).collect();
    let envelope = ResultEnvelope::new("image/png", payload);
    store
        .transition(&job_id, &TaskUpdate::succeeded(&envelope))
        .await
        .expect("Failed to store result");

    let result = manager.get_job_result(&job_id).await.expect("Failed to get result");
    assert_eq!(result, envelope);

    let listed = manager
        .list_jobs(Some(JobStatus::Successful))
        .await
        .expect("Failed to list jobs");
    assert!(listed.iter().any(|j| j.identifier == job_id));
}

//! Application state.

use std::sync::Arc;
use std::time::Duration;

use swath_queue::{JobManager, QueueResult, RedisTaskStore, TaskStore};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn TaskStore>,
    pub manager: JobManager,
}

impl AppState {
    pub fn new(config: ApiConfig, store: Arc<dyn TaskStore>, dispatch_timeout: Duration) -> Self {
        let manager = JobManager::new(Arc::clone(&store), dispatch_timeout);
        Self {
            config,
            store,
            manager,
        }
    }

    /// Create state backed by the Redis store described by the environment.
    pub async fn from_env(config: ApiConfig) -> QueueResult<Self> {
        let store = RedisTaskStore::from_env()?;
        store.init().await?;
        let dispatch_timeout = store.config().dispatch_timeout;
        Ok(Self::new(config, Arc::new(store), dispatch_timeout))
    }
}

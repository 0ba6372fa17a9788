//! Axum HTTP API for swath processing jobs.
//!
//! This crate provides:
//! - Process description and asynchronous execution endpoints
//! - Job status, result retrieval and dismissal
//! - Health/readiness probes and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

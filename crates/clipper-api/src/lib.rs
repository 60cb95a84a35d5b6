//! Axum HTTP API server for the clipper service.
//!
//! This crate provides:
//! - Clip submission (blocking `/clip` and polled `/jobs`)
//! - Streaming downloads of published clips
//! - CORS, rate limiting and security headers
//! - Prometheus metrics

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

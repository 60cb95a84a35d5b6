//! Service status handlers.

use axum::Json;
use chrono::Utc;
use serde::Serialize;

/// Root status response.
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub endpoints: String,
    pub timestamp: String,
}

/// Service banner listing the public endpoints.
pub async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "Video Clipper Server is running".to_string(),
        endpoints: "Available: /clip (POST), /jobs (POST), /jobs/:job_id (GET), /download/* (GET)".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

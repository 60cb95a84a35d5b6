//! Blocking clip endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;

use clipper_models::{ClipRequest, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipResponse {
    pub download_url: String,
}

/// Decode a clip request body.
///
/// The body is read as raw bytes so clients that omit `Content-Type` are
/// still served.
pub fn parse_clip_request(body: &[u8]) -> ApiResult<ClipRequest> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))
}

/// Submit a clip and wait for it to finish.
///
/// The job belongs to the dispatcher, so it keeps running if the client goes
/// away before the response is written.
pub async fn clip(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ClipResponse>> {
    let request = parse_clip_request(&body)?;
    let handle = state.dispatcher.submit(request).await?;
    let job_id = handle.id().clone();

    let result = handle.wait().await;
    match (result.status, result.locator.as_ref(), result.error.as_ref()) {
        (JobStatus::Succeeded, Some(locator), _) => {
            let download_url = locator.url(&state.config.base_url);
            info!(job_id = %job_id, url = %download_url, "Clip ready");
            Ok(Json(ClipResponse { download_url }))
        }
        (_, _, Some(error)) => Err(ApiError::from_job_error(error)),
        (status, _, _) => Err(ApiError::internal(format!("Job {} ended in state {}", job_id, status))),
    }
}

//! Submit-then-poll job endpoints.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use clipper_models::{ErrorKind, JobId, JobResult, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::handlers::clip::parse_clip_request;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: String,
    pub status: JobStatus,
    pub status_url: String,
}

#[derive(Debug, Serialize)]
pub struct JobErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorBody>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobStatusResponse {
    /// Public view of a job. Error details are reduced to the kind and a
    /// generic message.
    pub fn from_result(result: &JobResult, base_url: &str) -> Self {
        Self {
            job_id: result.job_id.to_string(),
            status: result.status,
            download_url: match result.status {
                JobStatus::Succeeded => result.locator.as_ref().map(|l| l.url(base_url)),
                _ => None,
            },
            error: result.error.as_ref().map(|e| JobErrorBody {
                kind: e.kind,
                message: e.kind.public_message().to_string(),
            }),
            created_at: result.created_at.to_rfc3339(),
            updated_at: result.updated_at.to_rfc3339(),
        }
    }
}

/// Submit a clip job and return immediately.
pub async fn submit_job(State(state): State<AppState>, body: Bytes) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let request = parse_clip_request(&body)?;
    let handle = state.dispatcher.submit(request).await?;
    let job_id = handle.id().to_string();

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            status_url: state.config.public_url(&format!("/jobs/{}", job_id)),
            status: handle.current().status,
            job_id,
        }),
    ))
}

/// Current status of a job.
pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<JobStatusResponse>> {
    let result = state
        .dispatcher
        .status(&JobId::from_string(job_id.as_str()))
        .await
        .ok_or_else(|| ApiError::not_found(format!("Job {} not found", job_id)))?;

    Ok(Json(JobStatusResponse::from_result(&result, &state.config.base_url)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipper_models::{DownloadLocator, JobError};

    #[test]
    fn test_status_response_for_success() {
        let mut result = JobResult::pending(JobId::from_string("7-abcd1234"));
        result.advance(JobStatus::Downloading).unwrap();
        result.advance(JobStatus::Trimming).unwrap();
        result
            .succeed("/tmp/clipped_7-abcd1234.mp4", DownloadLocator::for_file("clipped_7-abcd1234.mp4"))
            .unwrap();

        let response = JobStatusResponse::from_result(&result, "http://localhost:9000/");
        assert_eq!(
            response.download_url.as_deref(),
            Some("http://localhost:9000/download/clipped_7-abcd1234.mp4")
        );
        assert!(response.error.is_none());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["jobId"], "7-abcd1234");
        assert_eq!(json["status"], "succeeded");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_status_response_hides_failure_details() {
        let mut result = JobResult::pending(JobId::from_string("8-abcd1234"));
        result.advance(JobStatus::Downloading).unwrap();
        result
            .fail(JobError::new(ErrorKind::DownloadFailed, "yt-dlp exited with non-zero status 1"))
            .unwrap();

        let json = serde_json::to_value(JobStatusResponse::from_result(&result, "http://x")).unwrap();
        assert_eq!(json["error"]["kind"], "download_failed");
        assert_eq!(json["error"]["message"], "Error downloading the video");
        assert!(json.get("downloadUrl").is_none());
    }
}

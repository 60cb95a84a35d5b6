//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use clipper_models::{ErrorKind, JobError};
use clipper_worker::{DispatchError, PublishError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// A job ended in `Failed`; only the generic message is exposed.
    #[error("{}", .0.public_message())]
    JobFailed(ErrorKind),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Map a job's failure onto the public error taxonomy.
    pub fn from_job_error(error: &JobError) -> Self {
        match error.kind {
            ErrorKind::InvalidInput => Self::BadRequest(error.message.clone()),
            ErrorKind::NotFound => Self::NotFound(error.message.clone()),
            kind => Self::JobFailed(kind),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::JobFailed(kind) => status_for_kind(*kind),
        }
    }

    fn code(&self) -> Option<String> {
        match self {
            ApiError::JobFailed(kind) => Some(kind.as_str().to_string()),
            ApiError::BadRequest(_) => Some(ErrorKind::InvalidInput.as_str().to_string()),
            ApiError::NotFound(_) => Some(ErrorKind::NotFound.as_str().to_string()),
            _ => None,
        }
    }
}

/// HTTP status for a job error kind.
pub fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::DirectoryError | ErrorKind::DownloadFailed | ErrorKind::TrimFailed => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::InvalidInput(v) => ApiError::BadRequest(v.to_string()),
            DispatchError::QueueFull(_) | DispatchError::ShuttingDown => ApiError::Unavailable(e.to_string()),
            DispatchError::Duplicate(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<PublishError> for ApiError {
    fn from(e: PublishError) -> Self {
        match e {
            PublishError::NotFound(_) | PublishError::NotSucceeded(_) => ApiError::NotFound("File not found".to_string()),
            PublishError::Io(_) => ApiError::Internal(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details go to the log, never to the client
        let detail = match &self {
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            detail,
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipper_models::ValidationError;

    #[test]
    fn test_dispatch_error_mapping() {
        let invalid: ApiError = DispatchError::InvalidInput(ValidationError::MissingUrl).into();
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let full: ApiError = DispatchError::QueueFull(4).into();
        assert_eq!(full.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let closing: ApiError = DispatchError::ShuttingDown.into();
        assert_eq!(closing.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_job_failures_hide_tool_output() {
        let error = JobError::new(ErrorKind::DownloadFailed, "yt-dlp exited with non-zero status 1")
            .with_tool_output(Some("ERROR: secret".to_string()));
        let api = ApiError::from_job_error(&error);

        assert_eq!(api.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.to_string(), "Error downloading the video");
        assert_eq!(api.code().as_deref(), Some("download_failed"));
    }

    #[tokio::test]
    async fn test_internal_details_not_exposed() {
        let response = ApiError::internal("/srv/clipper/download: permission denied").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "An internal error occurred");
        assert!(!body.windows(b"permission".len()).any(|w| w == b"permission"));
    }

    #[test]
    fn test_kind_status_mapping() {
        assert_eq!(status_for_kind(ErrorKind::TrimFailed), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for_kind(ErrorKind::DirectoryError), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for_kind(ErrorKind::Cancelled), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for_kind(ErrorKind::NotFound), StatusCode::NOT_FOUND);
    }
}

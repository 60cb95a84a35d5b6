//! Clip download endpoint.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Response};
use futures_util::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Stream a published clip as an attachment.
///
/// The artifact lease moves into the body stream, so the file cannot be swept
/// until the response has been fully sent or dropped.
pub async fn download(State(state): State<AppState>, Path(file_name): Path<String>) -> ApiResult<Response<Body>> {
    let lease = state.publisher.open(&file_name).await?;

    let file = tokio::fs::File::open(lease.path()).await.map_err(|e| {
        warn!(file = %file_name, "Failed to open published clip: {}", e);
        ApiError::not_found("File not found")
    })?;
    let length = file.metadata().await.ok().map(|m| m.len());
    debug!(job_id = %lease.job_id(), file = %file_name, "Serving clip");

    let stream = ReaderStream::new(file).map(move |chunk| {
        let _held = &lease;
        chunk
    });

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type_for(&file_name))
        .header(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_str(&format!("attachment; filename={}", file_name))
                .map_err(|_| ApiError::not_found("File not found"))?,
        );
    if let Some(length) = length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    builder
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::internal(e.to_string()))
}

fn content_type_for(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next().map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        _ => "application/octet-stream",
    }
}

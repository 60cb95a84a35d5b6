//! Job status, results and the pipeline state machine.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::JobId;

/// Pipeline state of a clip job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker slot
    #[default]
    Pending,
    /// Fetch tool is running
    Downloading,
    /// Trim tool is running
    Trimming,
    /// Clip is published and downloadable
    Succeeded,
    /// Pipeline stopped with an error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Trimming => "trimming",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Whether the pipeline may move from `self` to `next`.
    ///
    /// Stages are never skipped. `Pending -> Failed` covers precondition
    /// failures and cancellation before the job was admitted.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Downloading)
                | (Downloading, Trimming)
                | (Trimming, Succeeded)
                | (Pending, Failed)
                | (Downloading, Failed)
                | (Trimming, Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of a job or request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    DirectoryError,
    DownloadFailed,
    TrimFailed,
    NotFound,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::DirectoryError => "directory_error",
            ErrorKind::DownloadFailed => "download_failed",
            ErrorKind::TrimFailed => "trim_failed",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Message safe to show to clients. Never includes paths or tool output.
    pub fn public_message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "Missing or invalid request fields",
            ErrorKind::DirectoryError => "Failed to create download directory",
            ErrorKind::DownloadFailed => "Error downloading the video",
            ErrorKind::TrimFailed => "Error clipping the video",
            ErrorKind::NotFound => "Not found",
            ErrorKind::Cancelled => "Job was cancelled before it started",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure details attached to a `Failed` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
    /// Raw combined output of the failing tool. Kept for logs only.
    #[serde(skip)]
    pub tool_output: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            tool_output: None,
            timed_out: false,
        }
    }

    pub fn with_tool_output(mut self, output: Option<String>) -> Self {
        self.tool_output = output;
        self
    }

    pub fn timed_out(mut self, timed_out: bool) -> Self {
        self.timed_out = timed_out;
        self
    }
}

/// Where a published clip can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLocator {
    pub file_name: String,
    /// Server-relative path, e.g. `/download/clipped_<id>.mp4`
    pub path: String,
}

impl DownloadLocator {
    pub const ROUTE_PREFIX: &'static str = "/download";

    pub fn for_file(file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let path = format!("{}/{}", Self::ROUTE_PREFIX, file_name);
        Self { file_name, path }
    }

    /// Absolute URL under `base_url`.
    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path)
    }
}

/// Rejected state machine move.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Observable state of one job.
///
/// Only the runner that owns the job mutates it; everyone else reads
/// snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<DownloadLocator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobResult {
    /// A freshly submitted job.
    pub fn pending(job_id: JobId) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            status: JobStatus::Pending,
            output_path: None,
            locator: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to a non-terminal stage.
    pub fn advance(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if next.is_terminal() {
            return Err(TransitionError { from: self.status, to: next });
        }
        self.transition(next)
    }

    /// Mark the job succeeded with its published artifact.
    pub fn succeed(
        &mut self,
        output_path: impl AsRef<Path>,
        locator: DownloadLocator,
    ) -> Result<(), TransitionError> {
        self.transition(JobStatus::Succeeded)?;
        self.output_path = Some(output_path.as_ref().to_path_buf());
        self.locator = Some(locator);
        Ok(())
    }

    /// Mark the job failed.
    pub fn fail(&mut self, error: JobError) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    /// Externally visible artifact path; only present once succeeded.
    pub fn published_output(&self) -> Option<&Path> {
        match self.status {
            JobStatus::Succeeded => self.output_path.as_deref(),
            _ => None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError { from: self.status, to: next });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

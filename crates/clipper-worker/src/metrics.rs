//! Job pipeline metrics.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use clipper_models::ErrorKind;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "clipper_jobs_submitted_total";
    pub const JOBS_REJECTED_TOTAL: &str = "clipper_jobs_rejected_total";
    pub const JOBS_SUCCEEDED_TOTAL: &str = "clipper_jobs_succeeded_total";
    pub const JOBS_FAILED_TOTAL: &str = "clipper_jobs_failed_total";
    pub const JOBS_QUEUED: &str = "clipper_jobs_queued";
    pub const JOBS_RUNNING: &str = "clipper_jobs_running";
    pub const JOB_DURATION_SECONDS: &str = "clipper_job_duration_seconds";
    pub const TOOL_DURATION_SECONDS: &str = "clipper_tool_duration_seconds";
    pub const ARTIFACTS_PUBLISHED: &str = "clipper_artifacts_published";
    pub const ARTIFACTS_SWEPT_TOTAL: &str = "clipper_artifacts_swept_total";
}

pub fn record_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_rejected(reason: &'static str) {
    counter!(names::JOBS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_succeeded(duration: Duration) {
    counter!(names::JOBS_SUCCEEDED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "succeeded").record(duration.as_secs_f64());
}

pub fn record_failed(kind: ErrorKind, duration: Duration) {
    counter!(names::JOBS_FAILED_TOTAL, "kind" => kind.as_str()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "failed").record(duration.as_secs_f64());
}

/// Record one external tool run, successful or not.
pub fn record_tool(stage: &'static str, duration: Duration, success: bool) {
    histogram!(
        names::TOOL_DURATION_SECONDS,
        "stage" => stage,
        "success" => if success { "true" } else { "false" }
    )
    .record(duration.as_secs_f64());
}

pub fn set_queue_depth(queued: usize, running: usize) {
    gauge!(names::JOBS_QUEUED).set(queued as f64);
    gauge!(names::JOBS_RUNNING).set(running as f64);
}

pub fn set_published(count: usize) {
    gauge!(names::ARTIFACTS_PUBLISHED).set(count as f64);
}

pub fn record_swept(count: usize) {
    counter!(names::ARTIFACTS_SWEPT_TOTAL).increment(count as u64);
}

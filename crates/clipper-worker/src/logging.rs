//! Structured job logging utilities.
//!
//! Every state transition of a job is emitted as one event carrying the job
//! id, the new state, time spent in the previous state and the outcome.

use std::time::{Duration, Instant};

use tracing::{error, info, warn, Span};

use clipper_models::{JobId, JobStatus};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
    started: Instant,
    stage_started: Instant,
}

impl JobLogger {
    /// Create a new job logger for a specific job and operation.
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        let now = Instant::now();
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
            started: now,
            stage_started: now,
        }
    }

    /// Log a transition into `state` and restart the stage clock.
    ///
    /// Returns how long the previous stage took.
    pub fn log_transition(&mut self, state: JobStatus, outcome: &str) -> Duration {
        let stage = self.stage_started.elapsed();
        self.stage_started = Instant::now();

        let total_ms = self.started.elapsed().as_millis() as u64;
        match state {
            JobStatus::Failed => error!(
                job_id = %self.job_id,
                operation = %self.operation,
                state = %state,
                duration_ms = stage.as_millis() as u64,
                total_ms = total_ms,
                outcome = %outcome,
                "Job state changed"
            ),
            _ => info!(
                job_id = %self.job_id,
                operation = %self.operation,
                state = %state,
                duration_ms = stage.as_millis() as u64,
                total_ms = total_ms,
                outcome = %outcome,
                "Job state changed"
            ),
        }
        stage
    }

    /// Log raw tool output attached to a failure.
    pub fn log_tool_output(&self, tool: &str, output: &str) {
        if output.is_empty() {
            return;
        }
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            tool = %tool,
            "Tool output:\n{}", output
        );
    }

    /// Log a warning during job execution.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    /// Time since the job started running.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Get the job ID.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Get the operation type.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}

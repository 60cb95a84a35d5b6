//! Job runner: the download → trim → publish pipeline for one job.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs;
use tokio::sync::watch;
use tracing::debug;

use clipper_media::{FetchCommand, MediaError, MediaResult, ToolInvocation, ToolInvoker, ToolOutput, TrimCommand};
use clipper_models::{
    DownloadLocator, ErrorKind, JobDescriptor, JobError, JobResult, JobStatus,
};

use crate::config::WorkerConfig;
use crate::logging::JobLogger;
use crate::metrics;
use crate::publisher::ResultPublisher;

/// Tool settings a runner needs.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub download_dir: std::path::PathBuf,
    pub fetch_program: String,
    pub fetch_extra_args: Vec<String>,
    pub trim_program: String,
    pub download_timeout: Duration,
    pub trim_timeout: Duration,
}

impl From<&WorkerConfig> for RunnerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            download_dir: config.download_dir.clone(),
            fetch_program: config.fetch_program.clone(),
            fetch_extra_args: config.fetch_extra_args.clone(),
            trim_program: config.trim_program.clone(),
            download_timeout: config.download_timeout,
            trim_timeout: config.trim_timeout,
        }
    }
}

/// Executes the two-stage pipeline for a job.
///
/// The runner is the only writer of a job's status: every transition is
/// pushed through the job's `watch` channel.
pub struct JobRunner {
    tools: Arc<dyn ToolInvoker>,
    publisher: Arc<ResultPublisher>,
    settings: RunnerSettings,
}

impl JobRunner {
    pub fn new(settings: RunnerSettings, tools: Arc<dyn ToolInvoker>, publisher: Arc<ResultPublisher>) -> Self {
        Self {
            tools,
            publisher,
            settings,
        }
    }

    /// Run `job` to a terminal state and return the final result.
    pub async fn run(&self, job: &JobDescriptor, status: &watch::Sender<JobResult>) -> JobResult {
        let mut logger = JobLogger::new(job.id(), "clip");
        let mut result = status.borrow().clone();
        if result.status != JobStatus::Pending {
            logger.log_warning(&format!("refusing to run job in state {}", result.status));
            return result;
        }

        if let Err(e) = fs::create_dir_all(&self.settings.download_dir).await {
            let error = JobError::new(
                ErrorKind::DirectoryError,
                format!("cannot create {}: {}", self.settings.download_dir.display(), e),
            );
            return self.finish_failed(result, status, &mut logger, error);
        }

        // Stage 1: fetch
        let range = job.range().to_string();
        self.enter(&mut result, status, &mut logger, JobStatus::Downloading, &range);
        let fetch = FetchCommand::new(job.source_url(), job.download_path())
            .extra_args(self.settings.fetch_extra_args.iter().cloned())
            .into_invocation(&self.settings.fetch_program, self.settings.download_timeout);
        if let Err(e) = self.invoke_stage("download", &fetch).await {
            let error = stage_error(ErrorKind::DownloadFailed, &e);
            logger.log_tool_output(&self.settings.fetch_program, e.output().unwrap_or_default());
            return self.finish_failed(result, status, &mut logger, error);
        }

        // Stage 2: trim (stream copy)
        self.enter(&mut result, status, &mut logger, JobStatus::Trimming, "downloaded");
        let trim = TrimCommand::new(job.download_path(), job.output_path())
            .range(job.range())
            .into_invocation(&self.settings.trim_program, self.settings.trim_timeout);
        if let Err(e) = self.invoke_stage("trim", &trim).await {
            let error = stage_error(ErrorKind::TrimFailed, &e);
            logger.log_tool_output(&self.settings.trim_program, e.output().unwrap_or_default());
            return self.finish_failed(result, status, &mut logger, error);
        }
        if let Err(reason) = verify_output(job).await {
            let error = JobError::new(ErrorKind::TrimFailed, reason);
            return self.finish_failed(result, status, &mut logger, error);
        }

        // Publish before announcing success so `Succeeded` always means downloadable.
        let file_name = job
            .output_path()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut done = result.clone();
        if let Err(e) = done.succeed(job.output_path(), DownloadLocator::for_file(file_name)) {
            let error = JobError::new(ErrorKind::TrimFailed, e.to_string());
            return self.finish_failed(result, status, &mut logger, error);
        }
        if let Err(e) = self.publisher.publish(&done).await {
            let error = JobError::new(ErrorKind::TrimFailed, e.to_string());
            return self.finish_failed(result, status, &mut logger, error);
        }

        status.send_replace(done.clone());
        logger.log_transition(JobStatus::Succeeded, "published");
        metrics::record_succeeded(logger.elapsed());

        if let Err(e) = fs::remove_file(job.download_path()).await {
            logger.log_warning(&format!("failed to remove source download: {}", e));
        }

        done
    }

    fn enter(
        &self,
        result: &mut JobResult,
        status: &watch::Sender<JobResult>,
        logger: &mut JobLogger,
        next: JobStatus,
        outcome: &str,
    ) {
        match result.advance(next) {
            Ok(()) => {
                status.send_replace(result.clone());
                logger.log_transition(next, outcome);
            }
            Err(e) => logger.log_warning(&e.to_string()),
        }
    }

    fn finish_failed(
        &self,
        mut result: JobResult,
        status: &watch::Sender<JobResult>,
        logger: &mut JobLogger,
        error: JobError,
    ) -> JobResult {
        let kind = error.kind;
        let message = error.message.clone();
        match result.fail(error) {
            Ok(()) => {
                status.send_replace(result.clone());
                logger.log_transition(JobStatus::Failed, &format!("{}: {}", kind, message));
                metrics::record_failed(kind, logger.elapsed());
            }
            Err(e) => logger.log_warning(&e.to_string()),
        }
        result
    }

    async fn invoke_stage(&self, stage: &'static str, invocation: &ToolInvocation) -> Result<ToolOutput, MediaError> {
        let (outcome, elapsed) = timed_invoke(self.tools.as_ref(), invocation).await;
        metrics::record_tool(stage, elapsed, outcome.is_ok());
        match &outcome {
            Ok(output) => {
                debug!(stage = stage, elapsed_ms = elapsed.as_millis() as u64, "Tool output:\n{}", output.combined)
            }
            Err(e) => debug!(stage = stage, elapsed_ms = elapsed.as_millis() as u64, "Tool failed: {}", e),
        }
        outcome
    }
}

/// Wall time covers failed and timed-out runs too.
async fn timed_invoke(tools: &dyn ToolInvoker, invocation: &ToolInvocation) -> (MediaResult<ToolOutput>, Duration) {
    let started = Instant::now();
    let outcome = tools.invoke(invocation).await;
    (outcome, started.elapsed())
}

fn stage_error(kind: ErrorKind, error: &MediaError) -> JobError {
    JobError::new(kind, error.to_string())
        .with_tool_output(error.output().map(str::to_string))
        .timed_out(error.is_timeout())
}

/// A zero-byte or missing output is a failed trim, never a result.
async fn verify_output(job: &JobDescriptor) -> Result<(), String> {
    match fs::metadata(job.output_path()).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err("trim produced an empty file".to_string()),
        Err(_) => Err("trim produced no output file".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTools, Step};
    use clipper_models::{ClipRequest, DescriptorPolicy, JobId};
    use tempfile::TempDir;

    fn setup(dir: &TempDir, tools: FakeTools) -> (JobRunner, Arc<FakeTools>, Arc<ResultPublisher>) {
        let tools = Arc::new(tools);
        let publisher = Arc::new(ResultPublisher::new(dir.path(), Duration::from_secs(3600)));
        let settings = RunnerSettings {
            download_dir: dir.path().to_path_buf(),
            fetch_program: "fake-fetch".to_string(),
            fetch_extra_args: Vec::new(),
            trim_program: "fake-trim".to_string(),
            download_timeout: Duration::from_secs(5),
            trim_timeout: Duration::from_secs(5),
        };
        let runner = JobRunner::new(settings, tools.clone(), publisher.clone());
        (runner, tools, publisher)
    }

    fn descriptor(dir: &TempDir, start: Option<&str>, end: Option<&str>) -> JobDescriptor {
        let policy = DescriptorPolicy {
            download_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        ClipRequest::new("https://x.com/a/status/5")
            .with_range(start, end)
            .into_descriptor(&policy)
            .unwrap()
    }

    fn channel(job: &JobDescriptor) -> (watch::Sender<JobResult>, watch::Receiver<JobResult>) {
        watch::channel(JobResult::pending(job.id().clone()))
    }

    #[tokio::test]
    async fn test_successful_pipeline() {
        let dir = TempDir::new().unwrap();
        let (runner, tools, publisher) = setup(&dir, FakeTools::new(Step::Succeed, Step::Succeed));
        let job = descriptor(&dir, Some("00:00:05"), Some("00:00:10"));
        let (tx, rx) = channel(&job);

        let result = runner.run(&job, &tx).await;

        assert_eq!(result.status, JobStatus::Succeeded);
        assert_eq!(result.published_output(), Some(job.output_path()));
        assert_eq!(*rx.borrow(), result);
        assert_eq!(tools.stages(), vec!["fetch", "trim"]);

        let fetch_args = tools.args_of("fetch");
        assert_eq!(fetch_args.last().unwrap(), "https://twitter.com/a/status/5");
        let trim_args = tools.args_of("trim");
        assert!(trim_args.windows(2).any(|w| w[0] == "-ss" && w[1] == "00:00:05"));
        assert!(trim_args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));

        let file_name = result.locator.unwrap().file_name;
        assert!(publisher.open(&file_name).await.is_ok());
        assert!(!job.download_path().exists(), "source download should be cleaned up");
    }

    #[tokio::test]
    async fn test_download_failure_skips_trim() {
        let dir = TempDir::new().unwrap();
        let (runner, tools, publisher) = setup(&dir, FakeTools::new(Step::Fail, Step::Succeed));
        let job = descriptor(&dir, None, None);
        let (tx, _rx) = channel(&job);

        let result = runner.run(&job, &tx).await;

        assert_eq!(result.status, JobStatus::Failed);
        let error = result.error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::DownloadFailed);
        assert!(error.tool_output.as_deref().unwrap_or_default().contains("fake-fetch failed"));
        assert_eq!(tools.stages(), vec!["fetch"]);
        assert!(result.output_path.is_none());
        assert!(publisher.is_empty().await);
    }

    #[tokio::test]
    async fn test_download_timeout_is_download_failure() {
        let dir = TempDir::new().unwrap();
        let (runner, _tools, _publisher) = setup(&dir, FakeTools::new(Step::Timeout, Step::Succeed));
        let job = descriptor(&dir, None, None);
        let (tx, _rx) = channel(&job);

        let result = runner.run(&job, &tx).await;

        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::DownloadFailed);
        assert!(error.timed_out);
    }

    #[tokio::test]
    async fn test_trim_failure_exposes_no_artifact() {
        let dir = TempDir::new().unwrap();
        let (runner, _tools, publisher) = setup(&dir, FakeTools::new(Step::Succeed, Step::FailWithPartial));
        let job = descriptor(&dir, Some("00:00:10"), None);
        let (tx, _rx) = channel(&job);

        let result = runner.run(&job, &tx).await;

        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::TrimFailed);
        assert!(result.published_output().is_none());
        // Partial output and source stay on disk for inspection but are not served.
        assert!(job.output_path().exists());
        assert!(job.download_path().exists());
        let name = job.output_path().file_name().unwrap().to_string_lossy().to_string();
        assert!(publisher.open(&name).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_trim_output_rejected() {
        let dir = TempDir::new().unwrap();
        let (runner, _tools, publisher) = setup(&dir, FakeTools::new(Step::Succeed, Step::SucceedEmpty));
        let job = descriptor(&dir, None, None);
        let (tx, _rx) = channel(&job);

        let result = runner.run(&job, &tx).await;

        assert_eq!(result.error.unwrap().kind, ErrorKind::TrimFailed);
        assert!(publisher.is_empty().await);
    }

    #[tokio::test]
    async fn test_directory_failure_runs_no_tools() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").await.unwrap();

        let tools = Arc::new(FakeTools::new(Step::Succeed, Step::Succeed));
        let publisher = Arc::new(ResultPublisher::new(&blocker, Duration::from_secs(60)));
        let settings = RunnerSettings {
            download_dir: blocker.join("download"),
            fetch_program: "fake-fetch".to_string(),
            fetch_extra_args: Vec::new(),
            trim_program: "fake-trim".to_string(),
            download_timeout: Duration::from_secs(5),
            trim_timeout: Duration::from_secs(5),
        };
        let runner = JobRunner::new(settings, tools.clone(), publisher);
        let job = descriptor(&dir, None, None);
        let (tx, _rx) = channel(&job);

        let result = runner.run(&job, &tx).await;

        assert_eq!(result.error.unwrap().kind, ErrorKind::DirectoryError);
        assert!(tools.stages().is_empty());
    }

    #[tokio::test]
    async fn test_failed_tool_runs_are_timed() {
        let delay = Duration::from_millis(25);
        let invocation = ToolInvocation::new("fake-fetch", Duration::from_secs(5));

        let failing = FakeTools::new(Step::Fail, Step::Succeed).with_delay(delay);
        let (outcome, elapsed) = timed_invoke(&failing, &invocation).await;
        assert!(outcome.is_err());
        assert!(elapsed >= delay);

        let timing_out = FakeTools::new(Step::Timeout, Step::Succeed).with_delay(delay);
        let (outcome, elapsed) = timed_invoke(&timing_out, &invocation).await;
        assert!(outcome.unwrap_err().is_timeout());
        assert!(elapsed >= delay);
    }

    #[tokio::test]
    async fn test_runner_refuses_non_pending_job() {
        let dir = TempDir::new().unwrap();
        let (runner, tools, _publisher) = setup(&dir, FakeTools::new(Step::Succeed, Step::Succeed));
        let job = descriptor(&dir, None, None);
        let mut started = JobResult::pending(JobId::from_string(job.id().as_str()));
        started.advance(JobStatus::Downloading).unwrap();
        let (tx, _rx) = watch::channel(started);

        let result = runner.run(&job, &tx).await;

        assert_eq!(result.status, JobStatus::Downloading);
        assert!(tools.stages().is_empty());
    }
}

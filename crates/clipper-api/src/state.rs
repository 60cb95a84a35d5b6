//! Application state.

use std::sync::Arc;

use clipper_media::{ProcessRunner, ToolInvoker};
use clipper_worker::{Dispatcher, JobRunner, ResultPublisher, RetentionService, RunnerSettings, WorkerConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub worker: Arc<WorkerConfig>,
    pub dispatcher: Arc<Dispatcher>,
    pub publisher: Arc<ResultPublisher>,
}

impl AppState {
    /// Create application state backed by real tool subprocesses.
    ///
    /// Starts the dispatch loop, so it must run inside a Tokio runtime.
    pub fn new(config: ApiConfig, worker: WorkerConfig) -> Self {
        Self::with_tools(config, worker, Arc::new(ProcessRunner::new()))
    }

    /// Create application state with a custom tool invoker.
    pub fn with_tools(config: ApiConfig, worker: WorkerConfig, tools: Arc<dyn ToolInvoker>) -> Self {
        let publisher = Arc::new(ResultPublisher::new(&worker.download_dir, worker.effective_ttl()));
        let runner = JobRunner::new(RunnerSettings::from(&worker), tools, Arc::clone(&publisher));
        let dispatcher = Arc::new(Dispatcher::new(&worker, runner));

        Self {
            config,
            worker: Arc::new(worker),
            dispatcher,
            publisher,
        }
    }

    /// Retention service over this state's publisher and dispatcher.
    pub fn retention_service(&self) -> RetentionService {
        RetentionService::new(
            Arc::clone(&self.publisher),
            Arc::clone(&self.dispatcher),
            self.worker.retention_interval,
        )
    }
}

//! Background retention service.
//!
//! Periodically removes expired clips and stale leftovers from the download
//! directory, and forgets finished job records after the same TTL.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::dispatcher::Dispatcher;
use crate::publisher::{ResultPublisher, SweepReport};

/// Outcome of one retention cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub sweep: SweepReport,
    pub pruned_jobs: usize,
}

/// Retention service.
pub struct RetentionService {
    publisher: Arc<ResultPublisher>,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
}

impl RetentionService {
    pub fn new(publisher: Arc<ResultPublisher>, dispatcher: Arc<Dispatcher>, interval: Duration) -> Self {
        Self {
            publisher,
            dispatcher,
            interval,
        }
    }

    /// Run until `shutdown` flips to `true`.
    ///
    /// Meant to be spawned as a background task.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting retention service (interval: {:?}, ttl: {:?})",
            self.interval,
            self.publisher.ttl()
        );

        let mut ticker = interval(self.interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }

        info!("Retention service stopped");
    }

    /// Run a single retention cycle.
    pub async fn run_once(&self) -> RetentionReport {
        let sweep = self.publisher.sweep().await;
        let pruned_jobs = self.dispatcher.prune_finished(self.publisher.ttl()).await;

        if sweep.removed() > 0 || sweep.leased > 0 || pruned_jobs > 0 {
            info!(
                expired = sweep.expired,
                orphans = sweep.orphans,
                leased = sweep.leased,
                pruned_jobs = pruned_jobs,
                "Retention cycle complete"
            );
        } else {
            debug!("Retention cycle found nothing to remove");
        }

        RetentionReport { sweep, pruned_jobs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::runner::{JobRunner, RunnerSettings};
    use crate::testing::FakeTools;
    use clipper_models::{ClipRequest, JobStatus};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cycle_removes_expired_clips_and_records() {
        let dir = TempDir::new().unwrap();
        let config = WorkerConfig {
            max_concurrent_jobs: 1,
            download_dir: dir.path().to_path_buf(),
            fetch_program: "fake-fetch".to_string(),
            trim_program: "fake-trim".to_string(),
            ..Default::default()
        };
        // Zero TTL so the finished job is immediately eligible.
        let publisher = Arc::new(ResultPublisher::new(dir.path(), Duration::ZERO));
        let runner = JobRunner::new(
            RunnerSettings::from(&config),
            Arc::new(FakeTools::succeeding()),
            publisher.clone(),
        );
        let dispatcher = Arc::new(Dispatcher::new(&config, runner));

        let handle = dispatcher
            .submit(ClipRequest::new("https://twitter.com/u/status/1"))
            .await
            .unwrap();
        let result = handle.wait().await;
        assert_eq!(result.status, JobStatus::Succeeded);
        let clip = result.output_path.unwrap();
        assert!(clip.exists());

        let service = RetentionService::new(publisher.clone(), dispatcher.clone(), Duration::from_secs(60));
        let report = service.run_once().await;

        assert_eq!(report.sweep.expired, 1);
        assert_eq!(report.pruned_jobs, 1);
        assert!(!clip.exists());
        assert_eq!(dispatcher.stats().await.tracked, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let config = WorkerConfig {
            download_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let publisher = Arc::new(ResultPublisher::new(dir.path(), Duration::from_secs(60)));
        let runner = JobRunner::new(
            RunnerSettings::from(&config),
            Arc::new(FakeTools::succeeding()),
            publisher.clone(),
        );
        let dispatcher = Arc::new(Dispatcher::new(&config, runner));
        let service = RetentionService::new(publisher, dispatcher, Duration::from_millis(10));

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(service.run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("retention loop should stop")
            .unwrap();
    }
}

//! Job dispatcher.
//!
//! Submissions go into a single FIFO channel. One dispatch loop pops them in
//! arrival order and hands each to a runner task once a worker slot (a
//! semaphore permit) is free, so at most `capacity` jobs are ever between
//! `Downloading` and their terminal state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use clipper_models::{ClipRequest, DescriptorPolicy, ErrorKind, JobDescriptor, JobError, JobId, JobResult};

use crate::config::WorkerConfig;
use crate::error::DispatchError;
use crate::logging::JobLogger;
use crate::metrics;
use crate::runner::JobRunner;

type StatusSender = Arc<watch::Sender<JobResult>>;

struct JobEntry {
    rx: watch::Receiver<JobResult>,
    tx: StatusSender,
    /// Set once by whoever gets the job first: the dispatch loop or `cancel`.
    claimed: Arc<AtomicBool>,
}

struct QueuedJob {
    job: JobDescriptor,
    tx: StatusSender,
    claimed: Arc<AtomicBool>,
}

/// Point-in-time dispatcher counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherStats {
    pub capacity: usize,
    pub queued: usize,
    pub running: usize,
    pub tracked: usize,
}

/// Handle to a submitted job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    rx: watch::Receiver<JobResult>,
}

impl JobHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Latest status snapshot.
    pub fn current(&self) -> JobResult {
        self.rx.borrow().clone()
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait(mut self) -> JobResult {
        if let Ok(result) = self.rx.wait_for(|r| r.is_terminal()).await {
            return result.clone();
        }
        // Sender gone: the last value is all there will ever be.
        self.rx.borrow().clone()
    }
}

/// Bounded FIFO job dispatcher.
pub struct Dispatcher {
    capacity: usize,
    max_queued: usize,
    policy: DescriptorPolicy,
    jobs: RwLock<HashMap<JobId, JobEntry>>,
    sender: Mutex<Option<mpsc::UnboundedSender<QueuedJob>>>,
    queued: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    semaphore: Arc<Semaphore>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Create a dispatcher and start its dispatch loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &WorkerConfig, runner: JobRunner) -> Self {
        let capacity = config.effective_capacity();
        let semaphore = Arc::new(Semaphore::new(capacity));
        let queued = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicUsize::new(0));
        let (sender, receiver) = mpsc::unbounded_channel();

        info!(
            "Starting dispatcher with {} worker slots and {} queue slots",
            capacity, config.max_queued_jobs
        );

        let dispatch_task = tokio::spawn(dispatch_loop(
            receiver,
            Arc::new(runner),
            Arc::clone(&semaphore),
            Arc::clone(&queued),
            Arc::clone(&running),
        ));

        Self {
            capacity,
            max_queued: config.max_queued_jobs,
            policy: config.descriptor_policy(),
            jobs: RwLock::new(HashMap::new()),
            sender: Mutex::new(Some(sender)),
            queued,
            running,
            semaphore,
            dispatch_task: Mutex::new(Some(dispatch_task)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> &DescriptorPolicy {
        &self.policy
    }

    /// Validate a request and enqueue it.
    pub async fn submit(&self, request: ClipRequest) -> Result<JobHandle, DispatchError> {
        if self.is_closed() {
            metrics::record_rejected("shutting_down");
            return Err(DispatchError::ShuttingDown);
        }
        let job = request.into_descriptor(&self.policy).map_err(|e| {
            metrics::record_rejected("invalid_input");
            DispatchError::from(e)
        })?;
        self.submit_descriptor(job).await
    }

    /// Enqueue an already validated descriptor.
    pub async fn submit_descriptor(&self, job: JobDescriptor) -> Result<JobHandle, DispatchError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job.id()) {
            metrics::record_rejected("duplicate");
            return Err(DispatchError::Duplicate(job.id().clone()));
        }

        let max_queued = self.max_queued;
        if self
            .queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |q| (q < max_queued).then_some(q + 1))
            .is_err()
        {
            metrics::record_rejected("queue_full");
            return Err(DispatchError::QueueFull(max_queued));
        }

        let id = job.id().clone();
        let (tx, rx) = watch::channel(JobResult::pending(id.clone()));
        let tx = Arc::new(tx);
        let claimed = Arc::new(AtomicBool::new(false));
        let queued_job = QueuedJob {
            job,
            tx: Arc::clone(&tx),
            claimed: Arc::clone(&claimed),
        };

        let sent = match self.sender.lock() {
            Ok(guard) => guard.as_ref().map(|s| s.send(queued_job).is_ok()).unwrap_or(false),
            Err(_) => false,
        };
        if !sent {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            metrics::record_rejected("shutting_down");
            return Err(DispatchError::ShuttingDown);
        }

        jobs.insert(
            id.clone(),
            JobEntry {
                rx: rx.clone(),
                tx,
                claimed,
            },
        );
        metrics::record_submitted();
        metrics::set_queue_depth(self.queued.load(Ordering::SeqCst), self.running.load(Ordering::SeqCst));
        debug!(job_id = %id, "Job queued");

        Ok(JobHandle { id, rx })
    }

    /// Current status of a job, if it is still tracked.
    pub async fn status(&self, id: &JobId) -> Option<JobResult> {
        self.jobs.read().await.get(id).map(|entry| entry.rx.borrow().clone())
    }

    /// Cancel a job that has not started yet.
    ///
    /// Returns `false` for unknown jobs and jobs a runner already picked up.
    pub async fn cancel(&self, id: &JobId) -> bool {
        let jobs = self.jobs.read().await;
        let Some(entry) = jobs.get(id) else {
            return false;
        };
        if entry
            .claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.queued.fetch_sub(1, Ordering::SeqCst);
        mark_cancelled(&entry.tx);
        metrics::set_queue_depth(self.queued.load(Ordering::SeqCst), self.running.load(Ordering::SeqCst));
        info!(job_id = %id, "Cancelled queued job");
        true
    }

    pub async fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            capacity: self.capacity,
            queued: self.queued.load(Ordering::SeqCst),
            running: self.running.load(Ordering::SeqCst),
            tracked: self.jobs.read().await.len(),
        }
    }

    /// Forget terminal jobs whose last update is older than `max_age`.
    pub async fn prune_finished(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, entry| {
            let result = entry.rx.borrow();
            !(result.is_terminal() && now - result.updated_at >= max_age)
        });
        before - jobs.len()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().map(|s| s.is_none()).unwrap_or(true)
    }

    /// Stop accepting submissions. Already queued jobs still run.
    pub fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            if sender.take().is_some() {
                info!("Dispatcher closed to new submissions");
            }
        }
    }

    /// Close and wait up to `timeout` for queued and running jobs to finish.
    ///
    /// Returns `true` if everything finished in time.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.close();
        let dispatch_task = self.dispatch_task.lock().ok().and_then(|mut t| t.take());

        let wait = async {
            if let Some(task) = dispatch_task {
                let _ = task.await;
            }
            // All permits back means no runner is active.
            let _ = self.semaphore.acquire_many(self.capacity as u32).await;
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(()) => {
                info!("All jobs drained");
                true
            }
            Err(_) => {
                let stats = self.stats().await;
                warn!(
                    queued = stats.queued,
                    running = stats.running,
                    "Drain timed out with jobs still in flight"
                );
                false
            }
        }
    }
}

async fn dispatch_loop(
    mut receiver: mpsc::UnboundedReceiver<QueuedJob>,
    runner: Arc<JobRunner>,
    semaphore: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
) {
    while let Some(next) = receiver.recv().await {
        if next.claimed.load(Ordering::SeqCst) {
            continue;
        }

        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        // Lost to `cancel` while waiting for a slot.
        if next
            .claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            continue;
        }

        queued.fetch_sub(1, Ordering::SeqCst);
        running.fetch_add(1, Ordering::SeqCst);
        metrics::set_queue_depth(queued.load(Ordering::SeqCst), running.load(Ordering::SeqCst));

        let runner = Arc::clone(&runner);
        let queued = Arc::clone(&queued);
        let running = Arc::clone(&running);
        let span = JobLogger::new(next.job.id(), "clip").create_span();
        tokio::spawn(
            async move {
                let _permit = permit;
                runner.run(&next.job, &next.tx).await;
                running.fetch_sub(1, Ordering::SeqCst);
                metrics::set_queue_depth(queued.load(Ordering::SeqCst), running.load(Ordering::SeqCst));
            }
            .instrument(span),
        );
    }
    debug!("Dispatch loop stopped");
}

fn mark_cancelled(tx: &watch::Sender<JobResult>) {
    tx.send_modify(|result| {
        if let Err(e) = result.fail(JobError::new(ErrorKind::Cancelled, "cancelled before start")) {
            warn!(job_id = %result.job_id, "{}", e);
        }
    });
}

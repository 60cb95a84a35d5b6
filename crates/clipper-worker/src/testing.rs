//! In-process tool fake for runner and dispatcher tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use clipper_media::{MediaError, MediaResult, ToolInvocation, ToolInvoker, ToolOutput};

/// What a fake tool does when invoked.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    Succeed,
    SucceedEmpty,
    Fail,
    FailWithPartial,
    Timeout,
}

pub(crate) struct FakeTools {
    fetch: Step,
    trim: Step,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<(&'static str, Vec<String>)>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeTools {
    pub(crate) fn new(fetch: Step, trim: Step) -> Self {
        Self {
            fetch,
            trim,
            delay: Duration::ZERO,
            gate: None,
            calls: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub(crate) fn succeeding() -> Self {
        Self::new(Step::Succeed, Step::Succeed)
    }

    /// Sleep this long inside every invocation.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Block every fetch until a permit is added to `gate`.
    pub(crate) fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn stages(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(|(stage, _)| *stage).collect()
    }

    pub(crate) fn args_of(&self, stage: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, args)| args.clone())
            .unwrap_or_default()
    }

    /// Source URLs in the order their fetch started.
    pub(crate) fn fetch_order(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == "fetch")
            .filter_map(|(_, args)| args.last().cloned())
            .collect()
    }

    /// Highest number of simultaneous invocations observed.
    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolInvoker for FakeTools {
    async fn invoke(&self, invocation: &ToolInvocation) -> MediaResult<ToolOutput> {
        let args = invocation.get_args().to_vec();
        let (stage, step, output) = if invocation.program().contains("fetch") {
            let out = args
                .iter()
                .position(|a| a == "-o")
                .and_then(|i| args.get(i + 1))
                .cloned()
                .unwrap_or_default();
            ("fetch", self.fetch, out)
        } else {
            ("trim", self.trim, args.last().cloned().unwrap_or_default())
        };
        self.calls.lock().unwrap().push((stage, args));

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if stage == "fetch" {
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let program = invocation.program().to_string();
        let outcome = match step {
            Step::Succeed => tokio::fs::write(&output, b"video").await.map_err(MediaError::from),
            Step::SucceedEmpty => tokio::fs::write(&output, b"").await.map_err(MediaError::from),
            Step::Fail => Err(MediaError::tool_failed(&program, Some(1), format!("{} failed", program))),
            Step::FailWithPartial => {
                let _ = tokio::fs::write(&output, b"partial").await;
                Err(MediaError::tool_failed(&program, Some(1), format!("{} failed", program)))
            }
            Step::Timeout => Err(MediaError::timeout(&program, 5, "still working")),
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        outcome.map(|()| ToolOutput {
            combined: String::new(),
            exit_code: Some(0),
            elapsed: self.delay,
        })
    }
}

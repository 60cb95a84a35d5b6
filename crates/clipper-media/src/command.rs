//! External tool invocation.
//!
//! Every tool runs as a subprocess with a discrete argument list (never
//! through a shell), a hard timeout, and stdout/stderr merged into one
//! diagnostic transcript.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Cap on captured output per invocation.
const MAX_CAPTURED_BYTES: usize = 256 * 1024;

/// How long to keep reading pipes after the process has exited or been killed.
const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// One external tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    /// Add one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

/// Successful tool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// stdout and stderr lines in arrival order
    pub combined: String,
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

/// Runs external tools.
///
/// The job runner only talks to this trait, so tests can swap in an
/// in-process fake.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Run the tool to completion.
    ///
    /// Returns `ToolFailed` on non-zero exit and `Timeout` (after killing the
    /// process) when the deadline passes. Files the tool wrote are left in
    /// place either way.
    async fn invoke(&self, invocation: &ToolInvocation) -> MediaResult<ToolOutput>;
}

/// [`ToolInvoker`] backed by real subprocesses.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    drain_grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    /// Set how long output pipes are drained after exit.
    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }
}

#[async_trait]
impl ToolInvoker for ProcessRunner {
    async fn invoke(&self, invocation: &ToolInvocation) -> MediaResult<ToolOutput> {
        let program = invocation.program();
        debug!("Running tool: {}", invocation.display());

        let mut cmd = Command::new(program);
        cmd.args(invocation.get_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group so a timeout also takes down helpers the tool spawned.
        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MediaError::ToolNotFound(program.to_string())
            } else {
                MediaError::Io(e)
            }
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, tx));
        }

        let waited = tokio::time::timeout(invocation.timeout(), child.wait()).await;
        let status = match waited {
            Ok(status) => Some(status?),
            Err(_) => {
                warn!(
                    "{} timed out after {} seconds, killing process",
                    program,
                    invocation.timeout().as_secs()
                );
                terminate(&mut child).await;
                None
            }
        };

        let combined = collect_output(rx, readers, self.drain_grace).await;
        let elapsed = started.elapsed();

        match status {
            None => Err(MediaError::timeout(program, invocation.timeout().as_secs(), combined)),
            Some(status) if status.success() => Ok(ToolOutput {
                combined,
                exit_code: status.code(),
                elapsed,
            }),
            Some(status) => Err(MediaError::tool_failed(program, status.code(), combined)),
        }
    }
}

fn spawn_line_reader<R>(reader: R, tx: mpsc::UnboundedSender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Gather lines until both pipes close or the grace period runs out.
async fn collect_output(
    mut rx: mpsc::UnboundedReceiver<String>,
    readers: Vec<JoinHandle<()>>,
    grace: Duration,
) -> String {
    let mut combined = String::new();
    let mut truncated = false;
    let deadline = tokio::time::sleep(grace);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => {
                    if combined.len() + line.len() + 1 > MAX_CAPTURED_BYTES {
                        truncated = true;
                        continue;
                    }
                    if !combined.is_empty() {
                        combined.push('\n');
                    }
                    combined.push_str(&line);
                }
                None => break,
            },
            _ = &mut deadline => {
                debug!("Output pipes still open after exit, abandoning readers");
                break;
            }
        }
    }

    for reader in readers {
        reader.abort();
    }
    if truncated {
        combined.push_str("\n[output truncated]");
    }
    combined
}

/// Kill the child and, on Unix, the whole process group it leads.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!("killpg({}) failed: {}", pid, e);
        }
    }
    if let Err(e) = child.kill().await {
        debug!("Failed to kill child process: {}", e);
    }
}

/// Locate a tool on `PATH`.
pub fn check_tool(program: &str) -> MediaResult<PathBuf> {
    which::which(program).map_err(|_| MediaError::ToolNotFound(program.to_string()))
}

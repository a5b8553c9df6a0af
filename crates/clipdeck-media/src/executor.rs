//! Process executor.
//!
//! Every external tool invocation (FFmpeg, FFprobe, yt-dlp) goes through a
//! [`CommandExecutor`]. The production implementation, [`ProcessExecutor`]:
//! - captures stdout and stderr for diagnostics
//! - streams stderr lines to an optional observer (progress parsing)
//! - enforces a timeout with escalating termination (SIGTERM, then SIGKILL
//!   after a grace window)
//! - retries spawn failures and non-zero exits with a fixed delay when the
//!   call site opts in; timeouts are never retried
//! - tracks live children so process shutdown can terminate them

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// Default grace window between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Cap on captured stderr kept in memory per invocation. The newest lines win.
const MAX_CAPTURED_STDERR: usize = 256 * 1024;

/// Observer invoked for every stderr line as it is produced.
pub type LineObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-invocation execution options.
#[derive(Clone)]
pub struct ExecOptions {
    /// Wall-clock limit for one attempt
    pub timeout: Option<Duration>,
    /// Time between SIGTERM and SIGKILL on timeout
    pub kill_grace: Duration,
    /// Additional attempts after the first (spawn failures and non-zero exits only)
    pub retries: u32,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
    /// Receives stderr lines while the process runs
    pub stderr_observer: Option<LineObserver>,
    /// Working directory for the child
    pub working_dir: Option<PathBuf>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            kill_grace: DEFAULT_KILL_GRACE,
            retries: 0,
            retry_delay: Duration::from_secs(2),
            stderr_observer: None,
            working_dir: None,
        }
    }
}

impl fmt::Debug for ExecOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecOptions")
            .field("timeout", &self.timeout)
            .field("kill_grace", &self.kill_grace)
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .field("stderr_observer", &self.stderr_observer.is_some())
            .field("working_dir", &self.working_dir)
            .finish()
    }
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Opt into the resilient path: retry up to `retries` more times.
    pub fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = delay;
        self
    }

    pub fn with_stderr_observer(mut self, observer: LineObserver) -> Self {
        self.stderr_observer = Some(observer);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Captured result of a successful invocation.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Attempts used, including the successful one
    pub attempts: u32,
}

/// Runs one external command to completion.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: &ExecOptions,
    ) -> MediaResult<ProcessOutput>;
}

/// Registry of live child pids, shared with whoever handles process shutdown.
#[derive(Debug, Clone, Default)]
pub struct ChildRegistry {
    pids: Arc<Mutex<HashSet<u32>>>,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, pid: u32) -> ChildGuard {
        if let Ok(mut pids) = self.pids.lock() {
            pids.insert(pid);
        }
        ChildGuard {
            registry: self.clone(),
            pid,
        }
    }

    /// Number of children currently running.
    pub fn len(&self) -> usize {
        self.pids.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<u32> {
        self.pids
            .lock()
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Best-effort termination of every tracked child: SIGTERM, wait up to
    /// `grace`, then SIGKILL whatever is still registered.
    pub async fn terminate_all(&self, grace: Duration) {
        let pids = self.snapshot();
        if pids.is_empty() {
            return;
        }

        info!(children = pids.len(), "Terminating in-flight child processes");
        for pid in &pids {
            send_signal(*pid, Signal::Term);
        }

        let deadline = Instant::now() + grace;
        while !self.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        for pid in self.snapshot() {
            warn!(pid, "Child ignored SIGTERM, sending SIGKILL");
            send_signal(pid, Signal::Kill);
        }
    }
}

/// Removes a pid from the registry when the run finishes, however it finishes.
struct ChildGuard {
    registry: ChildRegistry,
    pid: u32,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(mut pids) = self.registry.pids.lock() {
            pids.remove(&self.pid);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: Signal) {
    use nix::sys::signal::{kill, Signal as NixSignal};
    use nix::unistd::Pid;

    let sig = match signal {
        Signal::Term => NixSignal::SIGTERM,
        Signal::Kill => NixSignal::SIGKILL,
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), sig) {
        debug!(pid, "Failed to signal child: {}", e);
    }
}

#[cfg(not(unix))]
fn send_signal(pid: u32, _signal: Signal) {
    debug!(pid, "Signals unsupported on this platform");
}

/// Executor backed by real OS processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    registry: ChildRegistry,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an executor that reports children to a shared registry.
    pub fn with_registry(registry: ChildRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ChildRegistry {
        &self.registry
    }

    async fn run_once(
        &self,
        program: &str,
        args: &[String],
        options: &ExecOptions,
    ) -> MediaResult<ProcessOutput> {
        debug!("Running: {} {}", program, args.join(" "));

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &options.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| MediaError::spawn(program, e))?;

        let _guard = child.id().map(|pid| self.registry.track(pid));

        let stdout_task = child.stdout.take().map(|mut stdout| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stdout.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let observer = options.stderr_observer.clone();
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut captured = StderrTail::new(MAX_CAPTURED_STDERR);
                // FFmpeg rewrites its stats line with '\r'; split on both.
                let mut reader = BufReader::new(stderr).split(b'\n');
                while let Ok(Some(chunk)) = reader.next_segment().await {
                    let text = String::from_utf8_lossy(&chunk);
                    for line in text.split('\r') {
                        if let Some(observer) = &observer {
                            observer(line);
                        }
                        captured.push(line);
                    }
                }
                captured.into_string()
            })
        });

        let status = match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(
                        "{} timed out after {:?}, terminating (grace {:?})",
                        program, limit, options.kill_grace
                    );
                    terminate(&mut child, options.kill_grace).await;
                    return Err(MediaError::timeout(program, limit.as_secs()));
                }
            },
            None => child.wait().await?,
        };

        let stdout = match stdout_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            Ok(ProcessOutput {
                exit_code: status.code(),
                stdout,
                stderr,
                attempts: 1,
            })
        } else {
            Err(MediaError::process_exit(
                program,
                status.code(),
                exit_signal(&status),
                stderr,
            ))
        }
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: &ExecOptions,
    ) -> MediaResult<ProcessOutput> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.run_once(program, args, options).await {
                Ok(mut output) => {
                    record_run(program, "success");
                    output.attempts = attempt;
                    return Ok(output);
                }
                Err(e) if e.is_retryable() && attempt <= options.retries => {
                    record_run(program, "retried");
                    warn!(
                        "{} attempt {}/{} failed, retrying in {:?}: {}",
                        program,
                        attempt,
                        options.retries + 1,
                        options.retry_delay,
                        e
                    );
                    tokio::time::sleep(options.retry_delay).await;
                }
                Err(e) => {
                    record_run(program, if e.is_timeout() { "timeout" } else { "failure" });
                    return Err(e);
                }
            }
        }
    }
}

/// Graceful signal first, forced kill after the grace window.
async fn terminate(child: &mut Child, grace: Duration) {
    if let Some(pid) = child.id() {
        send_signal(pid, Signal::Term);
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            return;
        }
    }
    if let Err(e) = child.kill().await {
        debug!("Failed to kill child: {}", e);
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

fn record_run(program: &str, outcome: &'static str) {
    let program = std::path::Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string());
    metrics::counter!(
        "clipdeck_process_runs_total",
        "program" => program,
        "outcome" => outcome
    )
    .increment(1);
}

/// Keeps the most recent stderr lines within a byte budget.
///
/// Tool failures are reported at the end of the stream, so older lines are
/// evicted first.
#[derive(Debug)]
struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
    limit: usize,
    dropped: usize,
}

impl StderrTail {
    fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            bytes: 0,
            limit,
            dropped: 0,
        }
    }

    fn push(&mut self, line: &str) {
        self.bytes += line.len() + 1;
        self.lines.push_back(line.to_string());
        while self.bytes > self.limit && self.lines.len() > 1 {
            if let Some(old) = self.lines.pop_front() {
                self.bytes -= old.len() + 1;
                self.dropped += 1;
            }
        }
    }

    fn into_string(self) -> String {
        let mut out = String::with_capacity(self.bytes + 32);
        if self.dropped > 0 {
            out.push_str(&format!("[{} earlier lines dropped]\n", self.dropped));
        }
        for line in self.lines {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

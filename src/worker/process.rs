//! Supervision of the worker child process.
//!
//! [`WorkerProcess`] spawns the worker, hands its stdin/stdout to the framed
//! channel and keeps two background tasks per process: one drains stderr into
//! a [`LimitedBuffer`], the other waits for the exit and publishes it on the
//! [`HealthSignal`].

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::buffer::{LimitedBuffer, SharedBuffer};
use super::error::{JmxConnectionError, WorkerError, WorkerResult};
use super::protocol::PROTOCOL_VERSION_FLAG;
use super::state::{health_channel, ExitNotice, ExitOutcome, ExitReporter, HealthSignal};
use crate::config::WorkerSettings;

/// How long the exit watcher waits for the stderr drain before rendering the
/// exit error.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a forced termination waits for the kill to be observed.
const KILL_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of [`WorkerProcess::wait_or_kill`].
#[derive(Debug)]
pub(crate) enum ExitWait {
    /// The worker exited on its own.
    Exited(ExitOutcome),
    /// The worker outlived the wait and was killed.
    Killed { confirmed: bool },
}

/// A running (or exited) worker process.
///
/// Dropping the value kills the worker.
#[derive(Debug)]
pub struct WorkerProcess {
    executable: PathBuf,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: SharedBuffer,
    signal: HealthSignal,
    kill: CancellationToken,
}

impl WorkerProcess {
    /// Spawn the worker described by `settings`.
    ///
    /// The worker is invoked as `<executable> -v2 <settings.args...>`. An exit
    /// after a successful spawn is not an error here; it is observed later
    /// through [`error`](Self::error) or [`wait_exit`](Self::wait_exit).
    pub async fn start(settings: &WorkerSettings) -> WorkerResult<Self> {
        let executable = settings.executable();

        let mut command = Command::new(&executable);
        command
            .arg(PROTOCOL_VERSION_FLAG)
            .args(&settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        set_parent_death_signal(&mut command);

        let mut child = command.spawn().map_err(|e| {
            WorkerError::connection(format!(
                "failed to start worker process '{}': {}",
                executable.display(),
                e
            ))
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "failed to kill worker process with missing pipes");
            }
            return Err(WorkerError::connection(
                "failed to capture worker process standard streams",
            ));
        };

        let pid = child.id();
        info!(pid, executable = %executable.display(), "worker process started");

        let buffer = LimitedBuffer::shared(settings.stderr_buffer_size);
        let drain = tokio::spawn(drain_stderr(stderr, buffer.clone()));

        let (reporter, signal) = health_channel();
        let kill = CancellationToken::new();
        tokio::spawn(watch_exit(child, drain, buffer.clone(), reporter, kill.clone()));

        Ok(Self {
            executable,
            pid,
            stdin: Some(stdin),
            stdout: Some(stdout),
            stderr: buffer,
            signal,
            kill,
        })
    }

    /// Hand the worker's stdin and stdout to the caller. Returns `None` once
    /// the streams were taken or the process was terminated.
    pub fn take_streams(&mut self) -> Option<(ChildStdin, ChildStdout)> {
        match (self.stdin.take(), self.stdout.take()) {
            (Some(stdin), Some(stdout)) => Some((stdin, stdout)),
            _ => None,
        }
    }

    /// Non-blocking health check.
    ///
    /// `Ok` while the worker runs. Once the exit is captured, the first check
    /// returns the exit error (with captured stderr) for an abnormal exit;
    /// every other check returns a "not running" error.
    pub fn error(&mut self) -> WorkerResult<()> {
        match self.signal.try_recv() {
            ExitNotice::Pending if self.signal.is_running() => Ok(()),
            ExitNotice::Exited(Err(e)) => Err(e.into()),
            _ => Err(JmxConnectionError::not_running().into()),
        }
    }

    /// True between a successful start and the captured exit.
    pub fn is_running(&self) -> bool {
        self.signal.is_running()
    }

    /// Exit notification of this process.
    pub fn health_signal(&mut self) -> &mut HealthSignal {
        &mut self.signal
    }

    /// Wait up to `timeout` for the worker to exit.
    ///
    /// Returns the exit outcome. If the worker is still alive when the
    /// timeout elapses it is killed and a timeout error carrying the captured
    /// stderr is returned.
    pub async fn wait_exit(&mut self, timeout: Duration) -> WorkerResult<()> {
        match self.wait_or_kill(timeout).await {
            ExitWait::Exited(outcome) => outcome.map_err(WorkerError::from),
            ExitWait::Killed { confirmed } => Err(WorkerError::connection(format!(
                "{}: stderr: {}",
                self.timeout_message(confirmed),
                self.stderr_contents()
            ))),
        }
    }

    /// Wait up to `timeout` for the exit, killing the worker once it elapses.
    pub(crate) async fn wait_or_kill(&mut self, timeout: Duration) -> ExitWait {
        match tokio::time::timeout(timeout, self.signal.recv()).await {
            Ok(Some(outcome)) => ExitWait::Exited(outcome),
            Ok(None) => ExitWait::Exited(Ok(())),
            Err(_) => {
                warn!(
                    pid = self.pid,
                    timeout_ms = timeout.as_millis() as u64,
                    "worker process did not exit in time, terminating"
                );
                self.terminate();

                let confirmed = tokio::time::timeout(KILL_TIMEOUT, self.signal.recv())
                    .await
                    .is_ok();
                ExitWait::Killed { confirmed }
            }
        }
    }

    /// Error text for a worker that had to be killed after a wait.
    pub(crate) fn timeout_message(&self, confirmed: bool) -> String {
        let fate = if confirmed {
            "process terminated"
        } else {
            "termination was not confirmed"
        };
        format!(
            "timeout exceeded while waiting for {} to exit gracefully, {}",
            self.executable.display(),
            fate
        )
    }

    /// Force the worker down. Closes any streams still held here and kills
    /// the process. Safe to call any number of times.
    pub fn terminate(&mut self) {
        self.stdin = None;
        self.stdout = None;

        if !self.kill.is_cancelled() {
            debug!(pid = self.pid, "terminating worker process");
            self.kill.cancel();
        }
    }

    /// OS process id, if the process was running when it was spawned.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Path of the worker executable.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Diagnostic output captured from the worker's stderr so far.
    pub fn stderr_contents(&self) -> String {
        self.stderr.lock().to_string_lossy()
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        self.kill.cancel();
    }
}

async fn drain_stderr(mut stderr: ChildStderr, buffer: SharedBuffer) {
    let mut chunk = [0u8; 4096];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buffer.lock().append(&chunk[..n]);
            }
            Err(e) => {
                debug!(error = %e, "failed to read worker stderr");
                break;
            }
        }
    }
}

async fn watch_exit(
    mut child: Child,
    drain: JoinHandle<()>,
    stderr: SharedBuffer,
    reporter: ExitReporter,
    kill: CancellationToken,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill.cancelled() => {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "worker process kill failed");
            }
            child.wait().await
        }
    };

    if tokio::time::timeout(STDERR_DRAIN_TIMEOUT, drain).await.is_err() {
        debug!("worker stderr still open after exit");
    }

    let outcome = exit_outcome(status, &stderr.lock().to_string_lossy());
    match &outcome {
        Ok(()) => info!("worker process exited"),
        Err(e) => warn!(error = %e, "worker process exited with error"),
    }
    reporter.report(outcome);
}

fn exit_outcome(status: std::io::Result<ExitStatus>, stderr: &str) -> ExitOutcome {
    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(JmxConnectionError::new(format!(
            "worker process exited with error: {}: stderr: {}",
            status, stderr
        ))),
        Err(e) => Err(JmxConnectionError::new(format!(
            "failed to wait for worker process: {}: stderr: {}",
            e, stderr
        ))),
    }
}

#[cfg(target_os = "linux")]
fn set_parent_death_signal(command: &mut Command) {
    // SAFETY: prctl is async-signal-safe and the closure touches no shared state.
    unsafe {
        command.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
fn set_parent_death_signal(_command: &mut Command) {}

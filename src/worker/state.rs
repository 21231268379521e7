//! Exit notification for the worker process.
//!
//! The exit watcher is the single producer: it reports the exit outcome once
//! through an [`ExitReporter`]. The supervisor reads it through a
//! [`HealthSignal`], which remembers when the outcome has been consumed so
//! later reads return immediately instead of waiting on a finished process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use super::error::JmxConnectionError;

/// How the worker process ended: `Ok` for a clean exit.
pub type ExitOutcome = Result<(), JmxConnectionError>;

/// Non-blocking read of a [`HealthSignal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitNotice {
    /// The worker is still running.
    Pending,
    /// The worker exited; this read consumed the outcome.
    Exited(ExitOutcome),
    /// The outcome was consumed by an earlier read.
    Consumed,
}

/// Create a connected reporter/signal pair. The process counts as running
/// until the reporter is used or dropped.
pub(crate) fn health_channel() -> (ExitReporter, HealthSignal) {
    let (tx, rx) = oneshot::channel();
    let running = Arc::new(AtomicBool::new(true));

    (
        ExitReporter {
            tx: Some(tx),
            running: running.clone(),
        },
        HealthSignal {
            rx: Some(rx),
            running,
        },
    )
}

/// Producer half, owned by the exit watcher task.
#[derive(Debug)]
pub(crate) struct ExitReporter {
    tx: Option<oneshot::Sender<ExitOutcome>>,
    running: Arc<AtomicBool>,
}

impl ExitReporter {
    /// Publish the exit outcome. The running flag is cleared after the
    /// outcome is queued, so a reader that sees "not running" finds it.
    pub(crate) fn report(mut self, outcome: ExitOutcome) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for ExitReporter {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Single-fire exit notification of a worker process.
#[derive(Debug)]
pub struct HealthSignal {
    rx: Option<oneshot::Receiver<ExitOutcome>>,
    running: Arc<AtomicBool>,
}

impl HealthSignal {
    /// True until the exit watcher has captured the process exit.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// True once the exit outcome has been read.
    pub fn is_consumed(&self) -> bool {
        self.rx.is_none()
    }

    /// Read the exit outcome without waiting.
    pub fn try_recv(&mut self) -> ExitNotice {
        let Some(rx) = self.rx.as_mut() else {
            return ExitNotice::Consumed;
        };

        match rx.try_recv() {
            Ok(outcome) => {
                self.rx = None;
                ExitNotice::Exited(outcome)
            }
            Err(TryRecvError::Empty) => ExitNotice::Pending,
            Err(TryRecvError::Closed) => {
                self.rx = None;
                ExitNotice::Consumed
            }
        }
    }

    /// Wait for the exit outcome. Returns `None` right away if it was already
    /// consumed, or if the watcher went away without reporting.
    ///
    /// Cancel safe: dropping the future before it completes leaves the
    /// outcome in place for the next read.
    pub async fn recv(&mut self) -> Option<ExitOutcome> {
        let rx = self.rx.as_mut()?;
        let outcome = rx.await.ok();
        self.rx = None;
        outcome
    }
}

//! Liveness probe run before a freshly started worker is trusted.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::channel::FramedChannel;
use super::error::{JmxConnectionError, TransportError, WorkerError, WorkerResult};
use super::protocol::{Reply, Request};
use super::state::HealthSignal;

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Ping the worker until it answers with its version.
///
/// Races the probe against `timeout`, the worker's exit and `cancel`; the
/// first to finish decides the result:
/// - timeout: ping-timeout connection error
/// - worker exit: the captured exit error, or "not running" for a clean exit
/// - cancellation: connection error
/// - answer: the worker version
pub async fn ping<W, R>(
    channel: &mut FramedChannel<W, R>,
    signal: &mut HealthSignal,
    timeout: Duration,
    cancel: &CancellationToken,
) -> WorkerResult<String>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    tokio::select! {
        _ = tokio::time::sleep(timeout) => {
            debug!(timeout_ms = timeout.as_millis() as u64, "worker ping timed out");
            Err(JmxConnectionError::ping_timeout().into())
        }
        outcome = signal.recv() => match outcome {
            Some(Err(e)) => Err(e.into()),
            _ => Err(JmxConnectionError::not_running().into()),
        },
        _ = cancel.cancelled() => Err(cancelled()),
        version = poll_version(channel, cancel) => version,
    }
}

async fn poll_version<W, R>(
    channel: &mut FramedChannel<W, R>,
    cancel: &CancellationToken,
) -> WorkerResult<String>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        attempt += 1;

        let err = match channel.call(&Request::GetClientVersion).await {
            Ok(Ok(Reply::Version(version))) => {
                debug!(attempt, %version, "worker answered ping");
                return Ok(version);
            }
            Ok(Ok(other)) => WorkerError::from(TransportError::UnexpectedReply {
                expected: Request::GetClientVersion.method(),
                received: other.kind(),
            }),
            Ok(Err(payload)) => WorkerError::from(payload),
            Err(e) => WorkerError::from(e),
        };
        trace!(attempt, error = %err, "worker ping failed, retrying");

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

fn cancelled() -> WorkerError {
    WorkerError::connection("could not establish communication with worker process: cancelled")
}

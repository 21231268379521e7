//! Worker-specific error types.
//!
//! Every client operation returns a [`WorkerError`]. Callers decide how to
//! recover from it through [`WorkerError::kind`]:
//!
//! - [`ErrorKind::Domain`]: the worker ran the request and rejected it. Fix the
//!   request; the worker is still healthy.
//! - [`ErrorKind::Connection`]: the worker could not reach its target, or the
//!   worker itself is gone. Re-open the client.
//! - [`ErrorKind::Transport`]: the byte stream to the worker broke. Only seen by
//!   code driving a [`FramedChannel`](super::FramedChannel) directly; the client
//!   folds these into connection errors after capturing the exit cause.

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Recovery class of a [`WorkerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The local stream link to the worker broke.
    Transport,
    /// The worker reported the request as invalid.
    Domain,
    /// The worker (or its link to the target) is unusable.
    Connection,
}

/// Error reported by the worker when a JMX request fails.
///
/// Worker-provided text is rendered with debug escaping so a multi-line
/// stacktrace stays on one log line.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("jmx error: {message:?}, cause: {cause_message:?}, stacktrace: {stacktrace:?}")]
pub struct JmxError {
    /// Error message.
    pub message: String,
    /// Message of the root cause, if the worker had one.
    #[serde(default)]
    pub cause_message: String,
    /// Worker-side stacktrace.
    #[serde(default)]
    pub stacktrace: String,
}

impl JmxError {
    /// Create a new JMX error.
    pub fn new(
        message: impl Into<String>,
        cause_message: impl Into<String>,
        stacktrace: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            cause_message: cause_message.into(),
            stacktrace: stacktrace.into(),
        }
    }
}

/// Connection to the JMX endpoint or to the worker process failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("connection error: {message:?}")]
pub struct JmxConnectionError {
    /// Error message.
    pub message: String,
}

impl JmxConnectionError {
    /// Create a new connection error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The worker process has exited or was never started.
    pub fn not_running() -> Self {
        Self::new("worker process is not running")
    }

    /// `open` was called while a worker process is still alive.
    pub fn already_running() -> Self {
        Self::new("worker process is already running")
    }

    /// The worker never answered the liveness probe.
    pub fn ping_timeout() -> Self {
        Self::new("could not establish communication with worker process: ping timeout")
    }
}

/// Failure of the framed byte stream between the client and the worker.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to write a frame to worker stdin.
    #[error("failed to write frame to worker: {0}")]
    Write(#[source] io::Error),

    /// Failed to read a frame from worker stdout.
    #[error("failed to read frame from worker: {0}")]
    Read(#[source] io::Error),

    /// Worker stdout reached end of stream.
    #[error("worker closed its output stream")]
    Closed,

    /// Failed to encode a frame.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// A frame could not be decoded.
    #[error("failed to decode frame: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The reply does not belong to the request that was sent.
    #[error("unexpected reply to {expected}: received {received}")]
    UnexpectedReply {
        /// Method of the request that was sent.
        expected: &'static str,
        /// Kind of reply that came back.
        received: &'static str,
    },
}

/// Errors that can occur while talking to the worker.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The worker or its JMX connection is unusable.
    #[error(transparent)]
    Connection(#[from] JmxConnectionError),

    /// The worker rejected the request.
    #[error(transparent)]
    Jmx(#[from] JmxError),

    /// The stream to the worker broke.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

impl WorkerError {
    /// Create a connection error from a message.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(JmxConnectionError::new(message))
    }

    /// Recovery class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::Jmx(_) => ErrorKind::Domain,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Returns the JMX error if the worker rejected the request.
    pub fn as_jmx_error(&self) -> Option<&JmxError> {
        match self {
            Self::Jmx(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the connection error if the worker is unusable.
    pub fn as_connection_error(&self) -> Option<&JmxConnectionError> {
        match self {
            Self::Connection(err) => Some(err),
            _ => None,
        }
    }

    /// Check if the worker rejected the request.
    pub fn is_jmx_error(&self) -> bool {
        matches!(self, Self::Jmx(_))
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Check if the stream to the worker broke.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

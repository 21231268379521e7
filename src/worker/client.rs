//! Async client for the JMX worker process.

use std::time::Instant;

use tokio::process::{ChildStdin, ChildStdout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::channel::FramedChannel;
use super::error::{JmxConnectionError, TransportError, WorkerError, WorkerResult};
use super::probe;
use super::process::{ExitWait, WorkerProcess};
use super::protocol::{AttributeRecord, InternalStat, Reply, Request};
use super::stats::{CallStats, StatsAggregator};
use crate::config::{ConnectionConfig, WorkerSettings};
use crate::query::{self, QueryOutcome};

type WorkerChannel = FramedChannel<ChildStdin, ChildStdout>;

/// Async client for the JMX worker.
///
/// The client spawns the worker as a child process, proves it is alive with a
/// ping and then talks to it through length-prefixed MessagePack frames over
/// stdin/stdout. The worker handles one request at a time; every call takes
/// `&mut self`, so calls on one client never overlap.
///
/// # Example
///
/// ```ignore
/// use jmxlink::{ConnectionConfig, JmxClient, WorkerSettings};
///
/// let mut client = JmxClient::new(WorkerSettings::default());
/// client.open(&ConnectionConfig::new("localhost", 9999)).await?;
///
/// let outcome = client.query_mbean("java.lang:type=*").await?;
/// for record in outcome.valid_attributes() {
///     println!("{} = {}", record.name, record.value);
/// }
///
/// client.close().await?;
/// ```
#[derive(Debug)]
pub struct JmxClient {
    settings: WorkerSettings,
    process: Option<WorkerProcess>,
    channel: Option<WorkerChannel>,
    stats: Option<StatsAggregator>,
    cancel: CancellationToken,
}

impl JmxClient {
    /// Create a client. No process is started until [`open`](Self::open).
    pub fn new(settings: WorkerSettings) -> Self {
        Self::with_cancellation(settings, CancellationToken::new())
    }

    /// Create a client whose startup probe stops when `cancel` fires.
    pub fn with_cancellation(settings: WorkerSettings, cancel: CancellationToken) -> Self {
        Self {
            settings,
            process: None,
            channel: None,
            stats: None,
            cancel,
        }
    }

    /// Start the worker, wait until it answers and connect it to the JMX
    /// endpoint described by `config`.
    ///
    /// Fails with an "already running" error while a previous worker is
    /// alive. On any failure the new worker is terminated.
    pub async fn open(&mut self, config: &ConnectionConfig) -> WorkerResult<()> {
        if self.is_running() {
            return Err(JmxConnectionError::already_running().into());
        }
        self.channel = None;
        self.process = None;

        let mut process = WorkerProcess::start(&self.settings).await?;
        let Some((stdin, stdout)) = process.take_streams() else {
            process.terminate();
            return Err(JmxConnectionError::not_running().into());
        };

        let mut channel = FramedChannel::open(stdin, stdout);
        let ping = probe::ping(
            &mut channel,
            process.health_signal(),
            self.settings.ping_timeout(),
            &self.cancel,
        )
        .await;

        let version = match ping {
            Ok(version) => version,
            Err(e) => {
                warn!(error = %e, "worker process did not answer ping");
                process.terminate();
                return Err(e);
            }
        };
        info!(pid = process.pid(), %version, "worker process is ready");

        self.stats = config
            .enable_internal_stats
            .then(|| StatsAggregator::new(config.max_internal_stats_size));
        self.process = Some(process);
        self.channel = Some(channel);

        if let Err(e) = self.connect(config).await {
            self.terminate();
            return Err(e);
        }
        Ok(())
    }

    /// Version reported by the worker.
    pub async fn client_version(&mut self) -> WorkerResult<String> {
        self.call(Request::GetClientVersion, |reply| match reply {
            Reply::Version(version) => Ok(version),
            other => Err(other),
        })
        .await
    }

    /// Connect the worker to a JMX endpoint.
    pub async fn connect(&mut self, config: &ConnectionConfig) -> WorkerResult<()> {
        info!(config = %config.format(true), "connecting to JMX endpoint");
        self.call(Request::Connect(config.clone()), expect_done).await
    }

    /// Close the JMX connection. The worker exits afterwards.
    pub async fn disconnect(&mut self) -> WorkerResult<()> {
        self.call(Request::Disconnect, expect_done).await
    }

    /// Resolve a glob pattern such as `java.lang:type=*` into MBean names.
    pub async fn query_mbean_names(&mut self, pattern: &str) -> WorkerResult<Vec<String>> {
        let request = Request::QueryMBeanNames {
            pattern: pattern.to_string(),
        };
        self.call(request, expect_names).await
    }

    /// Attribute names of one MBean.
    pub async fn get_mbean_attribute_names(
        &mut self,
        mbean_name: &str,
    ) -> WorkerResult<Vec<String>> {
        let request = Request::GetMBeanAttributeNames {
            mbean_name: mbean_name.to_string(),
        };
        self.call(request, expect_names).await
    }

    /// Read attributes of one MBean.
    ///
    /// Attributes the worker could not read come back as records with an
    /// [`AttributeValue::Error`](super::protocol::AttributeValue::Error) value
    /// inside a successful result.
    pub async fn get_mbean_attributes(
        &mut self,
        mbean_name: &str,
        attributes: &[String],
    ) -> WorkerResult<Vec<AttributeRecord>> {
        let request = Request::GetMBeanAttributes {
            mbean_name: mbean_name.to_string(),
            attributes: attributes.to_vec(),
        };
        self.call(request, |reply| match reply {
            Reply::Attributes(records) => Ok(records),
            other => Err(other),
        })
        .await
    }

    /// Query every readable attribute of the MBeans matching `pattern`.
    pub async fn query_mbean(&mut self, pattern: &str) -> WorkerResult<QueryOutcome> {
        query::query_mbean(self, pattern).await
    }

    /// Drain the statistics the worker keeps about its own JMX calls.
    pub async fn worker_internal_stats(&mut self) -> WorkerResult<Vec<InternalStat>> {
        self.call(Request::GetInternalStats, |reply| match reply {
            Reply::InternalStats(stats) => Ok(stats),
            other => Err(other),
        })
        .await
    }

    /// Drain the client-side call statistics. Empty unless the connection
    /// was opened with `enable_internal_stats`.
    pub fn internal_stats(&self) -> Vec<(String, CallStats)> {
        self.stats
            .as_ref()
            .map(StatsAggregator::read)
            .unwrap_or_default()
    }

    /// Non-blocking health check of the worker process.
    pub fn error(&mut self) -> WorkerResult<()> {
        match self.process.as_mut() {
            Some(process) => process.error(),
            None => Err(JmxConnectionError::not_running().into()),
        }
    }

    /// True while the worker process runs.
    pub fn is_running(&self) -> bool {
        self.process.as_ref().is_some_and(WorkerProcess::is_running)
    }

    /// OS process id of the worker.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(WorkerProcess::pid)
    }

    /// Kill the worker without disconnecting. Safe to call repeatedly.
    pub fn terminate(&mut self) {
        self.channel = None;
        if let Some(mut process) = self.process.take() {
            process.terminate();
        }
    }

    /// Disconnect and wait for the worker to exit.
    ///
    /// If the worker already exited, returns its health error without
    /// touching the channel.
    pub async fn close(&mut self) -> WorkerResult<()> {
        if let Err(e) = self.error() {
            self.channel = None;
            self.process = None;
            return Err(e);
        }

        let disconnected = self.disconnect().await;
        self.channel = None;

        let Some(mut process) = self.process.take() else {
            return disconnected;
        };
        let exited = process.wait_exit(self.settings.exit_timeout()).await;
        debug!(pid = process.pid(), "worker process closed");

        match (disconnected, exited) {
            (Ok(()), exited) => exited,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(wait)) => Err(combine_close_errors(e, wait)),
        }
    }

    /// Issue one request and classify the result.
    ///
    /// The health check runs first; a dead worker is reported without
    /// touching the channel. Worker-reported errors are returned as they are.
    /// A transport failure closes the channel and waits for the worker to
    /// exit so the returned error carries the real exit cause.
    async fn call<T>(
        &mut self,
        request: Request,
        extract: fn(Reply) -> Result<T, Reply>,
    ) -> WorkerResult<T> {
        self.error()?;
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| WorkerError::from(JmxConnectionError::not_running()))?;

        let started = Instant::now();
        let result = match channel.call(&request).await {
            Ok(Ok(reply)) => extract(reply).map_err(|other| {
                WorkerError::from(TransportError::UnexpectedReply {
                    expected: request.method(),
                    received: other.kind(),
                })
            }),
            Ok(Err(payload)) => Err(WorkerError::from(payload)),
            Err(e) => Err(WorkerError::from(e)),
        };

        if let Some(stats) = &self.stats {
            stats.record(&request.call_identity(), started.elapsed(), result.is_ok());
        }

        match result {
            Err(WorkerError::Transport(e)) => {
                Err(self.handle_transport_failure(&request, e).await)
            }
            other => other,
        }
    }

    async fn handle_transport_failure(
        &mut self,
        request: &Request,
        err: TransportError,
    ) -> WorkerError {
        warn!(
            method = request.method(),
            error = %err,
            "transport failure, waiting for worker process to exit"
        );
        self.channel = None;

        let Some(process) = self.process.as_mut() else {
            return JmxConnectionError::not_running().into();
        };
        let message = match process.wait_or_kill(self.settings.exit_timeout()).await {
            ExitWait::Exited(Err(exit)) => return exit.into(),
            ExitWait::Exited(Ok(())) => {
                format!("worker process exited during {}: {}", request.method(), err)
            }
            ExitWait::Killed { confirmed } => {
                format!("{}: {}", process.timeout_message(confirmed), err)
            }
        };
        WorkerError::connection(format!(
            "{}: stderr: {}",
            message,
            process.stderr_contents()
        ))
    }
}

/// Merge the disconnect and exit errors of [`JmxClient::close`] into one
/// connection error.
fn combine_close_errors(disconnect: WorkerError, exit: WorkerError) -> WorkerError {
    WorkerError::connection(format!(
        "{}, {}",
        error_message(&disconnect),
        error_message(&exit)
    ))
}

fn error_message(err: &WorkerError) -> String {
    match err {
        WorkerError::Connection(e) => e.message.clone(),
        WorkerError::Jmx(e) => e.message.clone(),
        WorkerError::Transport(e) => e.to_string(),
    }
}

fn expect_done(reply: Reply) -> Result<(), Reply> {
    match reply {
        Reply::Done => Ok(()),
        other => Err(other),
    }
}

fn expect_names(reply: Reply) -> Result<Vec<String>, Reply> {
    match reply {
        Reply::Names(names) => Ok(names),
        other => Err(other),
    }
}

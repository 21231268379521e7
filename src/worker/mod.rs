//! Worker communication module.
//!
//! This module supervises the JMX worker process and talks to it. The worker
//! does all JMX work; this side starts it, proves it is alive, sends it one
//! request at a time and turns every failure into a [`WorkerError`] the
//! caller can act on.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        JmxClient (Async)                        │
//! │  - open: start process, ping, connect                           │
//! │  - one request in flight (&mut self)                            │
//! │  - transport failure: wait for exit, report the exit cause      │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                                     │
//!          ▼                                     ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────────┐
//! │      FramedChannel       │   │          WorkerProcess           │
//! │  u32 length + msgpack    │   │  exit watcher ──▶ HealthSignal   │
//! └──────────────────────────┘   │  stderr drain ──▶ LimitedBuffer  │
//!          │                     └──────────────────────────────────┘
//!   stdin  │  stdout                             │ stderr
//!          ▼                                     ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              JMX Worker (Long-Running Child Process)            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use jmxlink::worker::{JmxClient, WorkerSettings};
//! use jmxlink::config::ConnectionConfig;
//!
//! let mut client = JmxClient::new(WorkerSettings::default());
//! client.open(&ConnectionConfig::new("localhost", 9999)).await?;
//!
//! let names = client.query_mbean_names("java.lang:type=*").await?;
//!
//! client.close().await?;
//! ```

mod buffer;
mod channel;
mod client;
mod error;
pub mod probe;
mod process;
pub mod protocol;
mod state;
mod stats;

pub use buffer::{LimitedBuffer, SharedBuffer, DEFAULT_BUFFER_SIZE};
pub use channel::{FramedChannel, MAX_FRAME_LENGTH};
pub use client::JmxClient;
pub use error::{
    ErrorKind, JmxConnectionError, JmxError, TransportError, WorkerError, WorkerResult,
};
pub use process::WorkerProcess;
pub use protocol::{AttributeRecord, AttributeValue, InternalStat, ValueType};
pub use state::{ExitNotice, ExitOutcome, HealthSignal};
pub use stats::{CallStats, StatsAggregator, DEFAULT_MAX_STATS_SIZE};

pub use crate::config::WorkerSettings;

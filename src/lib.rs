//! # jmxlink
//!
//! Client for a long-running JMX worker process.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        config (ConnectionConfig, WorkerSettings)         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [open]
//! ┌─────────────────────────────────────────────────────────┐
//! │   worker (JmxClient, WorkerProcess, FramedChannel)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [query_mbean]
//! ┌─────────────────────────────────────────────────────────┐
//! │              query (QueryOutcome, QueryItem)             │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod query;
pub mod worker;

pub use config::{ConnectionConfig, Settings, WorkerSettings};
pub use query::{QueryItem, QueryOutcome};
pub use worker::{AttributeRecord, AttributeValue, JmxClient, WorkerError, WorkerResult};

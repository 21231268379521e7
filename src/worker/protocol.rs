//! Protocol types for worker communication.
//!
//! Each frame on the wire is a MessagePack document. The client writes
//! [`Request`] frames to worker stdin and reads one [`Response`] frame from
//! worker stdout per request.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{JmxConnectionError, JmxError, WorkerError};
use crate::config::ConnectionConfig;

/// Flag that selects the framed protocol when the worker is launched.
pub const PROTOCOL_VERSION_FLAG: &str = "-v2";

// ============================================================================
// Request/Response Envelope
// ============================================================================

/// Request frame sent to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Ask for the worker version. Used as the liveness probe.
    GetClientVersion,
    /// Connect the worker to a JMX endpoint.
    Connect(ConnectionConfig),
    /// Close the JMX connection; the worker exits afterwards.
    Disconnect,
    /// Resolve a glob pattern (`DOMAIN:BEAN`) into MBean names.
    QueryMBeanNames {
        /// Glob pattern, e.g. `java.lang:type=*`.
        pattern: String,
    },
    /// List the attribute names of one MBean.
    GetMBeanAttributeNames {
        /// Fully qualified MBean name.
        mbean_name: String,
    },
    /// Read attribute values of one MBean.
    GetMBeanAttributes {
        /// Fully qualified MBean name.
        mbean_name: String,
        /// Attributes to read.
        attributes: Vec<String>,
    },
    /// Drain the worker's own query statistics.
    GetInternalStats,
}

impl Request {
    /// Method name, used in logs and call statistics.
    pub fn method(&self) -> &'static str {
        match self {
            Self::GetClientVersion => "getClientVersion",
            Self::Connect(_) => "connect",
            Self::Disconnect => "disconnect",
            Self::QueryMBeanNames { .. } => "queryMBeanNames",
            Self::GetMBeanAttributeNames { .. } => "getMBeanAttributeNames",
            Self::GetMBeanAttributes { .. } => "getMBeanAttributes",
            Self::GetInternalStats => "getInternalStats",
        }
    }

    /// Identity of the call for statistics: the method plus its target, if any.
    pub fn call_identity(&self) -> String {
        match self {
            Self::QueryMBeanNames { pattern } => format!("{}:{}", self.method(), pattern),
            Self::GetMBeanAttributeNames { mbean_name }
            | Self::GetMBeanAttributes { mbean_name, .. } => {
                format!("{}:{}", self.method(), mbean_name)
            }
            _ => self.method().to_string(),
        }
    }
}

/// Successful reply from the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// Worker version.
    Version(String),
    /// Acknowledgement for calls without a result.
    Done,
    /// MBean or attribute names.
    Names(Vec<String>),
    /// Attribute values.
    Attributes(Vec<AttributeRecord>),
    /// Worker-side statistics.
    InternalStats(Vec<InternalStat>),
}

impl Reply {
    /// Short name of the reply kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Version(_) => "version",
            Self::Done => "done",
            Self::Names(_) => "names",
            Self::Attributes(_) => "attributes",
            Self::InternalStats(_) => "internal stats",
        }
    }
}

/// Error envelope returned by the worker in place of a [`Reply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ErrorPayload {
    /// The request was invalid.
    Jmx(JmxError),
    /// The worker cannot reach the JMX endpoint.
    Connection(JmxConnectionError),
}

impl From<ErrorPayload> for WorkerError {
    fn from(payload: ErrorPayload) -> Self {
        match payload {
            ErrorPayload::Jmx(err) => WorkerError::Jmx(err),
            ErrorPayload::Connection(err) => WorkerError::Connection(err),
        }
    }
}

/// Response frame received from the worker.
pub type Response = Result<Reply, ErrorPayload>;

// ============================================================================
// Attributes
// ============================================================================

/// Type tag of an [`AttributeValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    String,
    Double,
    Integer,
    Error,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::String => "string",
            Self::Double => "double",
            Self::Integer => "integer",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Value of a single attribute.
///
/// `Error` carries the worker's status message when the attribute exists but
/// its value could not be read or serialized (null, unsupported type...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Bool(bool),
    String(String),
    Double(f64),
    Integer(i64),
    Error(String),
}

impl AttributeValue {
    /// Type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::String(_) => ValueType::String,
            Self::Double(_) => ValueType::Double,
            Self::Integer(_) => ValueType::Integer,
            Self::Error(_) => ValueType::Error,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{}", value),
            Self::String(value) => write!(f, "{}", value),
            Self::Double(value) => write!(f, "{}", value),
            Self::Integer(value) => write!(f, "{}", value),
            Self::Error(message) => write!(f, "<error: {:?}>", message),
        }
    }
}

/// One attribute returned by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    /// Attribute name, qualified with its MBean (`<mbean>,attr=<name>`).
    pub name: String,
    /// Attribute value or read failure.
    pub value: AttributeValue,
}

impl AttributeRecord {
    pub fn new(name: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Check if the worker could not read this attribute.
    pub fn is_error(&self) -> bool {
        matches!(self.value, AttributeValue::Error(_))
    }

    /// `"success"` or the worker's failure message.
    pub fn status_message(&self) -> &str {
        match &self.value {
            AttributeValue::Error(message) => message,
            _ => "success",
        }
    }
}

// ============================================================================
// Internal Stats
// ============================================================================

/// Timing record the worker keeps for each JMX call it performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalStat {
    /// Kind of JMX call (e.g. "getMBeanAttributes").
    pub stat_type: String,
    /// MBean queried.
    pub mbean: String,
    /// Attributes requested.
    #[serde(default)]
    pub attrs: Vec<String>,
    /// Number of items in the response.
    pub response_count: i64,
    /// Call duration in milliseconds.
    pub milliseconds: f64,
    /// Start time, in milliseconds since the Unix epoch.
    pub start_timestamp: i64,
    /// Whether the call succeeded.
    pub successful: bool,
}

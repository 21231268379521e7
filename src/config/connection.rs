//! JMX connection configuration.
//!
//! A [`ConnectionConfig`] is handed to the worker once, on connect. It either
//! names a full JMX service URL or a host and port from which the worker
//! builds one.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings the worker uses to reach a JMX endpoint.
///
/// `Debug` goes through [`ConnectionConfig::format`] with secrets hidden, so
/// the config can be logged safely.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Full JMX service URL. Takes precedence over hostname/port.
    pub connection_url: String,
    /// JMX endpoint hostname.
    pub hostname: String,
    /// JMX endpoint port.
    pub port: u16,
    /// URI path of the service URL (defaults to `jmxrmi` on the worker side).
    pub uri_path: Option<String>,
    pub username: String,
    pub password: String,
    pub key_store: String,
    pub key_store_password: String,
    pub trust_store: String,
    pub trust_store_password: String,
    /// Use the remote JMX protocol instead of RMI.
    pub is_remote: bool,
    /// Use the JBoss standalone remoting protocol.
    pub is_jboss_standalone_mode: bool,
    pub use_ssl: bool,
    /// Per-request timeout applied by the worker, in milliseconds.
    pub request_timeout_ms: u64,
    /// Ask the worker to include stacktraces in its errors.
    pub verbose: bool,
    /// Collect per-call statistics.
    pub enable_internal_stats: bool,
    /// Maximum number of statistics entries kept (`< 1` selects the default).
    pub max_internal_stats_size: i64,
}

impl ConnectionConfig {
    /// Create a config for a host and port.
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            ..Self::default()
        }
    }

    /// Create a config from a full JMX service URL.
    pub fn from_url(connection_url: impl Into<String>) -> Self {
        Self {
            connection_url: connection_url.into(),
            ..Self::default()
        }
    }

    /// Set the JMX credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the key store used for SSL.
    pub fn with_key_store(mut self, path: impl Into<String>, password: impl Into<String>) -> Self {
        self.key_store = path.into();
        self.key_store_password = password.into();
        self
    }

    /// Set the trust store used for SSL.
    pub fn with_trust_store(
        mut self,
        path: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.trust_store = path.into();
        self.trust_store_password = password.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enable per-call statistics, keeping at most `max_size` entries.
    pub fn with_internal_stats(mut self, max_size: i64) -> Self {
        self.enable_internal_stats = true;
        self.max_internal_stats_size = max_size;
        self
    }

    /// Render the config on one line.
    ///
    /// Empty secrets render as `<EMPTY>`; with `hide_secrets` the others
    /// render as `<HIDDEN>`.
    pub fn format(&self, hide_secrets: bool) -> String {
        let obfuscate = |value: &str| -> String {
            if value.is_empty() {
                "<EMPTY>".to_string()
            } else if hide_secrets {
                "<HIDDEN>".to_string()
            } else {
                value.to_string()
            }
        };

        let mut out = if self.connection_url.is_empty() {
            format!(
                "Hostname: '{}', Port: '{}', IsJBossStandaloneMode: '{}', IsRemote: '{}', UseSSL: '{}'",
                self.hostname,
                self.port,
                self.is_jboss_standalone_mode,
                self.is_remote,
                self.use_ssl,
            )
        } else {
            format!("ConnectionURL: '{}'", self.connection_url)
        };

        out.push_str(&format!(
            ", Username: '{}', Password: '{}'",
            obfuscate(&self.username),
            obfuscate(&self.password),
        ));
        out.push_str(&format!(
            ", Truststore: '{}', TruststorePassword: '{}', Keystore: '{}', KeystorePassword: '{}'",
            self.trust_store,
            obfuscate(&self.trust_store_password),
            self.key_store,
            obfuscate(&self.key_store_password),
        ));
        out.push_str(&format!(", RequestTimeoutMs: '{}'", self.request_timeout_ms));
        if let Some(uri_path) = &self.uri_path {
            out.push_str(&format!(", URIPath: '{}'", uri_path));
        }

        out
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionConfig({})", self.format(true))
    }
}

//! TOML-based configuration for jmxlink.
//!
//! Supports a config file (jmxlink.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [worker]
//! path = "/opt/nrjmx/bin/nrjmx"
//! ping_timeout_ms = 10000
//! exit_timeout_ms = 5000
//!
//! [connections.kafka]
//! hostname = "kafka-1.internal"
//! port = 9999
//! username = "monitor"
//! password = "${KAFKA_JMX_PASSWORD}"
//! request_timeout_ms = 3000
//!
//! [connections.tomcat]
//! connection_url = "service:jmx:rmi:///jndi/rmi://localhost:9012/jmxrmi"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::connection::ConnectionConfig;
use crate::worker::DEFAULT_BUFFER_SIZE;

/// Environment variable naming the worker executable.
pub const WORKER_PATH_ENV_VAR: &str = "NR_JMX_TOOL";

/// Worker executable used when neither settings nor environment name one.
#[cfg(target_os = "windows")]
pub const DEFAULT_WORKER_PATH: &str = "c:\\progra~1\\newrel~1\\nrjmx\\nrjmx.bat";

/// Worker executable used when neither settings nor environment name one.
#[cfg(target_os = "macos")]
pub const DEFAULT_WORKER_PATH: &str = "/usr/local/bin/nrjmx";

/// Worker executable used when neither settings nor environment name one.
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const DEFAULT_WORKER_PATH: &str = "/usr/bin/nrjmx";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Worker process configuration.
    pub worker: WorkerSettings,

    /// Named JMX connections.
    pub connections: HashMap<String, ConnectionConfig>,
}

/// Worker process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Path to the worker executable. Falls back to `NR_JMX_TOOL`, then to
    /// the platform default.
    pub path: Option<PathBuf>,

    /// Extra arguments passed after the protocol flag.
    pub args: Vec<String>,

    /// How long to wait for the worker to answer its first ping.
    pub ping_timeout_ms: u64,

    /// How long to wait for the worker to exit before killing it.
    pub exit_timeout_ms: u64,

    /// Bytes of worker stderr kept for error messages.
    pub stderr_buffer_size: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            path: None,
            args: Vec::new(),
            ping_timeout_ms: 10_000,
            exit_timeout_ms: 5_000,
            stderr_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl WorkerSettings {
    /// Settings for an explicit worker executable.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Append extra worker arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Resolve the worker executable.
    pub fn executable(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }

        match env::var(WORKER_PATH_ENV_VAR) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_WORKER_PATH),
        }
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_timeout_ms)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `JMXLINK_CONFIG`
    /// 2. `./jmxlink.toml`
    /// 3. `~/.config/jmxlink/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("JMXLINK_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("jmxlink.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("jmxlink").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Get a connection by name, with environment variables expanded.
    pub fn connection(&self, name: &str) -> Result<ConnectionConfig, SettingsError> {
        let raw = self
            .connections
            .get(name)
            .ok_or_else(|| SettingsError::ConnectionNotFound(name.to_string()))?;

        let mut config = raw.clone();
        for field in [
            &mut config.connection_url,
            &mut config.hostname,
            &mut config.username,
            &mut config.password,
            &mut config.key_store,
            &mut config.key_store_password,
            &mut config.trust_store,
            &mut config.trust_store_password,
        ] {
            *field = expand_env_vars(field)?;
        }
        Ok(config)
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                var_name.push(ch);
            }
            if var_name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}

//! Configuration module for jmxlink.
//!
//! Handles JMX connection configuration, worker settings and the settings file.

mod connection;
mod settings;

pub use connection::ConnectionConfig;
pub use settings::{
    expand_env_vars, Settings, SettingsError, WorkerSettings, DEFAULT_WORKER_PATH,
    WORKER_PATH_ENV_VAR,
};

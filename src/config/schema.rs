//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a served
//! generation. All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::descriptor::DEFAULT_ENV_VAR;

/// Root configuration for a server generation.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (address, socket family).
    pub listener: ListenerConfig,

    /// Socket handoff settings.
    pub handoff: HandoffConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Log output settings.
    pub logging: LoggingConfig,

    /// Metrics exposition settings.
    pub metrics: MetricsConfig,
}

/// Socket family of the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Tcp,
    Unix,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Unix => write!(f, "unix"),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// `host:port` for TCP, a socket path for unix.
    pub address: String,

    /// Socket family.
    pub network: Network,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            network: Network::Tcp,
        }
    }
}

/// Parent-to-child socket handoff settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandoffConfig {
    /// Environment variable carrying the listener descriptor.
    pub env_var: String,

    /// Ask the master to terminate itself after every successful fork.
    pub kill_master: bool,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            env_var: DEFAULT_ENV_VAR.to_string(),
            kill_master: false,
        }
    }
}

/// Graceful shutdown settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Drain deadline in seconds.
    pub timeout_secs: u64,
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve Prometheus text at `/metrics` on the main listener.
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

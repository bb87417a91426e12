//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate listener addresses for their socket family
//! - Validate value ranges (timeout within bounds, port valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::path::Path;

use thiserror::Error;

use crate::config::schema::{Network, ServerConfig};
use crate::lifecycle::shutdown::MAX_AWAIT_TIMEOUT;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener address is empty")]
    EmptyAddress,

    #[error("tcp listener address {0:?} is not host:port")]
    InvalidTcpAddress(String),

    // Children run from the executable's directory, so a relative path
    // would name a different socket there.
    #[error("unix listener address {0:?} must be an absolute path")]
    RelativeUnixPath(String),

    #[error("handoff environment variable name {0:?} is invalid")]
    InvalidEnvVar(String),

    #[error("shutdown timeout must be greater than zero")]
    ZeroShutdownTimeout,

    #[error("shutdown timeout of {0}s exceeds the {max}s limit", max = MAX_AWAIT_TIMEOUT.as_secs())]
    ShutdownTimeoutTooLong(u64),
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let address = config.listener.address.as_str();
    if address.is_empty() {
        errors.push(ValidationError::EmptyAddress);
    } else {
        match config.listener.network {
            Network::Tcp => {
                let valid = address
                    .rsplit_once(':')
                    .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                    .unwrap_or(false);
                if !valid {
                    errors.push(ValidationError::InvalidTcpAddress(address.to_string()));
                }
            }
            Network::Unix => {
                if !Path::new(address).is_absolute() {
                    errors.push(ValidationError::RelativeUnixPath(address.to_string()));
                }
            }
        }
    }

    let env_var = config.handoff.env_var.as_str();
    if env_var.is_empty() || env_var.contains('=') || env_var.contains('\0') {
        errors.push(ValidationError::InvalidEnvVar(env_var.to_string()));
    }

    let timeout_secs = config.shutdown.timeout_secs;
    if timeout_secs == 0 {
        errors.push(ValidationError::ZeroShutdownTimeout);
    } else if timeout_secs > MAX_AWAIT_TIMEOUT.as_secs() {
        errors.push(ValidationError::ShutdownTimeoutTooLong(timeout_secs));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = ServerConfig::default();
        config.listener.address = "no-port".to_string();
        config.handoff.env_var = "A=B".to_string();
        config.shutdown.timeout_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidTcpAddress("no-port".to_string()),
                ValidationError::InvalidEnvVar("A=B".to_string()),
                ValidationError::ZeroShutdownTimeout,
            ]
        );
    }

    #[test]
    fn unix_socket_needs_absolute_path() {
        let mut config = ServerConfig::default();
        config.listener.network = Network::Unix;
        config.listener.address = "octopus.sock".to_string();
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::RelativeUnixPath("octopus.sock".to_string())]
        );

        config.listener.address = "/tmp/octopus.sock".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn tcp_port_must_fit_u16() {
        let mut config = ServerConfig::default();
        config.listener.address = "127.0.0.1:70000".to_string();
        assert!(validate_config(&config).is_err());

        config.listener.address = "[::1]:9000".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn shutdown_timeout_is_bounded() {
        let mut config = ServerConfig::default();
        config.shutdown.timeout_secs = u64::MAX;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::ShutdownTimeoutTooLong(u64::MAX)]
        );

        config.shutdown.timeout_secs = MAX_AWAIT_TIMEOUT.as_secs();
        assert!(validate_config(&config).is_ok());
    }
}

//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that parse but make no
//! sense. Every error is returned, not just the first.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    InvalidBindAddress(String),

    #[error("listener.max_connections must be greater than zero")]
    ZeroConnections,

    #[error("listener.max_header_bytes must be at least 1024")]
    HeaderLimitTooSmall,

    #[error("backend.host must not be empty")]
    EmptyBackendHost,

    #[error("backend.port must not be zero")]
    ZeroBackendPort,

    #[error("oauth.callback_path must start with `/`")]
    InvalidCallbackPath,

    #[error("oauth.state_param must not be empty")]
    EmptyStateParam,

    #[error("timeouts.connect_secs must be greater than zero")]
    ZeroConnectTimeout,

    #[error("timeouts.header_secs must be greater than zero")]
    ZeroHeaderTimeout,

    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }
    if config.listener.max_header_bytes < 1024 {
        errors.push(ValidationError::HeaderLimitTooSmall);
    }

    if config.backend.host.trim().is_empty() {
        errors.push(ValidationError::EmptyBackendHost);
    }
    if config.backend.port == 0 {
        errors.push(ValidationError::ZeroBackendPort);
    }

    if !config.oauth.callback_path.starts_with('/') {
        errors.push(ValidationError::InvalidCallbackPath);
    }
    if config.oauth.state_param.is_empty() {
        errors.push(ValidationError::EmptyStateParam);
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroConnectTimeout);
    }
    if config.timeouts.header_secs == 0 {
        errors.push(ValidationError::ZeroHeaderTimeout);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes > 0, wait bounded, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RuntimeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{RuntimeConfig, MAX_POLL_WAIT_MS};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("transfers.poll_wait_ms must not exceed {max} (got {got})")]
    WaitTooLong { got: u64, max: u64 },

    #[error("connections.file_chunk ({file_chunk}) must hold a response header (>= 512 bytes)")]
    FileChunkTooSmall { file_chunk: usize },

    #[error("observability.push_url: {0}")]
    InvalidPushUrl(String),
}

/// Check a configuration, collecting every problem.
pub fn validate_config(config: &RuntimeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    let connections = &config.connections;
    if connections.receive_chunk == 0 {
        errors.push(ValidationError::Zero("connections.receive_chunk"));
    }
    if connections.file_chunk < 512 {
        errors.push(ValidationError::FileChunkTooSmall {
            file_chunk: connections.file_chunk,
        });
    }
    if connections.incomplete_passes == 0 {
        errors.push(ValidationError::Zero("connections.incomplete_passes"));
    }
    if connections.max_request_bytes == 0 {
        errors.push(ValidationError::Zero("connections.max_request_bytes"));
    }

    let transfers = &config.transfers;
    if transfers.max_active == 0 {
        errors.push(ValidationError::Zero("transfers.max_active"));
    }
    if transfers.connect_timeout_secs == 0 {
        errors.push(ValidationError::Zero("transfers.connect_timeout_secs"));
    }
    if transfers.total_timeout_secs == 0 {
        errors.push(ValidationError::Zero("transfers.total_timeout_secs"));
    }
    if transfers.poll_wait_ms > MAX_POLL_WAIT_MS {
        errors.push(ValidationError::WaitTooLong {
            got: transfers.poll_wait_ms,
            max: MAX_POLL_WAIT_MS,
        });
    }
    if transfers.drive_iterations == 0 {
        errors.push(ValidationError::Zero("transfers.drive_iterations"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: observability.metrics_address.clone(),
        });
    }
    if let Some(url) = &observability.push_url {
        if let Err(e) = url::Url::parse(url) {
            errors.push(ValidationError::InvalidPushUrl(e.to_string()));
        }
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
        assert_eq!(validate_config(&RuntimeConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_error() {
        let mut config = RuntimeConfig::default();
        config.listener.bind_address = "not an address".into();
        config.transfers.max_active = 0;
        config.transfers.poll_wait_ms = 50;
        config.observability.push_url = Some("::bad".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::Zero("transfers.max_active")));
        assert!(errors.contains(&ValidationError::WaitTooLong { got: 50, max: 10 }));
    }
}

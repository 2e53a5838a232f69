//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Resolve string tags (session backend, stop order) into typed values
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DdnsConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::DdnsConfig;
use crate::lifecycle::StopOrder;
use crate::session::SessionBackendKind;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid session backend: {0}")]
    UnknownSessionBackend(String),

    #[error("invalid stop order: {0} (expected \"lifo\" or \"fifo\")")]
    UnknownStopOrder(String),

    #[error("{field} must be {expected}, got {actual}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        actual: String,
    },

    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl DdnsConfig {
    /// The configured session backend as a typed value.
    pub fn session_backend(&self) -> Result<SessionBackendKind, ValidationError> {
        self.session
            .backend
            .parse()
            .map_err(|_| ValidationError::UnknownSessionBackend(self.session.backend.clone()))
    }

    /// The configured stop hook order as a typed value.
    pub fn stop_order(&self) -> Result<StopOrder, ValidationError> {
        self.lifecycle
            .stop_order
            .parse()
            .map_err(|_| ValidationError::UnknownStopOrder(self.lifecycle.stop_order.clone()))
    }
}

/// Check a parsed configuration, collecting every problem.
pub fn validate_config(config: &DdnsConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.session_backend() {
        Ok(SessionBackendKind::Redis) if config.redis.host.trim().is_empty() => {
            errors.push(ValidationError::Empty("redis.host"));
        }
        Ok(_) => {}
        Err(e) => errors.push(e),
    }

    if config.session.maxage < 0 {
        errors.push(ValidationError::OutOfRange {
            field: "session.maxage",
            expected: ">= 0",
            actual: config.session.maxage.to_string(),
        });
    }

    if config.session.sweep_interval_secs == 0 {
        errors.push(ValidationError::OutOfRange {
            field: "session.sweep_interval_secs",
            expected: "> 0",
            actual: "0".to_string(),
        });
    }

    if let Err(e) = config.stop_order() {
        errors.push(e);
    }

    if config.lifecycle.stop_timeout_secs == 0 {
        errors.push(ValidationError::OutOfRange {
            field: "lifecycle.stop_timeout_secs",
            expected: "> 0",
            actual: "0".to_string(),
        });
    }

    if config.server.enable_web {
        if config.web.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                field: "web.bind_address",
                value: config.web.bind_address.clone(),
            });
        }
        if config.web.request_timeout_secs == 0 {
            errors.push(ValidationError::OutOfRange {
                field: "web.request_timeout_secs",
                expected: "> 0",
                actual: "0".to_string(),
            });
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

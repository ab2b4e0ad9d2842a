//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, worker counts, request limits)
//! - Reject empty locations the server cannot run without
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs after CLI overrides are merged, before anything is written

use std::fmt;

use crate::config::schema::BridgeConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.host.trim().is_empty() {
        errors.push(ValidationError::new("listener.host", "must not be empty"));
    }
    if config.listener.port == 0 {
        errors.push(ValidationError::new("listener.port", "must be between 1 and 65535"));
    }
    if config.workers.count == 0 {
        errors.push(ValidationError::new("workers.count", "must be at least 1"));
    }
    if config.workers.max_requests == 0 {
        errors.push(ValidationError::new("workers.max_requests", "must be at least 1"));
    }
    if config.workers.max_body_size == 0 {
        errors.push(ValidationError::new("workers.max_body_size", "must be at least 1"));
    }
    if config
        .paths
        .state_file
        .as_ref()
        .is_some_and(|p| p.as_os_str().is_empty())
    {
        errors.push(ValidationError::new("paths.state_file", "must not be empty"));
    }
    if config.paths.storage.as_os_str().is_empty() && config.paths.state_file.is_none() {
        errors.push(ValidationError::new(
            "paths.storage",
            "must not be empty when no state file is configured",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

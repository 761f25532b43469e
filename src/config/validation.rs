//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes > 0, addresses parse, CORS origin is a header value)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("listener.max_body_size must be greater than zero")]
    MaxBodySize,

    #[error("cors.origin '{0}' is not a valid header value")]
    CorsOrigin(String),

    #[error("fetch.chunk_size must be greater than zero")]
    ChunkSize,

    #[error("fetch.event_buffer must be greater than zero")]
    EventBuffer,

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),
}

/// Check `config`, collecting every error.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::MaxBodySize);
    }
    if config.cors.enabled() && HeaderValue::from_str(&config.cors.origin).is_err() {
        errors.push(ValidationError::CorsOrigin(config.cors.origin.clone()));
    }
    if config.fetch.chunk_size == 0 {
        errors.push(ValidationError::ChunkSize);
    }
    if config.fetch.event_buffer == 0 {
        errors.push(ValidationError::EventBuffer);
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

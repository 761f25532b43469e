//! Startup configuration resolution.
//!
//! Order: config file (or defaults) → command-line overrides → validation.
//! Any error here is fatal.

use std::path::PathBuf;

use crate::config::{load_config, validate_config, ConfigError, ServerConfig};

/// Values given on the command line; each one overrides the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub cors: Option<String>,
    pub log_level: Option<String>,
}

/// Build the effective configuration.
pub fn resolve_config(overrides: &Overrides) -> Result<ServerConfig, ConfigError> {
    let mut config = match &overrides.config_path {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    if let Some(port) = overrides.port {
        config.listener.set_port(port);
    }
    if let Some(origin) = &overrides.cors {
        config.cors.origin = origin.clone();
    }
    if let Some(level) = &overrides.log_level {
        config.observability.log_level = level.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

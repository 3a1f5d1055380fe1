//! Configuration loading and management
//!
//! This module handles loading configuration from files and environment variables.
//! Two file formats are accepted: JSON (text starting with `{`) and the
//! line-oriented `key: value` format below.
//!
//! ```text
//! # comment
//! port: 8080
//! route: 10.0.0.1 10.0.0.2:8080
//! control_path: /tmp/tcproxy.cmd
//! ```

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info};

use super::types::Config;
use crate::error::ConfigError;

/// Overrides the listen port
pub const ENV_PORT: &str = "TCPROXY_PORT";
/// Overrides the log level
pub const ENV_LOG_LEVEL: &str = "TCPROXY_LOG_LEVEL";
/// Overrides the control channel path
pub const ENV_CONTROL_PATH: &str = "TCPROXY_CONTROL_PATH";
/// Overrides the registry size
pub const ENV_MAX_CONNECTIONS: &str = "TCPROXY_MAX_CONNECTIONS";

/// Load configuration from a file
///
/// # Arguments
///
/// * `path` - Path to the configuration file
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed or validated.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    debug!("Loading configuration from {:?}", path);

    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let contents = std::fs::read_to_string(path)?;
    let config = load_config_str(&contents)?;

    info!(
        "Configuration loaded: port {}, {} route(s)",
        config.port,
        config.routes.len()
    );

    Ok(config)
}

/// Load configuration from a string
///
/// # Errors
///
/// Returns `ConfigError` if parsing or validation fails.
pub fn load_config_str(text: &str) -> Result<Config, ConfigError> {
    let config = if text.trim_start().starts_with('{') {
        serde_json::from_str(text)
            .map_err(|e| ConfigError::ParseError(format!("Failed to parse JSON: {e}")))?
    } else {
        parse_lines(text)?
    };

    config.validate()?;

    Ok(config)
}

/// Load configuration with environment variable overrides
///
/// Environment variables:
/// - `TCPROXY_PORT`: Override listen port
/// - `TCPROXY_LOG_LEVEL`: Override log level
/// - `TCPROXY_CONTROL_PATH`: Override control channel path
/// - `TCPROXY_MAX_CONNECTIONS`: Override registry size
///
/// # Errors
///
/// Returns `ConfigError` if loading, parsing or an override fails.
pub fn load_config_with_env(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let config = load_config(path)?;
    apply_env_overrides(config, |name| std::env::var(name).ok())
}

/// Apply overrides from `lookup` and re-validate
///
/// # Errors
///
/// Returns `ConfigError::EnvError` for values that do not parse and
/// `ConfigError::ValidationError` if the result is invalid.
pub fn apply_env_overrides<F>(mut config: Config, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup(ENV_PORT) {
        config.port = port.parse().map_err(|_| ConfigError::EnvError {
            name: ENV_PORT.into(),
            reason: format!("Invalid port: {port}"),
        })?;
        debug!("Listen port overridden to {}", config.port);
    }

    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.log.level = level;
        debug!("Log level overridden to {}", config.log.level);
    }

    if let Some(path) = lookup(ENV_CONTROL_PATH) {
        config.control.path = Some(PathBuf::from(path));
        debug!("Control path overridden to {:?}", config.control.path);
    }

    if let Some(max) = lookup(ENV_MAX_CONNECTIONS) {
        config.reactor.max_connections = max.parse().map_err(|_| ConfigError::EnvError {
            name: ENV_MAX_CONNECTIONS.into(),
            reason: format!("Invalid number: {max}"),
        })?;
        debug!(
            "Max connections overridden to {}",
            config.reactor.max_connections
        );
    }

    // Re-validate after overrides
    config.validate()?;

    Ok(config)
}

fn parse_lines(text: &str) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            debug!("Ignoring line {line_no}: {line:?}");
            continue;
        };
        let value = value.trim();

        match key.trim().to_ascii_lowercase().as_str() {
            "port" => {
                // First one wins
                if config.port == 0 {
                    config.port = parse_value(line_no, "port", value)?;
                }
            }
            "route" => config.routes.push(value.to_owned()),
            "log_level" => config.log.level = value.to_owned(),
            "log_format" => config.log.format = value.to_owned(),
            "control" => config.control.enabled = parse_value(line_no, "control", value)?,
            "control_path" => config.control.path = Some(PathBuf::from(value)),
            "lock_path" => config.instance.lock_path = Some(PathBuf::from(value)),
            "max_connections" => {
                config.reactor.max_connections = parse_value(line_no, "max_connections", value)?;
            }
            "backlog" => config.reactor.backlog = parse_value(line_no, "backlog", value)?,
            other => debug!("Ignoring unknown key {other:?} on line {line_no}"),
        }
    }

    Ok(config)
}

fn parse_value<T>(line_no: usize, key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e| {
        ConfigError::ParseError(format!("line {line_no}: invalid {key} {value:?}: {e}"))
    })
}

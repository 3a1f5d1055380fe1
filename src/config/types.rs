//! Configuration types for tcproxy
//!
//! This module defines all configuration structures used by the proxy.
//! Configuration is loaded from a line-oriented file or JSON and validated
//! once at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default size of the descriptor registry
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Default listen backlog
pub const DEFAULT_BACKLOG: i32 = 5;

/// Directory holding the control channel and lock file when no path is given
pub const RUNTIME_DIR: &str = "/tmp";

/// Listener, plus one relayed pair
const MIN_SLOTS: usize = 3;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Port to listen on, on every local IPv4 address
    #[serde(default)]
    pub port: u16,

    /// Route lines in `<source-host> <target-host>:<port>` form
    #[serde(default)]
    pub routes: Vec<String>,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Control channel configuration
    #[serde(default)]
    pub control: ControlConfig,

    /// Single-instance guard configuration
    #[serde(default)]
    pub instance: InstanceConfig,

    /// Descriptor registry and listener sizing
    #[serde(default)]
    pub reactor: ReactorConfig,
}

impl Config {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ValidationError(
                "A listen port (1-65535) must be configured".into(),
            ));
        }

        self.log.validate()?;
        self.reactor.validate()?;

        Ok(())
    }

    /// Fill unset control and lock paths from the program name
    ///
    /// `tcproxy` gets `/tmp/tcproxy.cmd` and `/tmp/tcproxy.lock`.
    #[must_use]
    pub fn with_program_defaults(mut self, program: &str) -> Self {
        if self.control.path.is_none() {
            self.control.path = Some(runtime_path(program, "cmd"));
        }
        if self.instance.lock_path.is_none() {
            self.instance.lock_path = Some(runtime_path(program, "lock"));
        }
        self
    }
}

/// Path of a per-program runtime file under [`RUNTIME_DIR`]
#[must_use]
pub fn runtime_path(program: &str, extension: &str) -> PathBuf {
    Path::new(RUNTIME_DIR).join(format!("{program}.{extension}"))
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Include module targets in log lines
    #[serde(default)]
    pub target: bool,
}

impl LogConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}', expected one of {:?}",
                self.level, valid_levels
            )));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log format '{}', expected one of {:?}",
                self.format, valid_formats
            )));
        }

        Ok(())
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            target: false,
        }
    }
}

/// Control channel (named FIFO) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlConfig {
    /// Create and watch the control channel
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// FIFO path; defaults to `/tmp/<program>.cmd`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Single-instance guard configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstanceConfig {
    /// Refuse to start while another instance holds the lock
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lock file path; defaults to `/tmp/<program>.lock`
    #[serde(default)]
    pub lock_path: Option<PathBuf>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lock_path: None,
        }
    }
}

/// Reactor sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReactorConfig {
    /// Number of descriptor slots (listener, control channel, two per session)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
}

impl ReactorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections < MIN_SLOTS {
            return Err(ConfigError::ValidationError(format!(
                "max_connections must be at least {MIN_SLOTS}, got {}",
                self.max_connections
            )));
        }

        if self.backlog <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "backlog must be positive, got {}",
                self.backlog
            )));
        }

        Ok(())
    }
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            backlog: DEFAULT_BACKLOG,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_backlog() -> i32 {
    DEFAULT_BACKLOG
}

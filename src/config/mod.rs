//! Configuration module for tcproxy
//!
//! This module provides configuration types and loading utilities.
//!
//! # Example
//!
//! ```no_run
//! use tcproxy::config::load_config;
//!
//! let config = load_config("/etc/tcproxy.conf").unwrap();
//! println!("Listening on port {}", config.port);
//! ```

mod loader;
mod types;

pub use loader::{
    apply_env_overrides, load_config, load_config_str, load_config_with_env, ENV_CONTROL_PATH,
    ENV_LOG_LEVEL, ENV_MAX_CONNECTIONS, ENV_PORT,
};
pub use types::{
    runtime_path, Config, ControlConfig, InstanceConfig, LogConfig, ReactorConfig,
    DEFAULT_BACKLOG, DEFAULT_MAX_CONNECTIONS, RUNTIME_DIR,
};

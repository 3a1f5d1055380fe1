//! Error types for tcproxy
//!
//! This module defines the error hierarchy for the forwarding proxy.
//! Errors are grouped by subsystem; would-block and interrupted I/O is
//! filtered out by [`is_transient`] before it ever becomes one of these.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Top-level error type for tcproxy
#[derive(Debug, Error)]
pub enum TcproxyError {
    /// Configuration errors (file parsing, validation)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Listening and outbound socket errors
    #[error("Socket error: {0}")]
    Listen(#[from] ListenError),

    /// Reactor errors (readiness wait, slot exhaustion)
    #[error("Reactor error: {0}")]
    Reactor(#[from] ReactorError),

    /// Route definition and resolution errors
    #[error("Route error: {0}")]
    Route(#[from] RouteError),

    /// Control channel errors
    #[error("Control channel error: {0}")]
    Control(#[from] ControlError),

    /// Single-instance guard errors
    #[error("Instance guard error: {0}")]
    Instance(#[from] InstanceError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Would-block and interrupted results are retried on the next readiness
/// event and never count as failures.
#[must_use]
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found or inaccessible
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Line or JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Validation error (invalid values, missing required fields)
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Environment variable error
    #[error("Environment variable error: {name}: {reason}")]
    EnvError { name: String, reason: String },

    /// I/O error while reading config
    #[error("I/O error reading configuration: {0}")]
    IoError(#[from] io::Error),
}

/// Listening socket and outbound dial errors
#[derive(Debug, Error)]
pub enum ListenError {
    /// Failed to create socket
    #[error("Failed to create socket: {0}")]
    SocketCreation(String),

    /// Failed to set socket option (SO_REUSEADDR, O_NONBLOCK, ...)
    #[error("Failed to set socket option {option}: {reason}")]
    SocketOption { option: String, reason: String },

    /// Failed to bind to address
    #[error("Failed to bind to {addr}: {reason}")]
    BindError { addr: SocketAddr, reason: String },

    /// Outbound connect failed immediately (not "in progress")
    #[error("Failed to connect to {addr}: {reason}")]
    ConnectError { addr: SocketAddr, reason: String },
}

impl ListenError {
    /// Create a socket option error
    pub fn socket_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SocketOption {
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// Create a bind error
    pub fn bind(addr: SocketAddr, reason: impl Into<String>) -> Self {
        Self::BindError {
            addr,
            reason: reason.into(),
        }
    }

    /// Create a connect error
    pub fn connect(addr: SocketAddr, reason: impl Into<String>) -> Self {
        Self::ConnectError {
            addr,
            reason: reason.into(),
        }
    }
}

/// Reactor errors
#[derive(Debug, Error)]
pub enum ReactorError {
    /// Every registry slot is in use
    #[error("Descriptor registry exhausted ({capacity} slots)")]
    Exhausted { capacity: usize },

    /// The readiness wait itself failed
    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),
}

/// Route definition and resolution errors
#[derive(Debug, Error)]
pub enum RouteError {
    /// Route string does not match `<source-host> <target-host>:<port>`
    #[error("Invalid route \"{0}\"")]
    InvalidFormat(String),

    /// Host name resolution failed
    #[error("Failed to resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    /// Resolution succeeded but produced no IPv4 or IPv6 address
    #[error("No IPv4 nor IPv6 addresses available for {host}")]
    NoAddress { host: String },

    /// No route was added or updated for the source
    #[error("No route added for {host}")]
    NoRoutes { host: String },
}

impl RouteError {
    /// Create an invalid format error
    pub fn invalid(route: impl Into<String>) -> Self {
        Self::InvalidFormat(route.into())
    }

    /// Create a resolve error
    pub fn resolve(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolve {
            host: host.into(),
            reason: reason.into(),
        }
    }
}

/// Control channel errors
#[derive(Debug, Error)]
pub enum ControlError {
    /// Command keyword not recognized
    #[error("Unknown command \"{0}\"")]
    UnknownCommand(String),

    /// `add` arguments could not be parsed
    #[error("Malformed add command: {0}")]
    MalformedAdd(#[source] RouteError),

    /// Failed to create the FIFO
    #[error("Failed to create control channel at {path}: {reason}")]
    ChannelCreate { path: String, reason: String },

    /// Failed to open the FIFO
    #[error("Failed to open control channel at {path}: {reason}")]
    ChannelOpen { path: String, reason: String },

    /// No process is reading the FIFO
    #[error("No running instance is listening on {path}")]
    NotListening { path: String },

    /// Command text exceeds the channel buffer
    #[error("Command exceeds {max} bytes")]
    CommandTooLong { max: usize },

    /// I/O error
    #[error("Control channel I/O error: {0}")]
    IoError(#[from] io::Error),
}

/// Single-instance guard errors
#[derive(Debug, Error)]
pub enum InstanceError {
    /// Another process holds the lock
    #[error("Another instance is already running (lock held on {path})")]
    AlreadyRunning { path: String },

    /// Lock file could not be opened or locked
    #[error("Cannot lock {path}: {reason}")]
    LockFile { path: String, reason: String },
}

/// Type alias for Result with `TcproxyError`
pub type Result<T> = std::result::Result<T, TcproxyError>;

//! tcproxy: single-threaded TCP forwarding proxy with source-address routing
//!
//! Inbound connections are matched by client address against a route table
//! and relayed byte for byte to the route's target. Routes can be added and
//! the proxy stopped at runtime through a named FIFO.
//!
//! # Features
//!
//! - **Source routing**: one target per client address, one session per route
//! - **Event-driven relay**: one thread, one `poll(2)` loop, 512-byte buffers
//! - **Runtime control**: `add` and `exit` commands over a control FIFO
//! - **Single instance**: advisory lock file guard
//!
//! # Architecture
//!
//! ```text
//! Client → listener → route lookup → outbound connect → Target
//!             ↑                                   │
//!        control FIFO (add / exit)        relay both directions
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use tcproxy::config::load_config;
//! use tcproxy::TcpProxy;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("/etc/tcproxy.conf")?.with_program_defaults("tcproxy");
//! let mut proxy = TcpProxy::new(&config)?;
//! proxy.run()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration types and loading
//! - [`control`]: Control channel and commands
//! - [`error`]: Error types
//! - [`instance`]: Single-instance guard
//! - [`proxy`]: Startup and run loop
//! - [`reactor`]: Descriptor registry and readiness dispatch
//! - [`relay`]: Connection relay state machine
//! - [`routes`]: Route parsing, resolution and table

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod control;
pub mod error;
pub mod instance;
pub mod proxy;
pub mod reactor;
pub mod relay;
pub mod routes;

// Re-export commonly used types at the crate root
pub use config::{Config, LogConfig};
pub use control::{ControlChannel, ControlClient, ControlCommand};
pub use error::{
    ConfigError, ControlError, InstanceError, ListenError, ReactorError, RouteError,
    TcproxyError,
};
pub use instance::InstanceGuard;
pub use proxy::TcpProxy;
pub use reactor::{Dispatch, Reactor, Registry, Token};
pub use relay::{Relay, RelayStats};
pub use routes::{Resolver, Route, RouteSpec, RouteTable, SystemResolver};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

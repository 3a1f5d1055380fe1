//! Proxy assembly and run loop
//!
//! [`TcpProxy`] binds the listener, creates the control channel, loads the
//! configured routes and then drives the reactor until an `exit` command
//! arrives.

use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;

use tracing::{info, warn};

use crate::config::Config;
use crate::control::ControlChannel;
use crate::error::{Result, RouteError};
use crate::reactor::{Endpoint, Handler, Reactor};
use crate::relay::{socket, Relay, RelayStats};
use crate::routes::{Resolver, RouteSpec, RouteTable, SystemResolver};

/// A started proxy, ready to [`run`](Self::run)
#[derive(Debug)]
pub struct TcpProxy<R = SystemResolver> {
    reactor: Reactor,
    relay: Relay<R>,
    local_addr: SocketAddr,
}

impl TcpProxy<SystemResolver> {
    /// Start a proxy resolving hosts through the system resolver
    ///
    /// # Errors
    ///
    /// Returns an error if the listener or the control channel cannot be
    /// set up. Route lines that fail are skipped with a warning.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_resolver(config, SystemResolver)
    }
}

impl<R: Resolver> TcpProxy<R> {
    /// Start a proxy with a custom resolver
    ///
    /// # Errors
    ///
    /// Returns an error if the listener or the control channel cannot be
    /// set up.
    pub fn with_resolver(config: &Config, resolver: R) -> Result<Self> {
        let mut reactor = Reactor::new(config.reactor.max_connections);
        let mut relay = Relay::new(resolver);

        let listener = socket::bind_listener(config.port, config.reactor.backlog)?;
        let local_addr = listener.local_addr()?;
        let listen_fd = listener.as_raw_fd();
        reactor.registry_mut().register(
            Endpoint::Listener(listener),
            None,
            Some(Handler::Accept),
            None,
        )?;

        if config.control.enabled {
            match &config.control.path {
                Some(path) => {
                    let channel = ControlChannel::create(path)?;
                    relay.attach_control(reactor.registry_mut(), channel)?;
                }
                None => warn!("Control channel enabled but no path configured"),
            }
        }

        let loaded = relay.load_routes(reactor.registry_mut(), &config.routes);
        if loaded < config.routes.len() {
            warn!(
                "{} of {} configured route(s) skipped",
                config.routes.len() - loaded,
                config.routes.len()
            );
        }

        relay.start();
        info!(
            "------- Starting TCP proxy on port {} (fd={}, {} route(s)) -------",
            local_addr.port(),
            listen_fd,
            relay.routes().len()
        );

        Ok(Self {
            reactor,
            relay,
            local_addr,
        })
    }

    /// Bound listener address; the port is the kernel's pick when 0 was configured
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub const fn routes(&self) -> &RouteTable {
        self.relay.routes()
    }

    #[must_use]
    pub const fn stats(&self) -> &RelayStats {
        self.relay.stats()
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.relay.is_running()
    }

    /// Add a route outside the control channel
    ///
    /// # Errors
    ///
    /// Returns `RouteError` if a host fails to resolve.
    pub fn add_route(&mut self, spec: &RouteSpec) -> std::result::Result<usize, RouteError> {
        self.relay.add_route(self.reactor.registry_mut(), spec)
    }

    /// Run one readiness wait and dispatch
    ///
    /// # Errors
    ///
    /// Returns an error if the readiness wait fails.
    pub fn run_once(&mut self) -> Result<usize> {
        Ok(self.reactor.run_once(&mut self.relay)?)
    }

    /// Serve until an `exit` command is received
    ///
    /// # Errors
    ///
    /// Returns an error if the readiness wait fails.
    pub fn run(&mut self) -> Result<()> {
        info!("Waiting for connections on {}", self.local_addr);

        while self.relay.is_running() {
            self.reactor.run_once(&mut self.relay)?;
        }

        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        let stats = *self.relay.stats();
        let registry = self.reactor.registry_mut();
        info!(
            accepted = stats.accepted(),
            relayed = stats.relayed(),
            rejected = stats.rejected(),
            closed = stats.closed(),
            bytes = stats.bytes_relayed(),
            "Shutting down, closing {} descriptor(s)",
            registry.len()
        );
        registry.clear();
    }
}

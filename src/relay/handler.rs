//! Connection relay
//!
//! [`Relay`] is the reactor's dispatcher. Per accepted client it walks one
//! pair of descriptors through
//!
//! ```text
//! ACCEPTED -> CONNECTING -> RELAYING -> CLOSED
//! ```
//!
//! Each side of a pair reads into its peer's buffer and flushes its own.
//! A side only reads while the peer's buffer is drained, so at most 512
//! bytes are in flight per direction. Either side closing, or any hard
//! error, tears down both and frees the route.
//!
//! The relay also owns the route table and the control channel.

use std::io;
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;

use tracing::{debug, error, info, trace, warn};

use super::socket;
use super::stats::RelayStats;
use crate::control::{ControlChannel, ControlCommand, MAX_COMMAND_LEN};
use crate::error::{is_transient, ControlError, Result, RouteError};
use crate::reactor::{Dispatch, Endpoint, Handler, Registry, Token};
use crate::routes::{Resolver, RouteChange, RouteSpec, RouteTable, SystemResolver};

/// What a read did to a pair
enum ReadOutcome {
    Data(usize),
    Eof,
    HungUp(usize),
    PeerGone,
    Failed(io::Error),
}

/// What a control channel read produced
enum CommandOutcome {
    Complete(String),
    Overflow,
    Failed(io::Error),
}

/// Dispatcher owning routes, control channel and run state
#[derive(Debug)]
pub struct Relay<R = SystemResolver> {
    routes: RouteTable,
    resolver: R,
    control: Option<ControlChannel>,
    running: bool,
    stats: RelayStats,
}

impl<R: Resolver> Relay<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            routes: RouteTable::new(),
            resolver,
            control: None,
            running: false,
            stats: RelayStats::new(),
        }
    }

    #[must_use]
    pub const fn routes(&self) -> &RouteTable {
        &self.routes
    }

    #[must_use]
    pub const fn stats(&self) -> &RelayStats {
        &self.stats
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Mark startup as complete
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Leave the loop after the current pass
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Take ownership of the control channel and start watching it
    ///
    /// # Errors
    ///
    /// Returns an error if the FIFO cannot be opened or the registry is full.
    pub fn attach_control(
        &mut self,
        registry: &mut Registry,
        channel: ControlChannel,
    ) -> Result<Token> {
        let token = arm_control(registry, &channel)?;
        self.control = Some(channel);
        Ok(token)
    }

    /// Add routes from config lines, skipping the ones that fail
    ///
    /// Returns the number of lines that produced at least one route.
    pub fn load_routes(&mut self, registry: &mut Registry, lines: &[String]) -> usize {
        let mut loaded = 0;
        for line in lines {
            let result = line
                .parse::<RouteSpec>()
                .and_then(|spec| self.add_route(registry, &spec));
            match result {
                Ok(_) => loaded += 1,
                Err(e) => warn!("Skipping route \"{}\": {}", line.trim(), e),
            }
        }
        loaded
    }

    /// Resolve `spec` and insert or retarget one route per source address
    ///
    /// A route that currently carries a session has that session closed
    /// before it is retargeted.
    ///
    /// # Errors
    ///
    /// Returns `RouteError` if either host fails to resolve; nothing is
    /// changed in that case.
    pub fn add_route(
        &mut self,
        registry: &mut Registry,
        spec: &RouteSpec,
    ) -> std::result::Result<usize, RouteError> {
        let target_ip = self
            .resolver
            .resolve(&spec.target_host)?
            .into_iter()
            .next()
            .ok_or_else(|| RouteError::NoAddress {
                host: spec.target_host.clone(),
            })?;
        let target = SocketAddr::new(target_ip, spec.target_port);

        let mut sources = self.resolver.resolve(&spec.source_host)?;
        let mut seen = Vec::with_capacity(sources.len());
        sources.retain(|ip| {
            let first = !seen.contains(ip);
            seen.push(*ip);
            first
        });

        let mut count = 0;
        for source in sources {
            info!(
                "Adding route {} ({}) --> {}:{} ({})",
                spec.source_host, source, spec.target_host, spec.target_port, target_ip
            );

            let stats = &mut self.stats;
            let change = self.routes.upsert(source, target, |session| {
                if teardown_pair(registry, session) {
                    stats.record_closed();
                }
            });
            match change {
                RouteChange::Inserted => {}
                RouteChange::Updated => debug!("Route for {} retargeted", source),
                RouteChange::Replaced { closed } => warn!(
                    "Duplicated route for {}: closed active session {}",
                    source, closed
                ),
            }
            count += 1;
        }

        if count == 0 {
            return Err(RouteError::NoRoutes {
                host: spec.source_host.clone(),
            });
        }

        info!("{} route(s) added for \"{}\"", count, spec);
        Ok(count)
    }

    /// Carry out a control command
    pub fn execute(&mut self, registry: &mut Registry, command: ControlCommand) {
        match command {
            ControlCommand::Exit => {
                info!("Exit requested");
                self.stop();
            }
            ControlCommand::Add(spec) => {
                if let Err(e) = self.add_route(registry, &spec) {
                    warn!("Failed to add route \"{}\": {}", spec, e);
                }
            }
        }
    }

    /// Deregister each token and release any route it held
    pub fn close(&mut self, registry: &mut Registry, tokens: &[Token]) {
        for &token in tokens {
            if let Some(entry) = registry.deregister(token) {
                debug!("Closed fd={} ({})", entry.fd(), token);
            }
            if let Some(source) = self.routes.release(token) {
                debug!("Route for {} is free again", source);
            }
        }
    }

    fn close_pair(&mut self, registry: &mut Registry, token: Token, peer: Token) {
        self.close(registry, &[token, peer]);
        self.stats.record_closed();
    }

    fn on_accept(&mut self, registry: &mut Registry, listener: Token) {
        let accepted = match registry
            .get(listener)
            .and_then(|entry| entry.endpoint().as_listener())
        {
            Some(listener) => listener.accept(),
            None => return,
        };

        let (stream, client_addr) = match accepted {
            Ok(pair) => pair,
            Err(e) if is_transient(&e) => return,
            Err(e) => {
                warn!("Accept error on {}: {}", listener, e);
                return;
            }
        };
        self.stats.record_accepted();

        let source = client_addr.ip().to_canonical();
        let target = match self.routes.find(source) {
            None => {
                info!("No route for {}, closing connection", source);
                self.stats.record_rejected_no_route();
                return;
            }
            Some(route) if route.is_active() => {
                warn!(
                    "Route for {} is busy with session {:?}, closing connection",
                    source,
                    route.active()
                );
                self.stats.record_rejected_busy();
                return;
            }
            Some(route) => route.target(),
        };

        if registry.available() < 2 {
            warn!(
                "No room for another pair ({} slots), closing connection from {}",
                registry.capacity(),
                client_addr
            );
            self.stats.record_rejected_capacity();
            return;
        }

        if let Err(e) = socket::prepare_accepted(&stream) {
            warn!("Failed to configure connection from {}: {}", client_addr, e);
            return;
        }

        let outbound = match socket::connect_nonblocking(target) {
            Ok(outbound) => outbound,
            Err(e) => {
                warn!("{}, closing connection from {}", e, client_addr);
                self.stats.record_failed_connect();
                return;
            }
        };

        let (client_fd, target_fd) = (stream.as_raw_fd(), outbound.as_raw_fd());
        match registry.register_pair(
            Endpoint::Stream(stream),
            Endpoint::Stream(outbound),
            Handler::Read,
            Handler::Write,
        ) {
            Ok((client, _)) => {
                self.routes.activate(source, client);
                self.stats.record_relayed();
                info!(
                    "Connection proxied: {} (fd={}) --> {} (fd={})",
                    client_addr, client_fd, target, target_fd
                );
            }
            Err(e) => {
                warn!("{}, closing connection from {}", e, client_addr);
                self.stats.record_rejected_capacity();
            }
        }
    }

    fn on_read(&mut self, registry: &mut Registry, token: Token) {
        let Some(entry) = registry.get(token) else {
            return;
        };
        let Some(peer) = entry.peer() else {
            warn!("{} has no peer, closing", token);
            self.close(registry, &[token]);
            return;
        };

        let outcome = match registry.pair_mut(token, peer) {
            None => ReadOutcome::PeerGone,
            Some((entry, peer_entry)) => {
                if peer_entry.buffer().is_empty() {
                    match entry.read_into(peer_entry.buffer_mut()) {
                        Ok(0) => ReadOutcome::Eof,
                        Ok(n) => ReadOutcome::Data(n),
                        Err(e) if is_transient(&e) => return,
                        Err(e) => ReadOutcome::Failed(e),
                    }
                } else if entry.hung_up() {
                    // Hang-up is reported even while reading is paused
                    ReadOutcome::HungUp(peer_entry.buffer().len())
                } else {
                    // Peer still flushing the previous chunk
                    return;
                }
            }
        };

        match outcome {
            ReadOutcome::Data(n) => {
                trace!("{} read {} bytes for {}", token, n, peer);
                self.stats.record_bytes(n);
            }
            ReadOutcome::Eof => {
                debug!("{} closed by remote", token);
                self.close_pair(registry, token, peer);
            }
            ReadOutcome::HungUp(pending) => {
                debug!("{} hung up with {} bytes still queued for {}", token, pending, peer);
                self.close_pair(registry, token, peer);
            }
            ReadOutcome::PeerGone => {
                debug!("{} lost its peer {}", token, peer);
                self.close_pair(registry, token, peer);
            }
            ReadOutcome::Failed(e) => {
                debug!("{} read error: {}", token, e);
                self.close_pair(registry, token, peer);
            }
        }
    }

    fn on_write(&mut self, registry: &mut Registry, token: Token) {
        let Some(entry) = registry.get_mut(token) else {
            return;
        };
        if entry.buffer().is_empty() {
            return;
        }
        let peer = entry.peer();

        let failure = match entry.flush_buffer() {
            Ok(0) => Some(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => {
                trace!("{} wrote {} bytes", token, n);
                None
            }
            Err(e) if is_transient(&e) => None,
            Err(e) => Some(e),
        };

        if let Some(e) = failure {
            debug!("{} write error: {}", token, e);
            match peer {
                Some(peer) => self.close_pair(registry, token, peer),
                None => self.close(registry, &[token]),
            }
        }
    }

    fn on_command(&mut self, registry: &mut Registry, token: Token) {
        let outcome = {
            let Some(entry) = registry.get_mut(token) else {
                return;
            };
            if entry.buffer().is_full() {
                // A command of exactly MAX_COMMAND_LEN bytes ends here
                match entry.at_eof() {
                    Ok(true) => CommandOutcome::Complete(command_text(entry.buffer().filled())),
                    Ok(false) => CommandOutcome::Overflow,
                    Err(e) if is_transient(&e) => return,
                    Err(e) => CommandOutcome::Failed(e),
                }
            } else {
                match entry.read_into_own() {
                    Ok(0) => CommandOutcome::Complete(command_text(entry.buffer().filled())),
                    Ok(n) => {
                        trace!("Control channel: {} bytes buffered", n);
                        return;
                    }
                    Err(e) if is_transient(&e) => return,
                    Err(e) => CommandOutcome::Failed(e),
                }
            }
        };

        match outcome {
            CommandOutcome::Complete(text) if text.is_empty() => {
                debug!("Empty control command ignored");
            }
            CommandOutcome::Complete(text) => {
                info!("Control command \"{}\"", text);
                match text.parse::<ControlCommand>() {
                    Ok(command) => self.execute(registry, command),
                    Err(e) => warn!("{}", e),
                }
            }
            CommandOutcome::Overflow => {
                warn!(
                    "{}, discarded",
                    ControlError::CommandTooLong {
                        max: MAX_COMMAND_LEN
                    }
                );
            }
            CommandOutcome::Failed(e) => warn!("Control channel read error: {}", e),
        }

        if self.running {
            self.reopen_control(registry, token);
        }
    }

    /// The FIFO is single-shot per writer; swap in a fresh read end
    fn reopen_control(&mut self, registry: &mut Registry, token: Token) {
        registry.deregister(token);
        let Some(channel) = &self.control else {
            return;
        };
        match arm_control(registry, channel) {
            Ok(token) => debug!("Control channel reopened as {}", token),
            Err(e) => error!("Control channel unavailable: {}", e),
        }
    }
}

impl<R: Resolver> Dispatch for Relay<R> {
    fn dispatch(&mut self, registry: &mut Registry, handler: Handler, token: Token) {
        match handler {
            Handler::Accept => self.on_accept(registry, token),
            Handler::Read => self.on_read(registry, token),
            Handler::Write => self.on_write(registry, token),
            Handler::Command => self.on_command(registry, token),
        }
    }
}

fn command_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_string()
}

fn arm_control(registry: &mut Registry, channel: &ControlChannel) -> Result<Token> {
    let fifo = channel.open()?;
    let token = registry.register(Endpoint::Control(fifo), None, Some(Handler::Command), None)?;
    Ok(token)
}

/// Close a session's descriptor and its peer
fn teardown_pair(registry: &mut Registry, token: Token) -> bool {
    let Some(entry) = registry.deregister(token) else {
        return false;
    };
    if let Some(peer) = entry.peer() {
        registry.deregister(peer);
    }
    debug!("Session {} torn down", token);
    true
}

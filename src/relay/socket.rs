//! Socket setup for the relay
//!
//! - Listener: IPv4 on every local address, `SO_REUSEADDR`, nonblocking
//! - Accepted clients: nonblocking, `SO_KEEPALIVE`
//! - Outbound: target's address family, nonblocking, `SO_KEEPALIVE`, with a
//!   connect that completes in the background

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tracing::{debug, info};

use crate::error::ListenError;

/// Create the listening socket on `0.0.0.0:port`
///
/// # Errors
///
/// Returns `ListenError` if the socket cannot be created, configured, bound
/// or put into listening state.
pub fn bind_listener(port: u16, backlog: i32) -> Result<TcpListener, ListenError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| ListenError::SocketCreation(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| ListenError::socket_option("SO_REUSEADDR", e.to_string()))?;

    socket
        .bind(&addr.into())
        .map_err(|e| ListenError::bind(addr, e.to_string()))?;

    socket
        .set_nonblocking(true)
        .map_err(|e| ListenError::socket_option("O_NONBLOCK", e.to_string()))?;

    socket
        .listen(backlog)
        .map_err(|e| ListenError::bind(addr, format!("listen failed: {e}")))?;

    let listener: TcpListener = socket.into();
    info!(
        "Listening on {} (backlog {})",
        listener.local_addr().unwrap_or(addr),
        backlog
    );

    Ok(listener)
}

/// Prepare an accepted client socket for relaying
///
/// # Errors
///
/// Returns the underlying I/O error if an option cannot be set.
pub fn prepare_accepted(stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(true)?;
    SockRef::from(stream).set_keepalive(true)?;
    Ok(())
}

/// Start a nonblocking connect to `target`
///
/// The returned stream may still be connecting; the first write surfaces
/// any failure.
///
/// # Errors
///
/// Returns `ListenError` if the socket cannot be set up or the connect
/// fails immediately.
pub fn connect_nonblocking(target: SocketAddr) -> Result<TcpStream, ListenError> {
    let socket = Socket::new(Domain::for_address(target), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| ListenError::SocketCreation(e.to_string()))?;

    socket
        .set_nonblocking(true)
        .map_err(|e| ListenError::socket_option("O_NONBLOCK", e.to_string()))?;

    socket
        .set_keepalive(true)
        .map_err(|e| ListenError::socket_option("SO_KEEPALIVE", e.to_string()))?;

    match socket.connect(&target.into()) {
        Ok(()) => debug!("Connected to {} immediately", target),
        Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {
            debug!("Connecting to {}", target);
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            debug!("Connecting to {}", target);
        }
        Err(e) => return Err(ListenError::connect(target, e.to_string())),
    }

    Ok(socket.into())
}

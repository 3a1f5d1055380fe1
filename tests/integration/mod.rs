//! Integration tests for tcproxy
//!
//! Each test starts a real proxy on an ephemeral port in its own thread,
//! with the control channel in a temporary directory, and talks to it over
//! loopback.
//!
//! # Test Organization
//!
//! - `relay_e2e`: byte relaying, rejection of unrouted and busy clients
//! - `control_channel`: `add` and `exit` over the FIFO
//!
//! # Test Requirements
//!
//! - Loopback networking only
//! - A writable temporary directory for the FIFO

pub mod control_channel;
pub mod relay_e2e;

use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use tcproxy::{Config, ControlClient, TcpProxy};

/// Upper bound on any single wait in these tests
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Time for the proxy to act on a delivered command
const SETTLE: Duration = Duration::from_millis(200);

/// A proxy running on its own thread
pub struct ProxyHarness {
    addr: SocketAddr,
    control_path: PathBuf,
    handle: Option<JoinHandle<tcproxy::error::Result<()>>>,
    _dir: TempDir,
}

impl ProxyHarness {
    /// Start a proxy with the given route lines
    pub fn start(routes: &[String]) -> Self {
        let dir = TempDir::new().unwrap();
        let control_path = dir.path().join("tcproxy.cmd");

        let mut config = Config::default();
        config.control.path = Some(control_path.clone());
        config.routes = routes.to_vec();

        let mut proxy = TcpProxy::new(&config).unwrap();
        let addr = SocketAddr::from(([127, 0, 0, 1], proxy.local_addr().port()));
        let handle = thread::spawn(move || proxy.run());

        Self {
            addr,
            control_path,
            handle: Some(handle),
            _dir: dir,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn control_path(&self) -> &Path {
        &self.control_path
    }

    /// Connect a client with read/write timeouts set
    pub fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream.set_read_timeout(Some(TIMEOUT)).unwrap();
        stream.set_write_timeout(Some(TIMEOUT)).unwrap();
        stream
    }

    /// Deliver a control command and give the proxy time to act on it
    pub fn send(&self, command: &str) {
        ControlClient::new(&self.control_path).send(command).unwrap();
        thread::sleep(SETTLE);
    }

    /// Send `exit` and wait for the loop to return
    pub fn stop(mut self) -> tcproxy::error::Result<()> {
        self.send("exit");
        let handle = self.handle.take().unwrap();
        join_with_deadline(handle)
    }
}

impl Drop for ProxyHarness {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = ControlClient::new(&self.control_path).send("exit");
            let _ = join_with_deadline(handle);
        }
    }
}

fn join_with_deadline(
    handle: JoinHandle<tcproxy::error::Result<()>>,
) -> tcproxy::error::Result<()> {
    let deadline = Instant::now() + TIMEOUT;
    while !handle.is_finished() {
        assert!(Instant::now() < deadline, "proxy did not stop in time");
        thread::sleep(Duration::from_millis(10));
    }
    handle.join().unwrap()
}

/// A loopback listener standing in for a route target
pub struct Backend {
    listener: TcpListener,
}

impl Backend {
    pub fn new() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        Self { listener }
    }

    pub fn addr(&self) -> SocketAddr {
        self.listener.local_addr().unwrap()
    }

    /// Route line sending loopback clients here
    pub fn route(&self) -> String {
        format!("127.0.0.1 {}", self.addr())
    }

    /// Wait up to `wait` for the proxy to dial in
    pub fn accept_within(&self, wait: Duration) -> Option<TcpStream> {
        let deadline = Instant::now() + wait;
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false).unwrap();
                    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
                    stream.set_write_timeout(Some(TIMEOUT)).unwrap();
                    return Some(stream);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => panic!("backend accept failed: {e}"),
            }
        }
    }

    pub fn accept(&self) -> TcpStream {
        self.accept_within(TIMEOUT)
            .expect("proxy never connected to the backend")
    }
}

/// True once the peer has closed `stream`
pub fn is_closed(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    match stream.read(&mut buf) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) => matches!(
            e.kind(),
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
        ),
    }
}

/// Deterministic, non-repeating-looking test payload
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

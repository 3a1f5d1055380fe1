//! Runtime commands over the control FIFO

use std::io::{Read, Write};
use std::time::Duration;

use tcproxy::{ControlClient, ControlError};

use super::{is_closed, Backend, ProxyHarness};

#[test]
fn test_exit_stops_the_loop() {
    let proxy = ProxyHarness::start(&[]);
    let control_path = proxy.control_path().to_path_buf();
    assert!(control_path.exists());

    proxy.stop().unwrap();

    // The FIFO goes away with the proxy
    assert!(!control_path.exists());
    let result = ControlClient::new(&control_path).send("exit");
    assert!(matches!(result, Err(ControlError::NotListening { .. })));
}

#[test]
fn test_add_route_at_runtime() {
    let backend = Backend::new();
    let proxy = ProxyHarness::start(&[]);

    // No route yet
    let mut client = proxy.connect();
    assert!(is_closed(&mut client));

    proxy.send(&format!("add {}", backend.route()));

    let mut client = proxy.connect();
    let mut server = backend.accept();
    client.write_all(b"routed").unwrap();
    let mut buf = [0u8; 6];
    server.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"routed");

    proxy.stop().unwrap();
}

#[test]
fn test_duplicate_route_replaces_active_session() {
    let old_backend = Backend::new();
    let new_backend = Backend::new();
    let proxy = ProxyHarness::start(&[old_backend.route()]);

    let mut client = proxy.connect();
    let mut old_server = old_backend.accept();

    proxy.send(&format!("ADD {}", new_backend.route()));

    // Both ends of the old session are closed
    assert!(is_closed(&mut client));
    assert!(is_closed(&mut old_server));

    // New connections follow the new target
    let mut client = proxy.connect();
    let mut new_server = new_backend.accept();
    assert!(old_backend
        .accept_within(Duration::from_millis(300))
        .is_none());

    new_server.write_all(b"new target").unwrap();
    let mut buf = [0u8; 10];
    client.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"new target");

    proxy.stop().unwrap();
}

#[test]
fn test_bad_commands_change_nothing() {
    let backend = Backend::new();
    let proxy = ProxyHarness::start(&[backend.route()]);

    proxy.send("reload");
    proxy.send("add 10.0.0.1");
    proxy.send("");

    let mut client = proxy.connect();
    let mut server = backend.accept();
    client.write_all(b"still up").unwrap();
    let mut buf = [0u8; 8];
    server.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"still up");

    proxy.stop().unwrap();
}

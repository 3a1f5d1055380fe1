//! End-to-end relaying through a running proxy

use std::io::{Read, Write};
use std::net::Shutdown;
use std::time::Duration;

use super::{is_closed, payload, Backend, ProxyHarness};

#[test]
fn test_bytes_relayed_both_ways() {
    let backend = Backend::new();
    let proxy = ProxyHarness::start(&[backend.route()]);

    let mut client = proxy.connect();
    let mut server = backend.accept();

    // Larger than one relay buffer in each direction
    let upstream = payload(2000, 7);
    client.write_all(&upstream).unwrap();
    let mut received = vec![0u8; upstream.len()];
    server.read_exact(&mut received).unwrap();
    assert_eq!(received, upstream);

    let downstream = payload(1500, 91);
    server.write_all(&downstream).unwrap();
    let mut received = vec![0u8; downstream.len()];
    client.read_exact(&mut received).unwrap();
    assert_eq!(received, downstream);

    proxy.stop().unwrap();
}

#[test]
fn test_client_close_reaches_target() {
    let backend = Backend::new();
    let proxy = ProxyHarness::start(&[backend.route()]);

    let client = proxy.connect();
    let mut server = backend.accept();

    client.shutdown(Shutdown::Write).unwrap();
    assert!(is_closed(&mut server));

    proxy.stop().unwrap();
}

#[test]
fn test_target_close_reaches_client() {
    let backend = Backend::new();
    let proxy = ProxyHarness::start(&[backend.route()]);

    let mut client = proxy.connect();
    let server = backend.accept();

    drop(server);
    assert!(is_closed(&mut client));

    // The route is free again
    let mut client = proxy.connect();
    let mut server = backend.accept();
    client.write_all(b"again").unwrap();
    let mut buf = [0u8; 5];
    server.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"again");

    proxy.stop().unwrap();
}

#[test]
fn test_unrouted_client_is_closed_without_dialing() {
    let backend = Backend::new();
    let proxy = ProxyHarness::start(&[format!("10.9.9.9 {}", backend.addr())]);

    let mut client = proxy.connect();
    assert!(is_closed(&mut client));
    assert!(backend
        .accept_within(Duration::from_millis(300))
        .is_none());

    proxy.stop().unwrap();
}

#[test]
fn test_second_client_on_busy_route_is_closed() {
    let backend = Backend::new();
    let proxy = ProxyHarness::start(&[backend.route()]);

    let mut first = proxy.connect();
    let mut server = backend.accept();

    let mut second = proxy.connect();
    assert!(is_closed(&mut second));
    assert!(backend
        .accept_within(Duration::from_millis(300))
        .is_none());

    // The first session is unaffected
    first.write_all(b"ping").unwrap();
    let mut buf = [0u8; 4];
    server.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"ping");

    proxy.stop().unwrap();
}

//! Tests for the tcp and pipe backends

use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use wirecall::transport::{self, send_async, Address, Transport};

use crate::common::test_config;

fn exchange(mut client: Box<dyn Transport>, mut server: Box<dyn Transport>) {
    client.write_all(b"ping").unwrap();
    client.flush().unwrap();

    let mut peeked = [0u8; 4];
    assert_eq!(server.peek(&mut peeked).unwrap(), 4);
    assert_eq!(&peeked, b"ping");

    // Peeked bytes are still there for the real read
    let mut buf = [0u8; 4];
    server.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"ping");

    server.write_all(b"pong").unwrap();
    client.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"pong");

    server.close().unwrap();
    assert!(!server.is_connected());
    assert_eq!(server.read(&mut buf).unwrap_err().kind(), ErrorKind::NotConnected);
    // Closing twice is fine
    server.close().unwrap();

    assert_eq!(client.read(&mut buf).unwrap(), 0);
}

/// Connected tcp transports: (client, server)
fn tcp_transports() -> (Box<dyn Transport>, Box<dyn Transport>) {
    let config = test_config();
    let listener = transport::bind(&Address::parse("tcp://127.0.0.1:0").unwrap(), 16).unwrap();
    let address = listener.local_address();
    let connector = thread::spawn(move || transport::connect(&address, &config).unwrap());
    let server = listener.accept().unwrap();
    (connector.join().unwrap(), server)
}

#[test]
fn test_tcp_connect_accept() {
    let config = test_config();
    let listener = transport::bind(&Address::parse("tcp://127.0.0.1:0").unwrap(), 16).unwrap();
    let address = listener.local_address();
    assert!(matches!(&address, Address::Tcp { port, .. } if *port != 0));

    let connector = thread::spawn(move || transport::connect(&address, &config).unwrap());
    let server = listener.accept().unwrap();
    let client = connector.join().unwrap();

    assert!(client.is_local());
    assert!(server.is_connected());
    exchange(client, server);
}

#[test]
fn test_nonblocking_accept_would_block() {
    let listener = transport::bind(&Address::parse("tcp://127.0.0.1:0").unwrap(), 16).unwrap();
    listener.set_nonblocking(true).unwrap();

    match listener.accept() {
        Err(e) => assert_eq!(e.kind(), ErrorKind::WouldBlock),
        Ok(_) => panic!("nothing should be waiting"),
    }
}

#[cfg(unix)]
#[test]
fn test_pipe_connect_accept() {
    let config = test_config();
    let name = crate::common::unique_pipe_name("transport");
    let address = Address::parse(&format!(r"\\.\pipe\{}", name)).unwrap();
    let listener = transport::bind(&address, 16).unwrap();
    assert_eq!(listener.local_address(), address);

    let target = address.clone();
    let connector = thread::spawn(move || transport::connect(&target, &config).unwrap());
    let server = listener.accept().unwrap();
    let client = connector.join().unwrap();

    assert!(client.is_local());
    assert_eq!(server.remote_address(), address.to_string());
    exchange(client, server);
}

#[test]
fn test_remote_pipe_rejected() {
    let config = test_config();
    let address = Address::parse(r"\\otherhost\pipe\name").unwrap();
    assert!(matches!(
        transport::connect(&address, &config),
        Err(wirecall::WireError::InvalidAddress(_))
    ));
}

// =============================================================================
// Async Send
// =============================================================================

#[test]
fn test_send_async_delivers_and_returns_transport() {
    let (client, mut server) = tcp_transports();
    let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();

    let handle = send_async(client, Bytes::from(data.clone())).unwrap();
    let mut received = vec![0u8; data.len()];
    server.read_exact(&mut received).unwrap();
    assert_eq!(received, data);

    let outcome = handle.wait().unwrap();
    assert!(outcome.is_complete());
    assert_eq!(outcome.written, data.len());

    // The transport is usable again after the send
    let mut client = outcome.transport;
    client.write_all(b"after").unwrap();
    let mut buf = [0u8; 5];
    server.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"after");
}

#[test]
fn test_send_async_cancel_stops_writer() {
    let (client, mut server) = tcp_transports();
    let total = 32 * 1024 * 1024;

    // Nobody reads yet, so the writer stalls once the socket buffers fill
    let handle = send_async(client, Bytes::from(vec![7u8; total])).unwrap();
    handle.cancel();
    assert!(handle.is_cancelled());

    let drain = thread::spawn(move || {
        let mut buf = vec![0u8; 64 * 1024];
        let mut read = 0;
        loop {
            match server.read(&mut buf) {
                Ok(0) | Err(_) => return read,
                Ok(n) => read += n,
            }
        }
    });

    let outcome = handle.wait().unwrap();
    assert!(!outcome.is_complete());
    assert_eq!(outcome.result.as_ref().unwrap_err().kind(), ErrorKind::Interrupted);
    assert!(outcome.written < total);

    let mut client = outcome.transport;
    client.close().unwrap();
    assert_eq!(drain.join().unwrap(), outcome.written);
}

#[test]
fn test_send_async_wait_timeout_while_blocked() {
    let (client, mut server) = tcp_transports();
    let total = 32 * 1024 * 1024;

    let handle = send_async(client, Bytes::from(vec![1u8; total])).unwrap();
    assert!(handle.wait_timeout(Duration::from_millis(50)).unwrap().is_none());
    assert!(!handle.is_finished());

    let mut buf = vec![0u8; total];
    server.read_exact(&mut buf).unwrap();
    let outcome = handle.wait().unwrap();
    assert!(outcome.is_complete());
    assert_eq!(outcome.written, total);
}

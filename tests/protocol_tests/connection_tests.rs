//! Tests for WireConnection over loopback TCP

use std::io::{Read, Write};
use std::thread;

use wirecall::codec::ChunkBuffer;
use wirecall::protocol::{HeaderName, Headers, StatusCode};
use wirecall::{Config, WireError};

use crate::common::{connection_pair, tcp_pair, test_config};

fn only_svc(uri: &str) -> bool {
    uri == "/svc"
}

// =============================================================================
// Request / Reply Tests
// =============================================================================

#[test]
fn test_svc_hello_world_exchange() {
    let config = test_config();
    let (mut client, mut server) = connection_pair(&config);

    let server_thread = thread::spawn(move || {
        let request = server.read_request(&only_svc).unwrap();
        assert!(!request.one_way);
        assert_eq!(request.uri, "/svc");
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.headers.content_type(), Some("text/plain"));
        assert_eq!(request.body, b"hello");

        let mut reply = Headers::new();
        reply.set_status(StatusCode::Success);
        server
            .send_reply(&reply, &ChunkBuffer::from(&b"world"[..]))
            .unwrap();
        server
    });

    let headers = Headers::new().with(HeaderName::ContentType, "text/plain");
    client
        .send_request("/svc", &headers, &ChunkBuffer::from(&b"hello"[..]), false)
        .unwrap();

    let reply = client.read_reply().unwrap().into_result().unwrap();
    assert_eq!(reply.status(), StatusCode::Success);
    assert_eq!(reply.body, b"world");

    let server = server_thread.join().unwrap();
    assert_eq!(server.frames_read(), 1);
    assert_eq!(client.frames_read(), 1);
}

#[test]
fn test_sequential_requests_on_one_connection() {
    let config = test_config();
    let (mut client, mut server) = connection_pair(&config);

    let server_thread = thread::spawn(move || {
        for _ in 0..3 {
            let request = server.read_request(&only_svc).unwrap();
            let mut body = request.body;
            body.reverse();
            server
                .send_reply(&Headers::new(), &ChunkBuffer::from(body.as_slice()))
                .unwrap();
        }
    });

    for word in ["abc", "hello", "xy"] {
        client
            .send_request("/svc", &Headers::new(), &ChunkBuffer::from(word.as_bytes()), false)
            .unwrap();
        let reply = client.read_reply().unwrap();
        let expected: Vec<u8> = word.bytes().rev().collect();
        assert_eq!(reply.body, expected);
        // Missing status defaults to Success on send
        assert_eq!(reply.headers.status(), Some(StatusCode::Success));
    }

    server_thread.join().unwrap();
}

#[test]
fn test_streaming_request_and_reply() {
    let config = test_config();
    let (mut client, mut server) = connection_pair(&config);

    let server_thread = thread::spawn(move || {
        let (head, mut payload) = server.read_request_stream(&only_svc).unwrap();
        assert!(payload.is_chunked());
        assert_eq!(head.request_uri.as_deref(), Some("/svc"));

        let mut body = Vec::new();
        payload.read_to_end(&mut body).unwrap();
        assert_eq!(body.len(), 3 * 1000);

        server
            .send_reply_streaming(&Headers::new(), |out| {
                out.write_all(b"part1,")?;
                out.write_all(b"part2")
            })
            .unwrap();
    });

    let written = client
        .send_request_streaming("/svc", &Headers::new(), false, |out| {
            for _ in 0..3 {
                out.write_all(&[7u8; 1000])?;
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(written, 3000);

    let reply = client.read_reply().unwrap();
    assert_eq!(reply.body, b"part1,part2");

    server_thread.join().unwrap();
}

#[test]
fn test_one_way_request_flag() {
    let config = test_config();
    let (mut client, mut server) = connection_pair(&config);

    client
        .send_request("/svc", &Headers::new(), &ChunkBuffer::from(&b"fire"[..]), true)
        .unwrap();

    let request = server.read_request(&only_svc).unwrap();
    assert!(request.one_way);
    assert_eq!(request.body, b"fire");
}

// =============================================================================
// Error Path Tests
// =============================================================================

#[test]
fn test_unknown_uri_rejected_before_headers() {
    let config = test_config();
    let (mut client, mut server) = connection_pair(&config);

    client
        .send_request("/other", &Headers::new(), &ChunkBuffer::new(), false)
        .unwrap();

    match server.read_request(&only_svc) {
        Err(WireError::InvalidRequestUri(uri)) => assert_eq!(uri, "/other"),
        other => panic!("expected InvalidRequestUri, got {:?}", other),
    }
}

#[test]
fn test_error_reply_becomes_remote_error() {
    let config = test_config();
    let (mut client, mut server) = connection_pair(&config);

    server
        .send_error(StatusCode::InvalidRequestUri, "no such service")
        .unwrap();

    let reply = client.read_reply().unwrap();
    assert!(reply.body.is_empty());
    assert_eq!(reply.status(), StatusCode::InvalidRequestUri);

    match reply.into_result() {
        Err(WireError::Remote { status, message }) => {
            assert_eq!(status, StatusCode::InvalidRequestUri);
            assert_eq!(message, "no such service");
        }
        other => panic!("expected a remote error, got {:?}", other),
    }
}

#[test]
fn test_garbage_is_invalid_message_format() {
    let config = test_config();
    let (mut raw_client, server_stream) = tcp_pair();
    let mut server = wirecall::protocol::WireConnection::new(
        Box::new(wirecall::transport::TcpTransport::from_stream(server_stream).unwrap()),
        &config,
    );

    raw_client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();

    assert!(matches!(
        server.read_request(&only_svc),
        Err(WireError::InvalidMessageFormat(_))
    ));
}

#[test]
fn test_reply_where_request_expected() {
    let config = test_config();
    let (mut client, mut server) = connection_pair(&config);

    // A reply frame sent to the server side
    client.send_error(StatusCode::Success, "").unwrap();

    assert!(matches!(
        server.read_request(&only_svc),
        Err(WireError::InvalidMessageFormat(_))
    ));
}

#[test]
fn test_payload_size_limit() {
    let config = Config {
        max_payload_size: 16,
        ..test_config()
    };
    let (mut client, mut server) = connection_pair(&config);

    client
        .send_request("/svc", &Headers::new(), &ChunkBuffer::from(&[1u8; 17][..]), false)
        .unwrap();
    assert!(matches!(
        server.read_request(&only_svc),
        Err(WireError::InvalidMessageFormat(_))
    ));

    // Chunked payloads are checked while they are read
    let (mut client, mut server) = connection_pair(&config);
    let sender = thread::spawn(move || {
        client
            .send_request_streaming("/svc", &Headers::new(), false, |out| {
                out.write_all(&[1u8; 10])?;
                out.write_all(&[2u8; 10])
            })
            .unwrap();
        client
    });
    assert!(matches!(
        server.read_request(&only_svc),
        Err(WireError::InvalidMessageFormat(_))
    ));
    sender.join().unwrap();
}

#[test]
fn test_close_is_idempotent() {
    let config = test_config();
    let (mut client, _server) = connection_pair(&config);

    assert!(client.is_connected());
    assert!(client.is_local());
    client.close();
    client.close();
    assert!(!client.is_connected());
    assert!(client
        .send_request("/svc", &Headers::new(), &ChunkBuffer::new(), false)
        .is_err());
}

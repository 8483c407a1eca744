//! End-to-end tests: Client → Server through the full pipeline
//!
//! These tests verify:
//! - Raw and bincode payloads round-trip through handlers
//! - Handler errors come back as ServerError and keep the connection
//! - Protocol errors close the connection
//! - One-way and streaming calls
//! - Stages see and modify every message

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel;
use serde::{Deserialize, Serialize};
use wirecall::pipeline::{
    AuthTokenStage, BincodeFormatter, CallInfo, Client, RawFormatter, ServerPipeline, Services,
    TraceStage,
};
use wirecall::protocol::{HeaderName, Headers, StatusCode};
use wirecall::{Result, WireError};

use crate::common::{test_config, TestServer};

// =============================================================================
// Helper Functions
// =============================================================================

fn raw_services() -> Services<RawFormatter> {
    Services::<RawFormatter>::new()
        .with("/echo", |_: &CallInfo, body: Vec<u8>| -> Result<Vec<u8>> { Ok(body) })
        .with("/upper", |_: &CallInfo, body: Vec<u8>| -> Result<Vec<u8>> {
            Ok(body.to_ascii_uppercase())
        })
        .with("/fail", |_: &CallInfo, body: Vec<u8>| -> Result<Vec<u8>> {
            Err(WireError::server(format!(
                "cannot handle {}",
                String::from_utf8_lossy(&body)
            )))
        })
        .with("/whoami", |call: &CallInfo, _: Vec<u8>| -> Result<Vec<u8>> {
            let token = call.headers.auth_token().unwrap_or("anonymous");
            Ok(format!("{} via {}", token, call.uri).into_bytes())
        })
}

fn raw_server() -> TestServer {
    let config = test_config();
    let pipeline = ServerPipeline::new(RawFormatter::new(), raw_services(), config.max_payload_size)
        .with_stage(TraceStage);
    TestServer::start(config, Arc::new(pipeline))
}

fn raw_client() -> Client<RawFormatter> {
    Client::new(RawFormatter::new(), test_config()).unwrap()
}

// =============================================================================
// Raw Payload Tests
// =============================================================================

#[test]
fn test_call_round_trip() {
    let server = raw_server();
    let client = raw_client();

    let response = client.call(&server.url("/upper"), &b"hello".to_vec()).unwrap();
    assert_eq!(response, b"HELLO");
}

#[test]
fn test_calls_reuse_pooled_connection() {
    let server = raw_server();
    let client = raw_client();
    let url = server.url("/echo");

    for i in 0..5 {
        let request = vec![i as u8; i * 100];
        assert_eq!(client.call(&url, &request).unwrap(), request);
    }
    assert_eq!(client.cache().idle_count(&server.address), 1);
}

#[test]
fn test_large_payload() {
    let server = raw_server();
    let client = raw_client();

    let request: Vec<u8> = (0..1_000_000u32).map(|i| (i % 253) as u8).collect();
    assert_eq!(client.call(&server.url("/echo"), &request).unwrap(), request);
}

#[test]
fn test_handler_error_keeps_connection() {
    let server = raw_server();
    let client = raw_client();

    match client.call(&server.url("/fail"), &b"this".to_vec()) {
        Err(WireError::Remote { status, message }) => {
            assert_eq!(status, StatusCode::ServerError);
            assert_eq!(message, "cannot handle this");
        }
        other => panic!("expected ServerError, got {:?}", other),
    }

    // Still in sync and back in the pool
    assert_eq!(client.cache().idle_count(&server.address), 1);
    assert_eq!(client.call(&server.url("/echo"), &b"ok".to_vec()).unwrap(), b"ok");
    assert_eq!(client.cache().idle_count(&server.address), 1);
}

#[test]
fn test_unknown_uri_closes_connection() {
    let server = raw_server();
    let client = raw_client();

    match client.call(&server.url("/nowhere"), &b"x".to_vec()) {
        Err(WireError::Remote { status, .. }) => assert_eq!(status, StatusCode::InvalidRequestUri),
        other => panic!("expected InvalidRequestUri, got {:?}", other),
    }
    assert_eq!(client.cache().idle_count(&server.address), 0);

    assert_eq!(client.call(&server.url("/echo"), &b"again".to_vec()).unwrap(), b"again");
}

#[test]
fn test_connect_refused() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = raw_client();

    let result = client.call(&format!("tcp://127.0.0.1:{}/echo", port), &Vec::new());
    assert!(matches!(result, Err(WireError::Io(_))));
}

#[test]
fn test_invalid_url() {
    let client = raw_client();
    assert!(matches!(
        client.call("http://example.com/echo", &Vec::new()),
        Err(WireError::InvalidAddress(_))
    ));
}

// =============================================================================
// One-way and Streaming Tests
// =============================================================================

#[test]
fn test_one_way_call() {
    let config = test_config();
    let (tx, rx) = channel::unbounded();
    let services = Services::<RawFormatter>::new().with(
        "/log",
        move |call: &CallInfo, body: Vec<u8>| -> Result<Vec<u8>> {
            let _ = tx.send((call.one_way, body));
            Ok(b"ignored".to_vec())
        },
    );
    let pipeline = ServerPipeline::new(RawFormatter::new(), services, config.max_payload_size);
    let server = TestServer::start(config, Arc::new(pipeline));
    let client = raw_client();

    client.call_one_way(&server.url("/log"), &b"event-1".to_vec()).unwrap();
    client.call_one_way(&server.url("/log"), &b"event-2".to_vec()).unwrap();

    for expected in [&b"event-1"[..], &b"event-2"[..]] {
        let (one_way, body) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(one_way);
        assert_eq!(body, expected);
    }
}

#[test]
fn test_streaming_call() {
    let server = raw_server();
    let client = raw_client();

    let headers = Headers::new().with(HeaderName::ContentType, RawFormatter::DEFAULT_CONTENT_TYPE);
    let response = client
        .call_streaming(&server.url("/upper"), headers, |out| {
            for word in ["stream", "ed ", "in ", "pieces"] {
                out.write_all(word.as_bytes())?;
            }
            Ok(())
        })
        .unwrap();

    assert_eq!(response, b"STREAMED IN PIECES");
}

// =============================================================================
// Stage Tests
// =============================================================================

#[test]
fn test_auth_token_reaches_handler() {
    let server = raw_server();
    let client = raw_client().with_stage(AuthTokenStage::new("token-42"));

    let response = client.call(&server.url("/whoami"), &Vec::new()).unwrap();
    assert_eq!(response, b"token-42 via /whoami");

    let anonymous = raw_client();
    let response = anonymous.call(&server.url("/whoami"), &Vec::new()).unwrap();
    assert_eq!(response, b"anonymous via /whoami");
}

// =============================================================================
// Bincode Tests
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AddRequest {
    a: i64,
    b: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AddResponse {
    sum: i64,
}

type AddFormatter = BincodeFormatter<AddRequest, AddResponse>;

#[test]
fn test_bincode_call() {
    let config = test_config();
    let services = Services::<AddFormatter>::new().with(
        "/add",
        |_: &CallInfo, req: AddRequest| -> Result<AddResponse> {
            Ok(AddResponse { sum: req.a + req.b })
        },
    );
    let pipeline = ServerPipeline::new(AddFormatter::new(), services, config.max_payload_size);
    let server = TestServer::start(config, Arc::new(pipeline));

    let client = Client::new(AddFormatter::new(), test_config()).unwrap();
    let response = client
        .call(&server.url("/add"), &AddRequest { a: 40, b: 2 })
        .unwrap();
    assert_eq!(response, AddResponse { sum: 42 });
}

#[test]
fn test_bincode_rejects_raw_payload() {
    let config = test_config();
    let services = Services::<AddFormatter>::new().with(
        "/add",
        |_: &CallInfo, req: AddRequest| -> Result<AddResponse> {
            Ok(AddResponse { sum: req.a + req.b })
        },
    );
    let pipeline = ServerPipeline::new(AddFormatter::new(), services, config.max_payload_size);
    let server = TestServer::start(config, Arc::new(pipeline));

    // Wrong content type: answered as a ServerError, connection kept
    let client = raw_client();
    match client.call(&server.url("/add"), &b"not bincode".to_vec()) {
        Err(WireError::Remote { status, .. }) => assert_eq!(status, StatusCode::ServerError),
        other => panic!("expected ServerError, got {:?}", other),
    }
    assert_eq!(client.cache().idle_count(&server.address), 1);
}

// =============================================================================
// Pipe Transport Tests
// =============================================================================

#[cfg(unix)]
#[test]
fn test_call_over_pipe() {
    let name = crate::common::unique_pipe_name("e2e");
    let config = wirecall::Config {
        listen_addr: format!(r"\\.\pipe\{}", name),
        ..test_config()
    };
    let pipeline =
        ServerPipeline::new(RawFormatter::new(), raw_services(), config.max_payload_size);
    let server = TestServer::start(config, Arc::new(pipeline));
    let client = raw_client();

    let url = server.url("/upper");
    assert!(url.starts_with(r"\\.\pipe\"));
    assert_eq!(client.call(&url, &b"pipe".to_vec()).unwrap(), b"PIPE");
    assert_eq!(client.call(&url, &b"again".to_vec()).unwrap(), b"AGAIN");
    assert_eq!(client.cache().idle_count(&server.address), 1);
}

//! Tests for stages and formatters in isolation

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wirecall::codec::ChunkBuffer;
use wirecall::pipeline::{
    AuthTokenStage, BincodeFormatter, CallContext, Direction, Formatter, MessageKind, Pipeline,
    RawFormatter, Stage, TraceStage,
};
use wirecall::protocol::{HeaderName, Headers};
use wirecall::{Result, WireError};

// =============================================================================
// Helper Types
// =============================================================================

/// Appends its tag to a custom header so ordering is visible
struct TagStage {
    tag: &'static str,
    calls: Arc<AtomicUsize>,
}

impl Stage for TagStage {
    fn name(&self) -> &str {
        self.tag
    }

    fn process(&self, mut ctx: CallContext) -> Result<CallContext> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let order = match ctx.headers.get_custom("order") {
            Some(existing) => format!("{},{}", existing, self.tag),
            None => self.tag.to_string(),
        };
        ctx.headers.insert(HeaderName::custom("order"), order);
        Ok(ctx)
    }
}

struct DenyStage;

impl Stage for DenyStage {
    fn name(&self) -> &str {
        "deny"
    }

    fn process(&self, _ctx: CallContext) -> Result<CallContext> {
        Err(WireError::AccessDenied("not allowed".to_string()))
    }
}

fn outbound_request() -> CallContext {
    CallContext::new(Direction::Outbound, MessageKind::Request, "/svc")
}

// =============================================================================
// Pipeline Tests
// =============================================================================

#[test]
fn test_stages_run_in_order() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = Pipeline::new()
        .with(TagStage {
            tag: "first",
            calls: Arc::clone(&calls),
        })
        .with(TagStage {
            tag: "second",
            calls: Arc::clone(&calls),
        });

    assert_eq!(pipeline.names(), vec!["first", "second"]);
    assert_eq!(pipeline.len(), 2);

    let ctx = pipeline.run(outbound_request()).unwrap();
    assert_eq!(ctx.headers.get_custom("order"), Some("first,second"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_error_stops_pipeline() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = Pipeline::new().with(DenyStage).with(TagStage {
        tag: "never",
        calls: Arc::clone(&calls),
    });

    assert!(matches!(
        pipeline.run(outbound_request()),
        Err(WireError::AccessDenied(_))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_empty_pipeline_passes_through() {
    let pipeline = Pipeline::new();
    assert!(pipeline.is_empty());

    let mut ctx = outbound_request();
    ctx.body.extend_from_slice(b"body");
    let ctx = pipeline.run(ctx).unwrap();
    assert_eq!(ctx.body.to_vec(), b"body");
}

#[test]
fn test_auth_token_only_on_outbound_requests() {
    let stage = AuthTokenStage::new("t0k3n");

    let ctx = stage.process(outbound_request()).unwrap();
    assert_eq!(ctx.headers.auth_token(), Some("t0k3n"));

    let reply = CallContext::new(Direction::Outbound, MessageKind::Reply, "/svc");
    assert_eq!(stage.process(reply).unwrap().headers.auth_token(), None);

    let inbound = CallContext::new(Direction::Inbound, MessageKind::Request, "/svc");
    assert_eq!(stage.process(inbound).unwrap().headers.auth_token(), None);
}

#[test]
fn test_auth_token_keeps_explicit_header() {
    let stage = AuthTokenStage::new("default");
    let ctx = outbound_request()
        .with_headers(Headers::new().with(HeaderName::AuthToken, "explicit"));

    assert_eq!(stage.process(ctx).unwrap().headers.auth_token(), Some("explicit"));
}

#[test]
fn test_trace_stage_is_transparent() {
    let mut ctx = outbound_request();
    ctx.headers.insert(HeaderName::ContentType, "text/plain");
    ctx.body.extend_from_slice(b"abc");

    let ctx = TraceStage.process(ctx).unwrap();
    assert_eq!(ctx.headers.content_type(), Some("text/plain"));
    assert_eq!(ctx.body.to_vec(), b"abc");
}

// =============================================================================
// Formatter Tests
// =============================================================================

#[test]
fn test_raw_formatter_sets_content_type() {
    let formatter = RawFormatter::new();
    let mut headers = Headers::new();
    let mut body = ChunkBuffer::new();

    formatter
        .write_request(&b"bytes".to_vec(), &mut headers, &mut body)
        .unwrap();
    assert_eq!(headers.content_type(), Some(RawFormatter::DEFAULT_CONTENT_TYPE));

    let decoded = formatter.read_request(&headers, &mut body).unwrap();
    assert_eq!(decoded, b"bytes");
}

#[test]
fn test_raw_formatter_custom_content_type() {
    let formatter = RawFormatter::with_content_type("text/plain");
    assert_eq!(formatter.content_type(), "text/plain");

    let mut headers = Headers::new();
    formatter
        .write_response(&Vec::new(), &mut headers, &mut ChunkBuffer::new())
        .unwrap();
    assert_eq!(headers.content_type(), Some("text/plain"));
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Message {
    id: u32,
    text: String,
    tags: Vec<String>,
}

#[test]
fn test_bincode_formatter_round_trip() {
    let formatter = BincodeFormatter::<Message, Message>::new();
    let message = Message {
        id: 7,
        text: "hello".to_string(),
        tags: vec!["a".to_string(), "b".to_string()],
    };

    let mut headers = Headers::new();
    let mut body = ChunkBuffer::new();
    formatter.write_request(&message, &mut headers, &mut body).unwrap();
    assert_eq!(
        headers.content_type(),
        Some(BincodeFormatter::<Message, Message>::CONTENT_TYPE)
    );

    assert_eq!(formatter.read_request(&headers, &mut body).unwrap(), message);
}

#[test]
fn test_bincode_formatter_rejects_garbage() {
    let formatter = BincodeFormatter::<Message, Message>::new();
    let headers = Headers::new();
    let mut body = ChunkBuffer::from(&[0xFFu8, 0xFF][..]);

    assert!(matches!(
        formatter.read_response(&headers, &mut body),
        Err(WireError::Serialization(_))
    ));
}

#[test]
fn test_bincode_formatter_checks_content_type() {
    let formatter = BincodeFormatter::<Message, Message>::new();
    let headers = Headers::new().with(HeaderName::ContentType, "text/plain");

    assert!(matches!(
        formatter.read_request(&headers, &mut ChunkBuffer::new()),
        Err(WireError::Serialization(_))
    ));
}

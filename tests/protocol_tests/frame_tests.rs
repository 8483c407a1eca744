//! Tests for frame encoding and decoding
//!
//! These tests verify:
//! - Frames round-trip with fixed and chunked payloads
//! - The byte layout of the prologue
//! - Malformed input is rejected as InvalidMessageFormat

use wirecall::protocol::{
    decode_frame, encode_frame, read_head, read_headers, write_headers, ContentLength, Frame,
    HeaderName, HeaderValue, Headers, Opcode, StatusCode, HEADER_END, PREAMBLE,
};
use wirecall::WireError;

// =============================================================================
// Helper Functions
// =============================================================================

fn request_frame(payload: &[u8], chunked: bool) -> Frame {
    Frame {
        opcode: Opcode::Request,
        request_uri: Some("/svc".to_string()),
        headers: Headers::new()
            .with(HeaderName::ContentType, "text/plain")
            .with(HeaderName::AuthToken, "secret")
            .with(HeaderName::custom("x-trace"), "abc123"),
        payload: payload.to_vec(),
        chunked,
    }
}

// =============================================================================
// Round-trip Tests
// =============================================================================

#[test]
fn test_fixed_request_round_trip() {
    let frame = request_frame(b"hello", false);
    let decoded = decode_frame(&encode_frame(&frame).unwrap()).unwrap();
    assert_eq!(decoded, frame);
}

#[test]
fn test_chunked_request_round_trip() {
    let payload: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
    let frame = request_frame(&payload, true);
    let decoded = decode_frame(&encode_frame(&frame).unwrap()).unwrap();
    assert_eq!(decoded, frame);
}

#[test]
fn test_reply_round_trip_with_status() {
    let mut headers = Headers::new();
    headers.set_status(StatusCode::ServerError);
    headers.insert(HeaderName::ErrorMessage, "boom");

    for chunked in [false, true] {
        let frame = Frame {
            opcode: Opcode::Reply,
            request_uri: None,
            headers: headers.clone(),
            payload: Vec::new(),
            chunked,
        };
        let decoded = decode_frame(&encode_frame(&frame).unwrap()).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.headers.status(), Some(StatusCode::ServerError));
        assert_eq!(decoded.headers.error_message(), Some("boom"));
    }
}

#[test]
fn test_one_way_request_keeps_uri() {
    let mut frame = request_frame(b"", false);
    frame.opcode = Opcode::OneWayRequest;
    let decoded = decode_frame(&encode_frame(&frame).unwrap()).unwrap();

    assert_eq!(decoded.opcode, Opcode::OneWayRequest);
    assert_eq!(decoded.request_uri.as_deref(), Some("/svc"));
    assert!(decoded.payload.is_empty());
}

// =============================================================================
// Byte Layout Tests
// =============================================================================

#[test]
fn test_prologue_layout() {
    let bytes = encode_frame(&request_frame(b"hello", false)).unwrap();

    assert_eq!(&bytes[..6], &PREAMBLE);
    assert_eq!(bytes[6], Opcode::Request as u8);
    assert_eq!(&bytes[7..11], &5i32.to_le_bytes());
    // uri: varint length then bytes
    assert_eq!(bytes[11], 4);
    assert_eq!(&bytes[12..16], b"/svc");
    assert_eq!(&bytes[bytes.len() - 5..], b"hello");
}

#[test]
fn test_chunked_length_is_minus_one() {
    let bytes = encode_frame(&request_frame(b"hello", true)).unwrap();
    assert_eq!(&bytes[7..11], &(-1i32).to_le_bytes());
    assert_eq!(*bytes.last().unwrap(), 0);
}

#[test]
fn test_header_encoding() {
    let mut headers = Headers::new();
    headers.set_status(StatusCode::AccessDenied);
    headers.insert(HeaderName::custom("k"), "v");

    let mut bytes = Vec::new();
    write_headers(&mut bytes, &headers).unwrap();

    assert_eq!(bytes, vec![2, 3, 254, 1, b'k', 1, b'v', HEADER_END]);
    assert_eq!(read_headers(&mut bytes.as_slice()).unwrap(), headers);
}

#[test]
fn test_read_head_leaves_payload() {
    let bytes = encode_frame(&request_frame(b"hello", false)).unwrap();
    let mut input = bytes.as_slice();
    let head = read_head(&mut input).unwrap();

    assert_eq!(head.content_length, ContentLength::Fixed(5));
    assert_eq!(head.headers.content_type(), Some("text/plain"));
    assert_eq!(head.headers.get_custom("x-trace"), Some("abc123"));
    assert_eq!(input, b"hello");
}

// =============================================================================
// Header Map Tests
// =============================================================================

#[test]
fn test_insert_replaces_existing() {
    let mut headers = Headers::new();
    headers.insert(HeaderName::ContentType, "a");
    headers.insert(HeaderName::ContentType, "b");

    assert_eq!(headers.len(), 1);
    assert_eq!(headers.content_type(), Some("b"));
}

#[test]
fn test_status_value_kind_checked() {
    let headers = Headers::new().with(HeaderName::StatusCode, "not a byte");
    let mut bytes = Vec::new();
    assert!(matches!(
        write_headers(&mut bytes, &headers),
        Err(WireError::Internal(_))
    ));

    let headers =
        Headers::new().with(HeaderName::ContentType, HeaderValue::Status(StatusCode::Success));
    assert!(write_headers(&mut Vec::<u8>::new(), &headers).is_err());
}

// =============================================================================
// Malformed Input Tests
// =============================================================================

#[test]
fn test_bad_preamble_rejected() {
    let mut bytes = encode_frame(&request_frame(b"x", false)).unwrap();
    bytes[0] = b'X';
    assert!(matches!(
        decode_frame(&bytes),
        Err(WireError::InvalidMessageFormat(_))
    ));
}

#[test]
fn test_version_mismatch_rejected() {
    let mut bytes = encode_frame(&request_frame(b"x", false)).unwrap();
    bytes[4] = 2;
    assert!(matches!(
        decode_frame(&bytes),
        Err(WireError::InvalidMessageFormat(_))
    ));
}

#[test]
fn test_unknown_opcode_rejected() {
    let mut bytes = encode_frame(&request_frame(b"x", false)).unwrap();
    bytes[6] = 9;
    assert!(matches!(
        decode_frame(&bytes),
        Err(WireError::InvalidMessageFormat(_))
    ));
}

#[test]
fn test_negative_length_rejected() {
    let mut bytes = encode_frame(&request_frame(b"x", false)).unwrap();
    bytes[7..11].copy_from_slice(&(-2i32).to_le_bytes());
    assert!(matches!(
        decode_frame(&bytes),
        Err(WireError::InvalidMessageFormat(_))
    ));
}

#[test]
fn test_unknown_header_type_rejected() {
    let bytes = [9u8, 0, HEADER_END];
    assert!(matches!(
        read_headers(&mut &bytes[..]),
        Err(WireError::InvalidMessageFormat(_))
    ));
}

#[test]
fn test_unknown_status_rejected() {
    let bytes = [2u8, 77, HEADER_END];
    assert!(matches!(
        read_headers(&mut &bytes[..]),
        Err(WireError::InvalidMessageFormat(_))
    ));
}

#[test]
fn test_truncated_frame_is_io_error() {
    let bytes = encode_frame(&request_frame(b"hello", false)).unwrap();
    let truncated = &bytes[..bytes.len() - 2];
    assert!(matches!(decode_frame(truncated), Err(WireError::Io(_))));
}

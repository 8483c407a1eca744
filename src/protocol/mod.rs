//! Protocol Module
//!
//! Defines the framing protocol for client-server communication.
//!
//! ## Frame Format
//!
//! ```text
//! ┌──────────────┬────────┬──────────────┬───────────┬─────────────┬─────────┐
//! │ Preamble (6) │ Op (1) │ Length (4)   │ Uri (str) │ Headers ... │ Payload │
//! └──────────────┴────────┴──────────────┴───────────┴─────────────┴─────────┘
//! ```
//!
//! ### Opcodes
//! - 0: Request
//! - 1: OneWayRequest (no reply is sent)
//! - 2: Reply
//!
//! ### Header Types
//! - 0-5: ConnectionId, RequestUri, StatusCode, ErrorMessage, AuthToken, ContentType
//! - 254: Custom (name string follows)
//! - 255: EndOfHeaders
//!
//! ### Status Codes
//! - 0: Success
//! - 1: InvalidMessageFormat
//! - 2: InvalidRequestUri
//! - 3: AccessDenied
//! - 4: ServerBusy
//! - 254: ServerError
//! - 255: InternalError

mod connection;
mod frame;
mod header;

pub use connection::{
    IncomingReply, IncomingRequest, PayloadReader, ServiceRegistry, WireConnection,
};
pub use frame::{
    decode_frame, encode_frame, read_head, read_headers, read_string, write_head, write_headers,
    write_string, ContentLength, Frame, FrameHead, Opcode, CHUNKED_LENGTH, MAX_STRING_LEN,
    PREAMBLE,
};
pub use header::{HeaderName, HeaderValue, Headers, StatusCode, HEADER_CUSTOM, HEADER_END};

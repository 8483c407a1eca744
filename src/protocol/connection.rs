//! Wire connection
//!
//! Per-connection framing state machine, used by both sides:
//!
//! ```text
//!   client                              server
//!   send_request ───── Request ─────▶  read_request
//!   read_reply   ◀──── Reply ───────   send_reply / send_error
//! ```
//!
//! Requests on one connection are strictly sequential. A connection that
//! hit a protocol or I/O error is out of sync and must be closed.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use super::frame::{
    read_content_length, read_headers, read_opcode, read_preamble, read_string, write_head,
    write_prologue, ContentLength, FrameHead, Opcode,
};
use super::header::{HeaderName, Headers, StatusCode, HEADER_END};
use crate::codec::{
    BufferedStream, ChunkBuffer, ChunkedReader, ChunkedWriter, FillStatus, FixedReader,
};
use crate::config::Config;
use crate::error::{Result, WireError};
use crate::transport::{self, Address, Transport};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Decides whether a request uri has a handler on this server
pub trait ServiceRegistry: Send + Sync {
    fn is_servable(&self, uri: &str) -> bool;
}

impl<F> ServiceRegistry for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_servable(&self, uri: &str) -> bool {
        self(uri)
    }
}

/// A fully received request
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub one_way: bool,
    pub uri: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// A fully received reply
#[derive(Debug, Clone)]
pub struct IncomingReply {
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl IncomingReply {
    pub fn status(&self) -> StatusCode {
        self.headers.status().unwrap_or(StatusCode::Success)
    }

    /// Turn an error status into `WireError::Remote`
    pub fn into_result(self) -> Result<Self> {
        match WireError::from_status(self.status(), self.headers.error_message()) {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Payload stream of the frame currently being read
#[derive(Debug)]
pub enum PayloadReader<'a> {
    Fixed(FixedReader<&'a mut BufferedStream>),
    Chunked(ChunkedReader<&'a mut BufferedStream>),
}

impl<'a> PayloadReader<'a> {
    fn new(stream: &'a mut BufferedStream, length: ContentLength) -> Self {
        match length {
            ContentLength::Fixed(len) => {
                PayloadReader::Fixed(FixedReader::new(stream, u64::from(len)))
            }
            ContentLength::Chunked => PayloadReader::Chunked(ChunkedReader::new(stream)),
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadReader::Chunked(_))
    }

    /// Skip whatever the caller did not read, keeping the connection in sync
    pub fn drain(&mut self) -> Result<u64> {
        let skipped = match self {
            PayloadReader::Fixed(reader) => reader.drain()?,
            PayloadReader::Chunked(reader) => reader.drain()?,
        };
        Ok(skipped)
    }

    /// Read the whole payload, failing if it exceeds `max` bytes
    pub fn collect(self, max: usize) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        self.collect_into(&mut body, max)?;
        Ok(body)
    }

    /// Copy the whole payload into `out`, failing if it exceeds `max` bytes
    pub fn collect_into<W: Write + ?Sized>(mut self, out: &mut W, max: usize) -> Result<u64> {
        if let PayloadReader::Fixed(reader) = &self {
            if reader.remaining() > max as u64 {
                return Err(too_large(reader.remaining(), max));
            }
        }
        let copied = io::copy(&mut (&mut self).take(max as u64 + 1), out)?;
        if copied > max as u64 {
            return Err(too_large(copied, max));
        }
        Ok(copied)
    }
}

impl Read for PayloadReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            PayloadReader::Fixed(reader) => reader.read(buf),
            PayloadReader::Chunked(reader) => reader.read(buf),
        }
    }
}

fn too_large(len: u64, max: usize) -> WireError {
    WireError::InvalidMessageFormat(format!(
        "payload of {} bytes exceeds limit of {}",
        len, max
    ))
}

/// A framed connection over one transport
#[derive(Debug)]
pub struct WireConnection {
    id: u64,
    stream: BufferedStream,
    max_payload_size: usize,
    frames_read: u64,
}

impl WireConnection {
    /// Open a client connection
    pub fn connect(address: &Address, config: &Config) -> Result<Self> {
        let transport = transport::connect(address, config)?;
        Ok(Self::new(transport, config))
    }

    /// Wrap a connected (or accepted) transport
    pub fn new(transport: Box<dyn Transport>, config: &Config) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Connection {} opened with {}",
            id,
            transport.remote_address()
        );
        Self {
            id,
            stream: BufferedStream::new(transport, config.buffer_size),
            max_payload_size: config.max_payload_size,
            frames_read: 0,
        }
    }

    /// Diagnostic identifier, unique within the process
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn remote_address(&self) -> &str {
        self.stream.transport().remote_address()
    }

    pub fn is_connected(&self) -> bool {
        self.stream.transport().is_connected()
    }

    pub fn is_local(&self) -> bool {
        self.stream.transport().is_local()
    }

    pub fn client_identity(&self) -> Option<&str> {
        self.stream.transport().client_identity()
    }

    /// Frames received so far
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn has_buffered_data(&self) -> bool {
        self.stream.has_buffered_data()
    }

    /// Non-blocking check for the next frame
    pub fn poll_readable(&mut self) -> io::Result<FillStatus> {
        self.stream.try_fill()
    }

    pub fn set_timeouts(&self, config: &Config) -> Result<()> {
        self.stream
            .transport()
            .set_timeouts(config.read_timeout(), config.write_timeout())?;
        Ok(())
    }

    /// Close the transport; the connection cannot be used afterwards
    pub fn close(&mut self) {
        if !self.is_connected() {
            return;
        }
        tracing::debug!(
            "Connection {} to {} closed after {} frames",
            self.id,
            self.remote_address(),
            self.frames_read
        );
        if let Err(e) = self.stream.close() {
            tracing::debug!("Connection {} close error: {}", self.id, e);
        }
    }

    // =========================================================================
    // Client Side
    // =========================================================================

    /// Send a request whose payload is staged in memory
    pub fn send_request(
        &mut self,
        uri: &str,
        headers: &Headers,
        payload: &ChunkBuffer,
        one_way: bool,
    ) -> Result<()> {
        let head = FrameHead {
            opcode: request_opcode(one_way),
            content_length: fixed_length(payload)?,
            request_uri: Some(uri.to_string()),
            headers: headers.clone(),
        };
        self.write_frame(&head, payload)
    }

    /// Send a request whose payload is produced while it is sent
    ///
    /// The head goes out first with a chunked content length, then
    /// `write_body` writes straight into the chunked stream.
    pub fn send_request_streaming<F>(
        &mut self,
        uri: &str,
        headers: &Headers,
        one_way: bool,
        write_body: F,
    ) -> Result<u64>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let head = FrameHead {
            opcode: request_opcode(one_way),
            content_length: ContentLength::Chunked,
            request_uri: Some(uri.to_string()),
            headers: headers.clone(),
        };
        self.write_streaming(&head, write_body)
    }

    /// Read a reply head and hand out its payload stream
    pub fn read_reply_stream(&mut self) -> Result<(Headers, PayloadReader<'_>)> {
        read_preamble(&mut self.stream)?;
        let opcode = read_opcode(&mut self.stream)?;
        if opcode != Opcode::Reply {
            return Err(WireError::InvalidMessageFormat(format!(
                "expected a reply, got {:?}",
                opcode
            )));
        }
        let content_length = read_content_length(&mut self.stream)?;
        let headers = read_headers(&mut self.stream)?;
        self.frames_read += 1;

        tracing::trace!(
            "Connection {} received reply {:?} ({:?})",
            self.id,
            headers.status(),
            content_length
        );
        Ok((headers, PayloadReader::new(&mut self.stream, content_length)))
    }

    /// Read a complete reply
    pub fn read_reply(&mut self) -> Result<IncomingReply> {
        let max = self.max_payload_size;
        let (headers, payload) = self.read_reply_stream()?;
        let body = payload.collect(max)?;
        Ok(IncomingReply { headers, body })
    }

    // =========================================================================
    // Server Side
    // =========================================================================

    /// Read a request head and hand out its payload stream
    ///
    /// Checks, in wire order: preamble, opcode (requests only), request
    /// uri against `registry`.
    pub fn read_request_stream(
        &mut self,
        registry: &dyn ServiceRegistry,
    ) -> Result<(FrameHead, PayloadReader<'_>)> {
        read_preamble(&mut self.stream)?;
        let opcode = read_opcode(&mut self.stream)?;
        if !opcode.is_request() {
            return Err(WireError::InvalidMessageFormat(format!(
                "expected a request, got {:?}",
                opcode
            )));
        }
        let content_length = read_content_length(&mut self.stream)?;
        let uri = read_string(&mut self.stream)?;
        if !registry.is_servable(&uri) {
            return Err(WireError::InvalidRequestUri(uri));
        }
        let headers = read_headers(&mut self.stream)?;
        self.frames_read += 1;

        tracing::trace!(
            "Connection {} received {:?} for {} ({:?})",
            self.id,
            opcode,
            uri,
            content_length
        );
        let head = FrameHead {
            opcode,
            content_length,
            request_uri: Some(uri),
            headers,
        };
        Ok((head, PayloadReader::new(&mut self.stream, content_length)))
    }

    /// Read a complete request
    pub fn read_request(&mut self, registry: &dyn ServiceRegistry) -> Result<IncomingRequest> {
        let max = self.max_payload_size;
        let (head, payload) = self.read_request_stream(registry)?;
        let body = payload.collect(max)?;
        Ok(IncomingRequest {
            one_way: head.opcode == Opcode::OneWayRequest,
            uri: head.request_uri.unwrap_or_default(),
            headers: head.headers,
            body,
        })
    }

    /// Send a reply; a missing StatusCode header defaults to Success
    pub fn send_reply(&mut self, headers: &Headers, payload: &ChunkBuffer) -> Result<()> {
        let head = FrameHead {
            opcode: Opcode::Reply,
            content_length: fixed_length(payload)?,
            request_uri: None,
            headers: reply_headers(headers),
        };
        self.write_frame(&head, payload)
    }

    /// Send a reply whose payload is produced while it is sent
    pub fn send_reply_streaming<F>(&mut self, headers: &Headers, write_body: F) -> Result<u64>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let head = FrameHead {
            opcode: Opcode::Reply,
            content_length: ContentLength::Chunked,
            request_uri: None,
            headers: reply_headers(headers),
        };
        self.write_streaming(&head, write_body)
    }

    /// Send a minimal error reply: status and message only, empty payload
    pub fn send_error(&mut self, status: StatusCode, message: &str) -> Result<()> {
        tracing::debug!(
            "Connection {} sending error {:?}: {}",
            self.id,
            status,
            message
        );
        write_prologue(&mut self.stream, Opcode::Reply, ContentLength::Fixed(0))?;
        self.stream
            .write_all(&[HeaderName::StatusCode.code(), status as u8])?;
        self.stream.write_all(&[HeaderName::ErrorMessage.code()])?;
        super::frame::write_string(&mut self.stream, message)?;
        self.stream.write_all(&[HEADER_END])?;
        self.stream.flush()?;
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn write_frame(&mut self, head: &FrameHead, payload: &ChunkBuffer) -> Result<()> {
        write_head(&mut self.stream, head)?;
        payload.copy_to(&mut self.stream)?;
        self.stream.flush()?;
        tracing::trace!(
            "Connection {} sent {:?} with {} payload bytes",
            self.id,
            head.opcode,
            payload.len()
        );
        Ok(())
    }

    fn write_streaming<F>(&mut self, head: &FrameHead, write_body: F) -> Result<u64>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        write_head(&mut self.stream, head)?;
        let mut writer = ChunkedWriter::new(&mut self.stream);
        write_body(&mut writer)?;
        let written = writer.bytes_written();
        writer.finish()?;
        tracing::trace!(
            "Connection {} streamed {:?} with {} payload bytes",
            self.id,
            head.opcode,
            written
        );
        Ok(written)
    }
}

fn request_opcode(one_way: bool) -> Opcode {
    if one_way {
        Opcode::OneWayRequest
    } else {
        Opcode::Request
    }
}

fn fixed_length(payload: &ChunkBuffer) -> Result<ContentLength> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= i32::MAX as u32)
        .ok_or_else(|| {
            WireError::Internal(format!("payload of {} bytes too large", payload.len()))
        })?;
    Ok(ContentLength::Fixed(len))
}

fn reply_headers(headers: &Headers) -> Headers {
    let mut headers = headers.clone();
    if headers.status().is_none() {
        headers.set_status(StatusCode::Success);
    }
    headers
}

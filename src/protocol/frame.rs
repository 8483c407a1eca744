//! Frame encoding and decoding
//!
//! ## Wire Format
//! ```text
//! ┌──────────────┬────────┬──────────────┬─────────────┬─────────────┬─────────┐
//! │ Preamble (6) │ Op (1) │ Length (4,LE)│ Uri (str)   │ Headers ... │ Payload │
//! └──────────────┴────────┴──────────────┴─────────────┴─────────────┴─────────┘
//! ```
//!
//! - Preamble: `WIRE` + major + minor version, compared byte-for-byte
//! - Length: `i32`, `-1` means the payload is chunked
//! - Uri: present on Request and OneWayRequest only
//! - Headers: `type(1) [name str] value`, terminated by type `255`
//! - str: `varint(len) || UTF-8 bytes`

use std::io::{Read, Write};

use super::header::{HeaderName, HeaderValue, Headers, StatusCode, HEADER_CUSTOM, HEADER_END};
use crate::codec::{read_varint, write_varint, ChunkedReader, ChunkedWriter, FixedReader};
use crate::error::{Result, WireError};

/// Signature and version at the start of every frame
pub const PREAMBLE: [u8; 6] = [b'W', b'I', b'R', b'E', 1, 0];

/// Content length announcing a chunked payload
pub const CHUNKED_LENGTH: i32 = -1;

/// Longest accepted uri or header string
pub const MAX_STRING_LEN: usize = 64 * 1024;

/// Frame operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Request = 0,
    OneWayRequest = 1,
    Reply = 2,
}

impl Opcode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Opcode::Request),
            1 => Some(Opcode::OneWayRequest),
            2 => Some(Opcode::Reply),
            _ => None,
        }
    }

    pub fn is_request(self) -> bool {
        matches!(self, Opcode::Request | Opcode::OneWayRequest)
    }
}

/// How the payload length is announced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentLength {
    Fixed(u32),
    Chunked,
}

impl ContentLength {
    fn to_wire(self) -> Result<i32> {
        match self {
            ContentLength::Chunked => Ok(CHUNKED_LENGTH),
            ContentLength::Fixed(len) => i32::try_from(len).map_err(|_| {
                WireError::Internal(format!("content length {} exceeds i32", len))
            }),
        }
    }

    fn from_wire(value: i32) -> Result<Self> {
        match value {
            CHUNKED_LENGTH => Ok(ContentLength::Chunked),
            len if len >= 0 => Ok(ContentLength::Fixed(len as u32)),
            other => Err(WireError::InvalidMessageFormat(format!(
                "invalid content length {}",
                other
            ))),
        }
    }
}

/// Everything in a frame before the payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHead {
    pub opcode: Opcode,
    pub content_length: ContentLength,
    pub request_uri: Option<String>,
    pub headers: Headers,
}

/// A complete frame held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub request_uri: Option<String>,
    pub headers: Headers,
    pub payload: Vec<u8>,
    /// Send the payload chunked instead of with a fixed length
    pub chunked: bool,
}

// =============================================================================
// Primitive Encoding
// =============================================================================

pub fn write_string<W: Write + ?Sized>(writer: &mut W, value: &str) -> Result<()> {
    if value.len() > MAX_STRING_LEN {
        return Err(WireError::Internal(format!(
            "string of {} bytes exceeds limit of {}",
            value.len(),
            MAX_STRING_LEN
        )));
    }
    write_varint(writer, value.len() as u64)?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

pub fn read_string<R: Read + ?Sized>(reader: &mut R) -> Result<String> {
    let len = read_varint(reader)? as usize;
    if len > MAX_STRING_LEN {
        return Err(WireError::InvalidMessageFormat(format!(
            "string of {} bytes exceeds limit of {}",
            len, MAX_STRING_LEN
        )));
    }
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes)
        .map_err(|_| WireError::InvalidMessageFormat("string is not valid UTF-8".to_string()))
}

fn read_u8<R: Read + ?Sized>(reader: &mut R) -> Result<u8> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}

// =============================================================================
// Frame Head Encoding/Decoding
// =============================================================================

/// Write the preamble, opcode and content length
pub fn write_prologue<W: Write + ?Sized>(
    writer: &mut W,
    opcode: Opcode,
    content_length: ContentLength,
) -> Result<()> {
    let mut prologue = [0u8; PREAMBLE.len() + 5];
    prologue[..PREAMBLE.len()].copy_from_slice(&PREAMBLE);
    prologue[PREAMBLE.len()] = opcode as u8;
    prologue[PREAMBLE.len() + 1..].copy_from_slice(&content_length.to_wire()?.to_le_bytes());
    writer.write_all(&prologue)?;
    Ok(())
}

/// Verify the preamble byte-for-byte
pub fn read_preamble<R: Read + ?Sized>(reader: &mut R) -> Result<()> {
    let mut preamble = [0u8; PREAMBLE.len()];
    reader.read_exact(&mut preamble)?;
    if preamble != PREAMBLE {
        return Err(WireError::InvalidMessageFormat(format!(
            "bad preamble {:02x?}",
            preamble
        )));
    }
    Ok(())
}

pub fn read_opcode<R: Read + ?Sized>(reader: &mut R) -> Result<Opcode> {
    let byte = read_u8(reader)?;
    Opcode::from_u8(byte)
        .ok_or_else(|| WireError::InvalidMessageFormat(format!("unknown opcode 0x{:02x}", byte)))
}

pub fn read_content_length<R: Read + ?Sized>(reader: &mut R) -> Result<ContentLength> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    ContentLength::from_wire(i32::from_le_bytes(bytes))
}

/// Write the header list and its terminator
pub fn write_headers<W: Write + ?Sized>(writer: &mut W, headers: &Headers) -> Result<()> {
    for (name, value) in headers.iter() {
        writer.write_all(&[name.code()])?;
        if let HeaderName::Custom(custom) = name {
            write_string(writer, custom)?;
        }
        match (name, value) {
            (HeaderName::StatusCode, HeaderValue::Status(status)) => {
                writer.write_all(&[*status as u8])?;
            }
            (HeaderName::StatusCode, HeaderValue::Text(_)) | (_, HeaderValue::Status(_)) => {
                return Err(WireError::Internal(format!(
                    "header {} has a value of the wrong kind",
                    name
                )));
            }
            (_, HeaderValue::Text(text)) => write_string(writer, text)?,
        }
    }
    writer.write_all(&[HEADER_END])?;
    Ok(())
}

/// Read headers up to and including the terminator
pub fn read_headers<R: Read + ?Sized>(reader: &mut R) -> Result<Headers> {
    let mut headers = Headers::new();
    loop {
        let code = read_u8(reader)?;
        let name = match code {
            HEADER_END => return Ok(headers),
            HEADER_CUSTOM => HeaderName::Custom(read_string(reader)?),
            other => HeaderName::from_code(other).ok_or_else(|| {
                WireError::InvalidMessageFormat(format!("unknown header type {}", other))
            })?,
        };
        let value = if name == HeaderName::StatusCode {
            let byte = read_u8(reader)?;
            let status = StatusCode::from_u8(byte).ok_or_else(|| {
                WireError::InvalidMessageFormat(format!("unknown status code {}", byte))
            })?;
            HeaderValue::Status(status)
        } else {
            HeaderValue::Text(read_string(reader)?)
        };
        headers.insert(name, value);
    }
}

/// Write a complete frame head
pub fn write_head<W: Write + ?Sized>(writer: &mut W, head: &FrameHead) -> Result<()> {
    write_prologue(writer, head.opcode, head.content_length)?;
    if head.opcode.is_request() {
        let uri = head.request_uri.as_deref().unwrap_or_default();
        write_string(writer, uri)?;
    }
    write_headers(writer, &head.headers)
}

/// Read a complete frame head
pub fn read_head<R: Read + ?Sized>(reader: &mut R) -> Result<FrameHead> {
    read_preamble(reader)?;
    let opcode = read_opcode(reader)?;
    let content_length = read_content_length(reader)?;
    let request_uri = if opcode.is_request() {
        Some(read_string(reader)?)
    } else {
        None
    };
    let headers = read_headers(reader)?;
    Ok(FrameHead {
        opcode,
        content_length,
        request_uri,
        headers,
    })
}

// =============================================================================
// Whole-frame Encoding/Decoding
// =============================================================================

/// Encode a frame to bytes
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>> {
    let content_length = if frame.chunked {
        ContentLength::Chunked
    } else {
        ContentLength::Fixed(u32::try_from(frame.payload.len()).map_err(|_| {
            WireError::Internal(format!("payload of {} bytes too large", frame.payload.len()))
        })?)
    };
    let head = FrameHead {
        opcode: frame.opcode,
        content_length,
        request_uri: frame.request_uri.clone(),
        headers: frame.headers.clone(),
    };

    let mut out = Vec::with_capacity(PREAMBLE.len() + 64 + frame.payload.len());
    write_head(&mut out, &head)?;
    if frame.chunked {
        let mut writer = ChunkedWriter::new(&mut out);
        std::io::Write::write_all(&mut writer, &frame.payload)?;
        writer.finish()?;
    } else {
        out.extend_from_slice(&frame.payload);
    }
    Ok(out)
}

/// Decode one frame from the start of `bytes`
pub fn decode_frame(mut bytes: &[u8]) -> Result<Frame> {
    let head = read_head(&mut bytes)?;
    let mut payload = Vec::new();
    let chunked = match head.content_length {
        ContentLength::Fixed(len) => {
            FixedReader::new(&mut bytes, u64::from(len)).read_to_end(&mut payload)?;
            false
        }
        ContentLength::Chunked => {
            ChunkedReader::new(&mut bytes).read_to_end(&mut payload)?;
            true
        }
    };
    Ok(Frame {
        opcode: head.opcode,
        request_uri: head.request_uri,
        headers: head.headers,
        payload,
        chunked,
    })
}

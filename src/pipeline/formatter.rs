//! Formatters
//!
//! Convert logical requests and responses to a header map plus payload
//! bytes, and back. The framing layer never looks inside the payload.

use std::io::{Read, Write};
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, WireError};
use crate::protocol::{HeaderName, Headers};

/// Pluggable message serializer
pub trait Formatter: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    /// Value of the ContentType header this formatter produces
    fn content_type(&self) -> &str;

    fn write_request(
        &self,
        request: &Self::Request,
        headers: &mut Headers,
        body: &mut dyn Write,
    ) -> Result<()>;

    fn read_request(&self, headers: &Headers, body: &mut dyn Read) -> Result<Self::Request>;

    fn write_response(
        &self,
        response: &Self::Response,
        headers: &mut Headers,
        body: &mut dyn Write,
    ) -> Result<()>;

    fn read_response(&self, headers: &Headers, body: &mut dyn Read) -> Result<Self::Response>;
}

/// Reject payloads labelled with a different content type
fn check_content_type(headers: &Headers, expected: &str) -> Result<()> {
    match headers.content_type() {
        Some(actual) if actual != expected => Err(WireError::Serialization(format!(
            "expected content type '{}', got '{}'",
            expected, actual
        ))),
        _ => Ok(()),
    }
}

// =============================================================================
// Raw Bytes
// =============================================================================

/// Passes payload bytes through unchanged
#[derive(Debug, Clone, Default)]
pub struct RawFormatter {
    content_type: Option<String>,
}

impl RawFormatter {
    pub const DEFAULT_CONTENT_TYPE: &'static str = "application/octet-stream";

    pub fn new() -> Self {
        Self::default()
    }

    /// Label payloads with `content_type` instead of octet-stream
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
        }
    }

    fn write(&self, bytes: &[u8], headers: &mut Headers, body: &mut dyn Write) -> Result<()> {
        if headers.content_type().is_none() {
            headers.insert(HeaderName::ContentType, self.content_type());
        }
        body.write_all(bytes)?;
        Ok(())
    }

    fn read(body: &mut dyn Read) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl Formatter for RawFormatter {
    type Request = Vec<u8>;
    type Response = Vec<u8>;

    fn content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or(Self::DEFAULT_CONTENT_TYPE)
    }

    fn write_request(
        &self,
        request: &Vec<u8>,
        headers: &mut Headers,
        body: &mut dyn Write,
    ) -> Result<()> {
        self.write(request, headers, body)
    }

    fn read_request(&self, _headers: &Headers, body: &mut dyn Read) -> Result<Vec<u8>> {
        Self::read(body)
    }

    fn write_response(
        &self,
        response: &Vec<u8>,
        headers: &mut Headers,
        body: &mut dyn Write,
    ) -> Result<()> {
        self.write(response, headers, body)
    }

    fn read_response(&self, _headers: &Headers, body: &mut dyn Read) -> Result<Vec<u8>> {
        Self::read(body)
    }
}

// =============================================================================
// Bincode
// =============================================================================

/// Serde types encoded with bincode
pub struct BincodeFormatter<Req, Resp> {
    _types: PhantomData<fn() -> (Req, Resp)>,
}

impl<Req, Resp> BincodeFormatter<Req, Resp> {
    pub const CONTENT_TYPE: &'static str = "application/x-bincode";

    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<Req, Resp> Default for BincodeFormatter<Req, Resp> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Resp> Clone for BincodeFormatter<Req, Resp> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<Req, Resp> std::fmt::Debug for BincodeFormatter<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BincodeFormatter")
    }
}

impl<Req, Resp> Formatter for BincodeFormatter<Req, Resp>
where
    Req: Serialize + DeserializeOwned + Send + 'static,
    Resp: Serialize + DeserializeOwned + Send + 'static,
{
    type Request = Req;
    type Response = Resp;

    fn content_type(&self) -> &str {
        Self::CONTENT_TYPE
    }

    fn write_request(
        &self,
        request: &Req,
        headers: &mut Headers,
        body: &mut dyn Write,
    ) -> Result<()> {
        headers.insert(HeaderName::ContentType, Self::CONTENT_TYPE);
        bincode::serialize_into(body, request)?;
        Ok(())
    }

    fn read_request(&self, headers: &Headers, body: &mut dyn Read) -> Result<Req> {
        check_content_type(headers, Self::CONTENT_TYPE)?;
        Ok(bincode::deserialize_from(body)?)
    }

    fn write_response(
        &self,
        response: &Resp,
        headers: &mut Headers,
        body: &mut dyn Write,
    ) -> Result<()> {
        headers.insert(HeaderName::ContentType, Self::CONTENT_TYPE);
        bincode::serialize_into(body, response)?;
        Ok(())
    }

    fn read_response(&self, headers: &Headers, body: &mut dyn Read) -> Result<Resp> {
        check_content_type(headers, Self::CONTENT_TYPE)?;
        Ok(bincode::deserialize_from(body)?)
    }
}

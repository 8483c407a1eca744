//! Client pipeline
//!
//! formatter → stages → pooled wire connection → stages → formatter

use std::io::{self, Write};

use super::formatter::Formatter;
use super::stage::{CallContext, Direction, MessageKind, Pipeline, Stage};
use crate::cache::ConnectionCache;
use crate::config::Config;
use crate::error::{Result, WireError};
use crate::protocol::{Headers, StatusCode, WireConnection};
use crate::transport::{parse_url, Address};

/// Makes calls to remote services
pub struct Client<F: Formatter> {
    formatter: F,
    stages: Pipeline,
    cache: ConnectionCache,
    config: Config,
}

impl<F: Formatter> Client<F> {
    pub fn new(formatter: F, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            formatter,
            stages: Pipeline::new(),
            cache: ConnectionCache::new(config.keep_alive())?,
            config,
        })
    }

    /// Add a stage run on every request and reply
    pub fn with_stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn cache(&self) -> &ConnectionCache {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Call `url` and wait for the response
    pub fn call(&self, url: &str, request: &F::Request) -> Result<F::Response> {
        let (address, uri) = parse_url(url)?;
        let ctx = self.outbound(uri, Headers::new(), Some(request))?;
        self.with_connection(&address, |conn| {
            conn.send_request(&ctx.uri, &ctx.headers, &ctx.body, false)?;
            self.receive(conn, &ctx.uri)
        })
    }

    /// Send to `url` without waiting for a response
    pub fn call_one_way(&self, url: &str, request: &F::Request) -> Result<()> {
        let (address, uri) = parse_url(url)?;
        let ctx = self.outbound(uri, Headers::new(), Some(request))?;
        self.with_connection(&address, |conn| {
            conn.send_request(&ctx.uri, &ctx.headers, &ctx.body, true)
        })
    }

    /// Call `url` with a payload written straight onto the wire
    ///
    /// The request goes out chunked while `write_body` produces it, so its
    /// size need not be known or buffered. The formatter is bypassed for the
    /// request; `headers` should carry the ContentType.
    pub fn call_streaming<W>(
        &self,
        url: &str,
        headers: Headers,
        write_body: W,
    ) -> Result<F::Response>
    where
        W: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let (address, uri) = parse_url(url)?;
        let ctx = self.outbound(uri, headers, None)?;
        self.with_connection(&address, |conn| {
            conn.send_request_streaming(&ctx.uri, &ctx.headers, false, write_body)?;
            self.receive(conn, &ctx.uri)
        })
    }

    /// Close pooled connections and stop the cache sweeper
    pub fn shutdown(&self) {
        self.cache.shutdown();
    }

    fn outbound(
        &self,
        uri: String,
        headers: Headers,
        request: Option<&F::Request>,
    ) -> Result<CallContext> {
        let mut ctx = CallContext::new(Direction::Outbound, MessageKind::Request, uri)
            .with_headers(headers);
        if let Some(request) = request {
            self.formatter
                .write_request(request, &mut ctx.headers, &mut ctx.body)?;
        }
        self.stages.run(ctx)
    }

    fn receive(&self, conn: &mut WireConnection, uri: &str) -> Result<F::Response> {
        let mut ctx = CallContext::new(Direction::Inbound, MessageKind::Reply, uri);
        let (headers, payload) = conn.read_reply_stream()?;
        payload.collect_into(&mut ctx.body, self.config.max_payload_size)?;
        ctx.headers = headers;

        let mut ctx = self.stages.run(ctx)?;
        let status = ctx.headers.status().unwrap_or(StatusCode::Success);
        if let Some(err) = WireError::from_status(status, ctx.headers.error_message()) {
            return Err(err);
        }
        self.formatter.read_response(&ctx.headers, &mut ctx.body)
    }

    /// Run `call` on a pooled connection to `address`
    ///
    /// The connection goes back to the cache unless the error left it out of
    /// sync; the next call then opens a fresh one.
    fn with_connection<T, C>(&self, address: &Address, call: C) -> Result<T>
    where
        C: FnOnce(&mut WireConnection) -> Result<T>,
    {
        let mut conn = self
            .cache
            .get(address, || WireConnection::connect(address, &self.config))?;

        let result = call(&mut conn);
        match &result {
            Err(e) if e.is_fatal_to_connection() => {
                tracing::debug!("Dropping connection {} to {}: {}", conn.id(), address, e);
                conn.close();
            }
            _ => self.cache.store(address, conn),
        }
        result
    }
}


//! Server pipeline
//!
//! wire connection → stages → formatter → handler → formatter → stages →
//! wire connection. Runs on a dispatch worker, one request per `process`.

use std::collections::HashMap;
use std::sync::Arc;

use super::formatter::Formatter;
use super::stage::{CallContext, Direction, MessageKind, Pipeline, Stage};
use crate::dispatch::RequestProcessor;
use crate::error::{Result, WireError};
use crate::protocol::{HeaderName, Headers, Opcode, ServiceRegistry, StatusCode, WireConnection};

/// What a handler knows about the call it serves
#[derive(Debug, Clone)]
pub struct CallInfo {
    pub uri: String,
    pub headers: Headers,
    pub one_way: bool,
    pub connection_id: u64,
    pub remote_address: String,
}

/// Serves requests for one object uri
///
/// Returning `WireError::Server` (see `WireError::server`) or
/// `WireError::AccessDenied` answers the caller with that status while
/// keeping the connection open.
pub trait Handler<F: Formatter>: Send + Sync {
    fn handle(&self, call: &CallInfo, request: F::Request) -> Result<F::Response>;
}

impl<F, T> Handler<F> for T
where
    F: Formatter,
    T: Fn(&CallInfo, F::Request) -> Result<F::Response> + Send + Sync,
{
    fn handle(&self, call: &CallInfo, request: F::Request) -> Result<F::Response> {
        self(call, request)
    }
}

/// Maps object uris to handlers
pub struct Services<F: Formatter> {
    handlers: HashMap<String, Arc<dyn Handler<F>>>,
}

impl<F: Formatter> Services<F> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `uri`, replacing any earlier one
    pub fn register<H>(&mut self, uri: impl Into<String>, handler: H)
    where
        H: Handler<F> + 'static,
    {
        self.handlers.insert(uri.into(), Arc::new(handler));
    }

    pub fn with<H>(mut self, uri: impl Into<String>, handler: H) -> Self
    where
        H: Handler<F> + 'static,
    {
        self.register(uri, handler);
        self
    }

    pub fn get(&self, uri: &str) -> Option<&Arc<dyn Handler<F>>> {
        self.handlers.get(uri)
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl<F: Formatter> Default for Services<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Formatter> ServiceRegistry for Services<F> {
    fn is_servable(&self, uri: &str) -> bool {
        self.handlers.contains_key(uri)
    }
}

/// Request processor that runs registered services
pub struct ServerPipeline<F: Formatter> {
    formatter: F,
    services: Services<F>,
    stages: Pipeline,
    max_payload_size: usize,
}

impl<F: Formatter> ServerPipeline<F> {
    pub fn new(formatter: F, services: Services<F>, max_payload_size: usize) -> Self {
        Self {
            formatter,
            services,
            stages: Pipeline::new(),
            max_payload_size,
        }
    }

    pub fn with_stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn services(&self) -> &Services<F> {
        &self.services
    }

    /// Inbound stages, deserialize, invoke the handler, serialize the result
    fn invoke(&self, ctx: CallContext, info: &mut CallInfo) -> Result<CallContext> {
        let mut ctx = self.stages.run(ctx)?;
        info.headers = ctx.headers.clone();

        let handler = self
            .services
            .get(&ctx.uri)
            .ok_or_else(|| WireError::InvalidRequestUri(ctx.uri.clone()))?;
        let request = self.formatter.read_request(&ctx.headers, &mut ctx.body)?;
        let response = handler.handle(info, request)?;

        let mut reply = CallContext::new(Direction::Outbound, MessageKind::Reply, ctx.uri);
        self.formatter
            .write_response(&response, &mut reply.headers, &mut reply.body)?;
        reply.headers.set_status(StatusCode::Success);
        Ok(reply)
    }
}

impl<F: Formatter> RequestProcessor for ServerPipeline<F> {
    fn process(&self, conn: &mut WireConnection) -> Result<()> {
        let (head, payload) = conn.read_request_stream(&self.services)?;
        let uri = head.request_uri.unwrap_or_default();
        let mut ctx = CallContext::new(Direction::Inbound, MessageKind::Request, uri.clone())
            .with_headers(head.headers);
        payload.collect_into(&mut ctx.body, self.max_payload_size)?;

        let mut info = CallInfo {
            uri: uri.clone(),
            headers: Headers::new(),
            one_way: head.opcode == Opcode::OneWayRequest,
            connection_id: conn.id(),
            remote_address: conn.remote_address().to_string(),
        };

        let outcome = self.invoke(ctx, &mut info);

        if info.one_way {
            if let Err(e) = outcome {
                tracing::warn!("One-way call to {} failed: {}", uri, e);
            }
            return Ok(());
        }

        let reply = match outcome {
            Ok(reply) => reply,
            Err(e) if !e.is_fatal_to_connection() => {
                tracing::debug!("Call to {} failed: {}", uri, e);
                let mut reply = CallContext::new(Direction::Outbound, MessageKind::Reply, uri);
                reply.headers.set_status(e.status_code());
                reply
                    .headers
                    .insert(HeaderName::ErrorMessage, reply_message(&e));
                reply
            }
            Err(e) => return Err(e),
        };

        let reply = self.stages.run(reply)?;
        conn.send_reply(&reply.headers, &reply.body)
    }
}

/// Error text sent to the caller, without the local variant prefix
fn reply_message(error: &WireError) -> String {
    match error {
        WireError::Server(message) | WireError::AccessDenied(message) => message.clone(),
        other => other.to_string(),
    }
}

//! Processing stages
//!
//! A stage sees every message passing between the formatter and the
//! transport and may rewrite its headers or body. Stages run in order for
//! outbound messages and in the same order for inbound ones.

use std::sync::Arc;

use crate::codec::ChunkBuffer;
use crate::error::Result;
use crate::protocol::{HeaderName, Headers};

/// Which way a message is travelling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Request or reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Reply,
}

/// One message on its way through the pipeline
#[derive(Debug)]
pub struct CallContext {
    pub direction: Direction,
    pub kind: MessageKind,
    pub uri: String,
    pub headers: Headers,
    pub body: ChunkBuffer,
}

impl CallContext {
    pub fn new(direction: Direction, kind: MessageKind, uri: impl Into<String>) -> Self {
        Self {
            direction,
            kind,
            uri: uri.into(),
            headers: Headers::new(),
            body: ChunkBuffer::new(),
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }
}

/// A named processing step
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, ctx: CallContext) -> Result<CallContext>;
}

/// Ordered list of stages
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<S: Stage + 'static>(&mut self, stage: S) {
        self.stages.push(Arc::new(stage));
    }

    pub fn with<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.push(stage);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run `ctx` through every stage, stopping at the first error
    pub fn run(&self, ctx: CallContext) -> Result<CallContext> {
        self.stages
            .iter()
            .try_fold(ctx, |ctx, stage| stage.process(ctx))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// =============================================================================
// Built-in Stages
// =============================================================================

/// Attaches an opaque AuthToken header to outbound requests
///
/// The token is passed through as-is; nothing verifies it.
#[derive(Debug, Clone)]
pub struct AuthTokenStage {
    token: String,
}

impl AuthTokenStage {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl Stage for AuthTokenStage {
    fn name(&self) -> &str {
        "auth-token"
    }

    fn process(&self, mut ctx: CallContext) -> Result<CallContext> {
        if ctx.direction == Direction::Outbound
            && ctx.kind == MessageKind::Request
            && ctx.headers.auth_token().is_none()
        {
            ctx.headers
                .insert(HeaderName::AuthToken, self.token.as_str());
        }
        Ok(ctx)
    }
}

/// Logs every message at debug level
#[derive(Debug, Clone, Default)]
pub struct TraceStage;

impl Stage for TraceStage {
    fn name(&self) -> &str {
        "trace"
    }

    fn process(&self, ctx: CallContext) -> Result<CallContext> {
        tracing::debug!(
            direction = ?ctx.direction,
            kind = ?ctx.kind,
            uri = %ctx.uri,
            headers = ctx.headers.len(),
            body_len = ctx.body.len(),
            "pipeline message"
        );
        Ok(ctx)
    }
}

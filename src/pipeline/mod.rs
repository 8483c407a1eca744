//! Pipeline Module
//!
//! Per-call processing chain:
//!
//! ```text
//!   client:  Formatter ─▶ Stages ─▶ WireConnection ══▶
//!   server:  ══▶ WireConnection ─▶ Stages ─▶ Formatter ─▶ Handler
//! ```
//!
//! The formatter is pluggable, so the framing protocol does not depend on
//! how payloads are encoded. Stages are an ordered list of named steps.

mod client;
mod formatter;
mod server;
mod stage;

pub use client::Client;
pub use formatter::{BincodeFormatter, Formatter, RawFormatter};
pub use server::{CallInfo, Handler, ServerPipeline, Services};
pub use stage::{AuthTokenStage, CallContext, Direction, MessageKind, Pipeline, Stage, TraceStage};

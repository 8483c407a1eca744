//! # wirecall
//!
//! A remote-call framing protocol and runtime:
//! - Binary frames with typed headers over TCP or local pipes
//! - Fixed-length and chunked payload streaming
//! - Client-side connection cache with keep-alive eviction
//! - Server-side dispatch queue with bounded workers and admission control
//! - Pluggable payload formatters and processing stages
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────┐          ┌─────────────────────────────┐
//! │           Client            │          │           Server            │
//! │  Formatter ─▶ Stages        │          │  Listener (accept loop)     │
//! └──────────────┬──────────────┘          └──────────────┬──────────────┘
//!                │                                        │
//! ┌──────────────▼──────────────┐          ┌──────────────▼──────────────┐
//! │      Connection Cache       │          │       Dispatch Queue        │
//! │  (per destination, LIFO)    │          │ (workers + readiness watch) │
//! └──────────────┬──────────────┘          └──────────────┬──────────────┘
//!                │                                        │
//!                ▼                                        ▼
//!       ┌────────────────┐   frames over transport ┌────────────────┐
//!       │ WireConnection │ ══════════════════════▶ │ WireConnection │
//!       └────────────────┘                         └───────┬────────┘
//!                                                          ▼
//!                                              Stages ─▶ Formatter ─▶ Handler
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod transport;
pub mod codec;
pub mod protocol;
pub mod cache;
pub mod dispatch;
pub mod pipeline;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, WireError};
pub use config::Config;
pub use network::Server;
pub use pipeline::Client;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of wirecall
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

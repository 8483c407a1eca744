//! Connection Cache Module
//!
//! Client-side pool of idle connections, keyed by destination.
//!
//! ## Concurrency Model
//!
//! - The destination map is guarded by its own mutex, held only to look up
//!   or insert a pool entry.
//! - Each destination has its own idle list and mutex; the two locks are
//!   never held together.
//! - A connection is owned by either the idle list or one caller, so `get`
//!   can never hand the same connection to two callers.
//!
//! A sweeper thread wakes every keep-alive interval and closes connections
//! idle for longer than the keep-alive.

mod pool;

pub use pool::{ConnectionCache, Poolable};

//! Network Module
//!
//! Server accept loop.
//!
//! ## Architecture
//! - Single acceptor thread (the caller of `Server::run`)
//! - Dispatch queue with bounded worker threads
//! - Idle connections parked in the readiness watcher

mod server;

pub use server::{Server, ShutdownHandle};

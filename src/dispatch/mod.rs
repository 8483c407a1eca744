//! Dispatch Module
//!
//! Server-side admission control.
//!
//! ## Architecture
//! - `ReadinessWatcher`: one thread parks idle connections until data arrives
//! - `DispatchQueue`: bounded worker threads plus a bounded FIFO of
//!   connections waiting for one

mod queue;
mod watcher;

pub use queue::{DispatchQueue, DispatchStats, RequestProcessor};
pub use watcher::{ReadinessWatcher, ReadyCallback, WatchHandle};

//! Transport Module
//!
//! Byte endpoints the framing layer runs on.
//!
//! ## Backends
//! - `tcp`: TCP sockets, `tcp://host:port/objectUri`
//! - `pipe`: local named pipes (Unix domain sockets), `\\.\pipe\name\objectUri`
//!
//! A transport is owned by exactly one connection at a time. Reads and
//! writes block; `set_nonblocking` is only flipped by the readiness
//! watcher while it probes an idle connection. `send_async` writes on a
//! separate thread and returns a cancellable `SendHandle`.

mod address;
mod pipe;
mod send;
mod tcp;

use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Result, WireError};

pub use address::{parse_url, Address};
pub use pipe::{PipeListener, PipeTransport};
pub use send::{send_async, SendHandle, SendOutcome};
pub use tcp::{TcpListenerTransport, TcpTransport};

/// A connected, bidirectional byte endpoint
pub trait Transport: Read + Write + Send + fmt::Debug {
    /// Read without consuming
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Switch between blocking and non-blocking reads
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;

    /// Configure read/write timeouts (`None` blocks forever)
    fn set_timeouts(&self, read: Option<Duration>, write: Option<Duration>) -> io::Result<()>;

    /// True only between a successful connect/accept and `close`
    fn is_connected(&self) -> bool;

    /// True when the peer is on this machine
    fn is_local(&self) -> bool;

    /// Printable peer address for logging
    fn remote_address(&self) -> &str;

    /// Authenticated identity of the peer, when the backend knows one
    fn client_identity(&self) -> Option<&str> {
        None
    }

    /// Shut the endpoint down; later operations fail with `NotConnected`
    fn close(&mut self) -> io::Result<()>;
}

/// A bound endpoint accepting inbound transports
pub trait Listener: Send + Sync + fmt::Debug {
    /// Block until a peer connects
    fn accept(&self) -> io::Result<Box<dyn Transport>>;

    /// Make `accept` return `WouldBlock` instead of blocking
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;

    /// Address peers should connect to
    fn local_address(&self) -> Address;
}

/// Open a client transport to `address`
pub fn connect(address: &Address, config: &Config) -> Result<Box<dyn Transport>> {
    let transport: Box<dyn Transport> = match address {
        Address::Tcp { .. } => Box::new(TcpTransport::connect(address, config.connect_timeout())?),
        Address::Pipe { .. } => Box::new(PipeTransport::connect(address)?),
    };
    transport.set_timeouts(config.read_timeout(), config.write_timeout())?;
    tracing::debug!("Connected to {}", address);
    Ok(transport)
}

/// Bind and listen on `address`
pub fn bind(address: &Address, backlog: u32) -> Result<Box<dyn Listener>> {
    let listener: Box<dyn Listener> = match address {
        Address::Tcp { .. } => Box::new(TcpListenerTransport::bind(address, backlog)?),
        Address::Pipe { .. } => Box::new(PipeListener::bind(address, backlog)?),
    };
    tracing::info!("Listening on {}", listener.local_address());
    Ok(listener)
}

/// Error returned by operations on a closed transport
pub(crate) fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is closed")
}

pub(crate) fn unsupported_address(address: &Address) -> WireError {
    WireError::InvalidAddress(format!("{} is not supported on this backend", address))
}

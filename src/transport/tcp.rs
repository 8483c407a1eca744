//! TCP backend

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::{not_connected, unsupported_address, Address, Listener, Transport};
use crate::error::{Result, WireError};

/// A connected TCP socket
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    peer_addr: String,
    local: bool,
}

impl TcpTransport {
    /// Connect to a tcp address, trying every resolved socket address
    pub fn connect(address: &Address, timeout: Option<Duration>) -> Result<Self> {
        let target = address
            .socket_addr_string()
            .ok_or_else(|| unsupported_address(address))?;

        let mut last_err = None;
        for addr in target.to_socket_addrs()? {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => return Self::from_stream(stream).map_err(WireError::from),
                Err(e) => last_err = Some(e),
            }
        }

        Err(match last_err {
            Some(e) => WireError::Io(e),
            None => WireError::InvalidAddress(format!("{} did not resolve", target)),
        })
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let peer = stream.peer_addr()?;
        Ok(Self {
            peer_addr: peer.to_string(),
            local: peer.ip().is_loopback(),
            stream: Some(stream),
        })
    }

    fn stream(&self) -> io::Result<&TcpStream> {
        self.stream.as_ref().ok_or_else(not_connected)
    }
}

impl Read for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream = self.stream()?;
        stream.read(buf)
    }
}

impl Write for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut stream = self.stream()?;
        stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut stream = self.stream()?;
        stream.flush()
    }
}

impl Transport for TcpTransport {
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream()?.peek(buf)
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.stream()?.set_nonblocking(nonblocking)
    }

    fn set_timeouts(&self, read: Option<Duration>, write: Option<Duration>) -> io::Result<()> {
        let stream = self.stream()?;
        stream.set_read_timeout(read)?;
        stream.set_write_timeout(write)
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn is_local(&self) -> bool {
        self.local
    }

    fn remote_address(&self) -> &str {
        &self.peer_addr
    }

    fn close(&mut self) -> io::Result<()> {
        match self.stream.take() {
            Some(stream) => match stream.shutdown(Shutdown::Both) {
                // Peer already went away
                Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
                other => other,
            },
            None => Ok(()),
        }
    }
}

/// A bound TCP listener
#[derive(Debug)]
pub struct TcpListenerTransport {
    listener: TcpListener,
    address: Address,
}

impl TcpListenerTransport {
    /// Bind and listen; port 0 picks an ephemeral port
    pub fn bind(address: &Address, backlog: u32) -> Result<Self> {
        let target = address
            .socket_addr_string()
            .ok_or_else(|| unsupported_address(address))?;
        let listener = TcpListener::bind(&target)?;

        let local = listener.local_addr()?;
        let host = match address {
            Address::Tcp { host, .. } => host.clone(),
            Address::Pipe { .. } => local.ip().to_string(),
        };
        tracing::debug!("Bound {} (requested backlog {})", local, backlog);

        Ok(Self {
            listener,
            address: Address::Tcp {
                host,
                port: local.port(),
            },
        })
    }
}

impl Listener for TcpListenerTransport {
    fn accept(&self) -> io::Result<Box<dyn Transport>> {
        let (stream, _) = self.listener.accept()?;
        // Accepted sockets inherit non-blocking mode on some platforms
        stream.set_nonblocking(false)?;
        Ok(Box::new(TcpTransport::from_stream(stream)?))
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.listener.set_nonblocking(nonblocking)
    }

    fn local_address(&self) -> Address {
        self.address.clone()
    }
}

//! Named pipe backend
//!
//! - Unix: Unix Domain Socket at `$TMPDIR/wirecall-{name}.sock`
//! - Other platforms: not available, connect/bind fail with `InvalidAddress`

pub use imp::{PipeListener, PipeTransport};

fn check_local(address: &super::Address) -> crate::error::Result<()> {
    match address {
        super::Address::Pipe { host, .. }
            if host == "." || host.eq_ignore_ascii_case("localhost") =>
        {
            Ok(())
        }
        _ => Err(crate::error::WireError::InvalidAddress(format!(
            "{} is not a local pipe",
            address
        ))),
    }
}

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod imp {
    use std::io::{self, Read, Write};
    use std::net::Shutdown;
    use std::os::unix::net::{UnixListener, UnixStream};
    use std::path::PathBuf;
    use std::time::Duration;

    use super::check_local;
    use crate::error::Result;
    use crate::transport::{not_connected, unsupported_address, Address, Listener, Transport};

    /// A connected pipe
    ///
    /// `UnixStream` has no stable `peek`, so peeked bytes are held in
    /// `pending` and served before the socket is read again.
    #[derive(Debug)]
    pub struct PipeTransport {
        stream: Option<UnixStream>,
        pending: Vec<u8>,
        name: String,
    }

    impl PipeTransport {
        pub fn connect(address: &Address) -> Result<Self> {
            check_local(address)?;
            let path = address.pipe_path().ok_or_else(|| unsupported_address(address))?;
            let stream = UnixStream::connect(&path)?;
            Ok(Self::from_stream(stream, address.to_string()))
        }

        fn from_stream(stream: UnixStream, name: String) -> Self {
            Self {
                stream: Some(stream),
                pending: Vec::new(),
                name,
            }
        }

        fn stream(&self) -> io::Result<&UnixStream> {
            self.stream.as_ref().ok_or_else(not_connected)
        }
    }

    impl Read for PipeTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.pending.is_empty() {
                let n = buf.len().min(self.pending.len());
                buf[..n].copy_from_slice(&self.pending[..n]);
                self.pending.drain(..n);
                return Ok(n);
            }
            let mut stream = self.stream()?;
            stream.read(buf)
        }
    }

    impl Write for PipeTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut stream = self.stream()?;
            stream.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            let mut stream = self.stream()?;
            stream.flush()
        }
    }

    impl Transport for PipeTransport {
        fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending.len() < buf.len() {
                let mut chunk = vec![0u8; buf.len() - self.pending.len()];
                let mut stream = self.stream()?;
                let n = stream.read(&mut chunk)?;
                self.pending.extend_from_slice(&chunk[..n]);
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            Ok(n)
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
            true
        }

        fn remote_address(&self) -> &str {
            &self.name
        }

        fn close(&mut self) -> io::Result<()> {
            self.pending.clear();
            match self.stream.take() {
                Some(stream) => match stream.shutdown(Shutdown::Both) {
                    Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
                    other => other,
                },
                None => Ok(()),
            }
        }
    }

    /// A bound pipe; removes its socket file on drop
    #[derive(Debug)]
    pub struct PipeListener {
        listener: UnixListener,
        address: Address,
        path: PathBuf,
    }

    impl PipeListener {
        pub fn bind(address: &Address, backlog: u32) -> Result<Self> {
            check_local(address)?;
            let path = address.pipe_path().ok_or_else(|| unsupported_address(address))?;

            // A stale socket file from a crashed process blocks bind
            if path.exists() && UnixStream::connect(&path).is_err() {
                std::fs::remove_file(&path)?;
            }

            let listener = UnixListener::bind(&path)?;
            tracing::debug!("Bound pipe {} (requested backlog {})", path.display(), backlog);

            Ok(Self {
                listener,
                address: address.clone(),
                path,
            })
        }
    }

    impl Listener for PipeListener {
        fn accept(&self) -> io::Result<Box<dyn Transport>> {
            let (stream, _) = self.listener.accept()?;
            stream.set_nonblocking(false)?;
            Ok(Box::new(PipeTransport::from_stream(
                stream,
                self.address.to_string(),
            )))
        }

        fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
            self.listener.set_nonblocking(nonblocking)
        }

        fn local_address(&self) -> Address {
            self.address.clone()
        }
    }

    impl Drop for PipeListener {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

// ============================================================================
// Fallback Implementation
// ============================================================================

#[cfg(not(unix))]
mod imp {
    use std::io::{self, Read, Write};
    use std::time::Duration;

    use super::check_local;
    use crate::error::{Result, WireError};
    use crate::transport::{not_connected, Address, Listener, Transport};

    fn unavailable(address: &Address) -> WireError {
        WireError::InvalidAddress(format!("named pipes are not available here: {}", address))
    }

    /// Placeholder transport; can never be constructed
    #[derive(Debug)]
    pub struct PipeTransport {
        _private: (),
    }

    impl PipeTransport {
        pub fn connect(address: &Address) -> Result<Self> {
            check_local(address)?;
            Err(unavailable(address))
        }
    }

    impl Read for PipeTransport {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(not_connected())
        }
    }

    impl Write for PipeTransport {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(not_connected())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(not_connected())
        }
    }

    impl Transport for PipeTransport {
        fn peek(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(not_connected())
        }

        fn set_nonblocking(&self, _nonblocking: bool) -> io::Result<()> {
            Err(not_connected())
        }

        fn set_timeouts(
            &self,
            _read: Option<Duration>,
            _write: Option<Duration>,
        ) -> io::Result<()> {
            Err(not_connected())
        }

        fn is_connected(&self) -> bool {
            false
        }

        fn is_local(&self) -> bool {
            true
        }

        fn remote_address(&self) -> &str {
            ""
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Placeholder listener; can never be constructed
    #[derive(Debug)]
    pub struct PipeListener {
        address: Address,
    }

    impl PipeListener {
        pub fn bind(address: &Address, _backlog: u32) -> Result<Self> {
            check_local(address)?;
            Err(unavailable(address))
        }
    }

    impl Listener for PipeListener {
        fn accept(&self) -> io::Result<Box<dyn Transport>> {
            Err(not_connected())
        }

        fn set_nonblocking(&self, _nonblocking: bool) -> io::Result<()> {
            Err(not_connected())
        }

        fn local_address(&self) -> Address {
            self.address.clone()
        }
    }
}

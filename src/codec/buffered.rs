//! Buffered stream over a transport
//!
//! Small writes are collected and sent when the buffer is full or on
//! `flush`; reads are served from the buffer before the transport is read
//! again. Read and write halves are separate, so buffered input survives a
//! write.

use std::io::{self, BufRead, Read, Write};

use bytes::BytesMut;

use crate::transport::Transport;

/// Default size of each buffer half
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Outcome of a non-blocking fill attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    /// Bytes are buffered and ready to be read
    Ready(usize),

    /// Nothing arrived yet
    Pending,

    /// Peer closed the connection
    Closed,
}

/// A transport with read and write buffers
#[derive(Debug)]
pub struct BufferedStream {
    transport: Box<dyn Transport>,
    read_buf: Box<[u8]>,
    read_pos: usize,
    read_len: usize,
    write_buf: BytesMut,
    capacity: usize,
}

impl BufferedStream {
    /// Wrap a transport with buffers of `capacity` bytes
    pub fn new(transport: Box<dyn Transport>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            transport,
            read_buf: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            read_len: 0,
            write_buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    /// Number of received bytes not yet consumed
    pub fn buffered_len(&self) -> usize {
        self.read_len - self.read_pos
    }

    pub fn has_buffered_data(&self) -> bool {
        self.buffered_len() > 0
    }

    /// Try to fill the read buffer without blocking
    ///
    /// Used by the readiness watcher to learn that a request has arrived:
    /// whatever is read stays in the buffer for the next request parse.
    pub fn try_fill(&mut self) -> io::Result<FillStatus> {
        if self.has_buffered_data() {
            return Ok(FillStatus::Ready(self.buffered_len()));
        }
        self.read_pos = 0;
        self.read_len = 0;

        self.transport.set_nonblocking(true)?;
        let result = self.transport.read(&mut self.read_buf);
        self.transport.set_nonblocking(false)?;

        match result {
            Ok(0) => Ok(FillStatus::Closed),
            Ok(n) => {
                self.read_len = n;
                Ok(FillStatus::Ready(n))
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(FillStatus::Pending)
            }
            Err(e) => Err(e),
        }
    }

    /// Drop buffered data and close the transport
    pub fn close(&mut self) -> io::Result<()> {
        self.read_pos = 0;
        self.read_len = 0;
        self.write_buf.clear();
        self.transport.close()
    }

    fn flush_buf(&mut self) -> io::Result<()> {
        if !self.write_buf.is_empty() {
            self.transport.write_all(&self.write_buf)?;
            self.write_buf.clear();
        }
        Ok(())
    }
}

impl Read for BufferedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Large reads skip the buffer entirely
        if !self.has_buffered_data() && buf.len() >= self.capacity {
            return self.transport.read(buf);
        }
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for BufferedStream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if !self.has_buffered_data() {
            self.read_pos = 0;
            self.read_len = self.transport.read(&mut self.read_buf)?;
        }
        Ok(&self.read_buf[self.read_pos..self.read_len])
    }

    fn consume(&mut self, amt: usize) {
        self.read_pos = (self.read_pos + amt).min(self.read_len);
    }
}

impl Write for BufferedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.write_buf.len() + buf.len() > self.capacity {
            self.flush_buf()?;
        }
        if buf.len() >= self.capacity {
            self.transport.write(buf)
        } else {
            self.write_buf.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buf()?;
        self.transport.flush()
    }
}

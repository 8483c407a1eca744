//! Chunked payload encoding
//!
//! ## Wire Format
//! ```text
//! ┌────────────┬─────────┬────────────┬─────────┬─────┬───────────┐
//! │ varint(n1) │ n1 bytes│ varint(n2) │ n2 bytes│ ... │ varint(0) │
//! └────────────┴─────────┴────────────┴─────────┴─────┴───────────┘
//! ```
//!
//! The zero-length chunk is the only end-of-stream marker. A writer never
//! emits it for an empty `write`, only from `finish`.

use std::io::{self, Read, Write};

use super::varint::{read_varint, write_varint};

/// Writes every non-empty `write` call as one chunk
#[derive(Debug)]
pub struct ChunkedWriter<W: Write> {
    inner: W,
    chunks_written: u64,
    bytes_written: u64,
}

impl<W: Write> ChunkedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            chunks_written: 0,
            bytes_written: 0,
        }
    }

    /// Payload bytes written so far (excluding length prefixes)
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    /// Emit the terminating zero-length chunk, flush, and return the inner writer
    pub fn finish(mut self) -> io::Result<W> {
        write_varint(&mut self.inner, 0)?;
        self.inner.flush()?;
        tracing::trace!(
            "Chunked payload finished: {} bytes in {} chunks",
            self.bytes_written,
            self.chunks_written
        );
        Ok(self.inner)
    }
}

impl<W: Write> Write for ChunkedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        write_varint(&mut self.inner, buf.len() as u64)?;
        self.inner.write_all(buf)?;
        self.chunks_written += 1;
        self.bytes_written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    /// Next read starts with a chunk length
    Header,

    /// Bytes left in the current chunk
    Body(usize),

    /// Terminator seen, end not yet reported
    Ended,

    /// End reported; further reads fail
    Exhausted,
}

/// Decodes a chunked payload
///
/// Returns `Ok(0)` once after the terminator, then fails every later read
/// with "no more data". The inner reader is never touched after the
/// terminator, so it cannot block on the next frame.
#[derive(Debug)]
pub struct ChunkedReader<R: Read> {
    inner: R,
    state: ReadState,
    bytes_read: u64,
}

impl<R: Read> ChunkedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: ReadState::Header,
            bytes_read: 0,
        }
    }

    /// True once the terminating chunk has been consumed
    pub fn is_finished(&self) -> bool {
        matches!(self.state, ReadState::Ended | ReadState::Exhausted)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Consume the rest of the payload, returning how many bytes were skipped
    pub fn drain(&mut self) -> io::Result<u64> {
        if self.is_finished() {
            return Ok(0);
        }
        let skipped = io::copy(self, &mut io::sink())?;
        Ok(skipped)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.state {
                ReadState::Header => {
                    let len = read_varint(&mut self.inner)? as usize;
                    self.state = if len == 0 {
                        ReadState::Ended
                    } else {
                        ReadState::Body(len)
                    };
                }
                ReadState::Body(remaining) => {
                    if buf.is_empty() {
                        return Ok(0);
                    }
                    let want = remaining.min(buf.len());
                    let n = self.inner.read(&mut buf[..want])?;
                    if n == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "stream ended inside a chunk",
                        ));
                    }
                    self.bytes_read += n as u64;
                    self.state = if n == remaining {
                        ReadState::Header
                    } else {
                        ReadState::Body(remaining - n)
                    };
                    return Ok(n);
                }
                ReadState::Ended => {
                    self.state = ReadState::Exhausted;
                    return Ok(0);
                }
                ReadState::Exhausted => return Err(no_more_data()),
            }
        }
    }
}

/// Error for reads past the end of a payload stream
pub(crate) fn no_more_data() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "no more data in payload stream")
}

//! Fixed-length payload reader

use std::io::{self, Read};

use super::chunked::no_more_data;

/// Reads exactly `length` bytes from the inner reader
///
/// Reads are truncated to the remaining count. At the end `Ok(0)` is
/// returned once, every later read fails.
#[derive(Debug)]
pub struct FixedReader<R: Read> {
    inner: R,
    remaining: u64,
    end_reported: bool,
}

impl<R: Read> FixedReader<R> {
    pub fn new(inner: R, length: u64) -> Self {
        Self {
            inner,
            remaining: length,
            end_reported: false,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Consume the rest of the payload, returning how many bytes were skipped
    pub fn drain(&mut self) -> io::Result<u64> {
        if self.remaining == 0 {
            return Ok(0);
        }
        io::copy(self, &mut io::sink())
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for FixedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            if self.end_reported {
                return Err(no_more_data());
            }
            self.end_reported = true;
            return Ok(0);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let want = (buf.len() as u64).min(self.remaining) as usize;
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended with {} payload bytes missing", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

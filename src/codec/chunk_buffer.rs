//! In-memory chunked buffer
//!
//! Stages a whole message before it is sent, so the sender can choose
//! between a fixed content length and chunked transmission. Storage is a
//! list of fixed-size chunks; appending never moves written bytes.

use std::io::{self, Read, Write};

use bytes::BytesMut;

/// Default chunk size
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Append-only byte buffer made of fixed-size chunks
#[derive(Debug)]
pub struct ChunkBuffer {
    chunks: Vec<BytesMut>,
    chunk_size: usize,
    len: usize,
    read_chunk: usize,
    read_offset: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunks: Vec::new(),
            chunk_size: chunk_size.max(1),
            len: 0,
            read_chunk: 0,
            read_offset: 0,
        }
    }

    /// Total bytes written
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Move the read cursor back to the start
    pub fn rewind(&mut self) {
        self.read_chunk = 0;
        self.read_offset = 0;
    }

    /// Write every byte to `writer`, regardless of the read cursor
    pub fn copy_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<u64> {
        for chunk in &self.chunks {
            writer.write_all(chunk)?;
        }
        Ok(self.len as u64)
    }

    /// Copy the contents into one contiguous vector
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&[u8]> for ChunkBuffer {
    fn from(bytes: &[u8]) -> Self {
        let mut buffer = ChunkBuffer::new();
        buffer.extend_from_slice(bytes);
        buffer
    }
}

impl ChunkBuffer {
    /// Append bytes, filling the last chunk before allocating a new one
    pub fn extend_from_slice(&mut self, mut bytes: &[u8]) {
        self.len += bytes.len();
        while !bytes.is_empty() {
            let needs_chunk = self
                .chunks
                .last()
                .map_or(true, |last| last.len() == self.chunk_size);
            if needs_chunk {
                self.chunks.push(BytesMut::with_capacity(self.chunk_size));
            }
            // Just pushed or checked above
            let Some(last) = self.chunks.last_mut() else {
                break;
            };
            let take = (self.chunk_size - last.len()).min(bytes.len());
            last.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
        }
    }
}

impl Write for ChunkBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for ChunkBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut copied = 0;
        while copied < buf.len() {
            let Some(chunk) = self.chunks.get(self.read_chunk) else {
                break;
            };
            let available = &chunk[self.read_offset..];
            if available.is_empty() {
                // A partially filled last chunk may still grow
                if self.read_chunk + 1 == self.chunks.len() {
                    break;
                }
                self.read_chunk += 1;
                self.read_offset = 0;
                continue;
            }
            let n = available.len().min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&available[..n]);
            copied += n;
            self.read_offset += n;
        }
        Ok(copied)
    }
}

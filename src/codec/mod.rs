//! Codec Module
//!
//! Byte-stream building blocks below the framing protocol.
//!
//! ## Components
//! - `BufferedStream`: read/write buffers over a transport
//! - `ChunkedWriter` / `ChunkedReader`: self-delimiting payloads of unknown length
//! - `FixedReader`: payloads with a declared length
//! - `ChunkBuffer`: in-memory staging of a whole payload
//! - varint helpers shared by chunk lengths and header strings

mod buffered;
mod chunk_buffer;
mod chunked;
mod fixed;
mod varint;

pub use buffered::{BufferedStream, FillStatus, DEFAULT_BUFFER_SIZE};
pub use chunk_buffer::{ChunkBuffer, DEFAULT_CHUNK_SIZE};
pub use chunked::{ChunkedReader, ChunkedWriter};
pub use fixed::FixedReader;
pub use varint::{encode_varint, read_varint, write_varint, MAX_VARINT_LEN};

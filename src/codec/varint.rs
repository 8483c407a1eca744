//! LEB128 varints
//!
//! 7 data bits per byte, high bit set on every byte except the last.
//! Values are encoded from `u64` so a length can never be negative; decoding
//! is limited to `u32` (at most 5 bytes).

use std::io::{self, Read, Write};

/// Longest encoding of a `u32`
pub const MAX_VARINT_LEN: usize = 5;

/// Encode `value` into `buf`, returning the number of bytes used
pub fn encode_varint(mut value: u64, buf: &mut [u8; 10]) -> usize {
    let mut len = 0;
    while value >= 0x80 {
        buf[len] = (value as u8 & 0x7f) | 0x80;
        value >>= 7;
        len += 1;
    }
    buf[len] = value as u8;
    len + 1
}

/// Write `value` as a varint
pub fn write_varint<W: Write + ?Sized>(writer: &mut W, value: u64) -> io::Result<()> {
    let mut buf = [0u8; 10];
    let len = encode_varint(value, &mut buf);
    writer.write_all(&buf[..len])
}

/// Read a varint that must fit in a `u32`
///
/// Fails with `UnexpectedEof` if the stream ends mid-value and with
/// `InvalidData` if the value overflows.
pub fn read_varint<R: Read + ?Sized>(reader: &mut R) -> io::Result<u32> {
    let mut value: u64 = 0;
    for i in 0..MAX_VARINT_LEN {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        value |= u64::from(byte[0] & 0x7f) << (7 * i);
        if byte[0] & 0x80 == 0 {
            return u32::try_from(value).map_err(|_| overflow());
        }
    }
    Err(overflow())
}

fn overflow() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "varint exceeds 32 bits")
}

//! Variable-length integers and length-prefixed strings.
//!
//! Unsigned values are LEB128: seven payload bits per byte, least significant
//! group first, high bit set on every byte except the last. Signed values are
//! zigzag-mapped first so small negative numbers stay short.

use crate::model::counter::clamp_hits;
use crate::result::{CovError, CovResult};
use std::io::{self, Read, Write};

/// Longest LEB128 encoding of a `u64`
pub const MAX_VARINT_LEN: usize = 10;

/// Upper bound on speculative `Vec` preallocation from stream-provided counts
pub(crate) const PREALLOC_LIMIT: usize = 4096;

/// Write an unsigned varint
pub fn write_varint<W: Write + ?Sized>(w: &mut W, mut value: u64) -> io::Result<()> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let mut len = 0;
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf[len] = byte;
            len += 1;
            break;
        }
        buf[len] = byte | 0x80;
        len += 1;
    }
    w.write_all(&buf[..len])
}

/// Write a `usize` as an unsigned varint
pub fn write_len<W: Write + ?Sized>(w: &mut W, len: usize) -> io::Result<()> {
    write_varint(w, len as u64)
}

/// Read an unsigned varint
pub fn read_varint<R: Read + ?Sized>(r: &mut R, context: &str) -> CovResult<u64> {
    let mut value: u64 = 0;
    for i in 0..MAX_VARINT_LEN {
        let byte = read_byte(r, context)?;
        let payload = u64::from(byte & 0x7F);
        if i == MAX_VARINT_LEN - 1 && payload > 1 {
            return Err(CovError::format(format!("varint overflow in {context}")));
        }
        value |= payload << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(CovError::format(format!("varint too long in {context}")))
}

/// Read an unsigned varint that must fit in `u32`
pub fn read_u32<R: Read + ?Sized>(r: &mut R, context: &str) -> CovResult<u32> {
    let value = read_varint(r, context)?;
    u32::try_from(value)
        .map_err(|_| CovError::format(format!("{context} out of range: {value}")))
}

/// Highest line number accepted from a stream.
///
/// Line records are indexed by number, so an unchecked number read from a
/// corrupt stream would size an allocation.
pub const MAX_LINE_NUMBER: u32 = 65_535;

/// Read a line number, rejecting values above [`MAX_LINE_NUMBER`]
pub fn read_line_number<R: Read + ?Sized>(r: &mut R, context: &str) -> CovResult<u32> {
    let value = read_varint(r, context)?;
    u32::try_from(value)
        .ok()
        .filter(|&line| line <= MAX_LINE_NUMBER)
        .ok_or_else(|| {
            CovError::format(format!(
                "{context} {value} exceeds maximum line {MAX_LINE_NUMBER}"
            ))
        })
}

/// Read a hit count, clamped to the counter ceiling
pub fn read_hits<R: Read + ?Sized>(r: &mut R, context: &str) -> CovResult<u32> {
    read_varint(r, context).map(clamp_hits)
}

/// Read an unsigned varint used as a count or length
pub fn read_len<R: Read + ?Sized>(r: &mut R, context: &str) -> CovResult<usize> {
    let value = read_varint(r, context)?;
    usize::try_from(value)
        .map_err(|_| CovError::format(format!("{context} out of range: {value}")))
}

/// Zigzag-map a signed value
#[inline]
#[must_use]
pub const fn zigzag(value: i32) -> u64 {
    (((value << 1) ^ (value >> 31)) as u32) as u64
}

/// Undo [`zigzag`]
#[inline]
#[must_use]
pub const fn unzigzag(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Write a signed varint
pub fn write_signed<W: Write + ?Sized>(w: &mut W, value: i32) -> io::Result<()> {
    write_varint(w, zigzag(value))
}

/// Read a signed varint
pub fn read_signed<R: Read + ?Sized>(r: &mut R, context: &str) -> CovResult<i32> {
    Ok(unzigzag(read_u32(r, context)?))
}

/// Write a length-prefixed UTF-8 string
pub fn write_str<W: Write + ?Sized>(w: &mut W, s: &str) -> io::Result<()> {
    write_len(w, s.len())?;
    w.write_all(s.as_bytes())
}

/// Read a length-prefixed UTF-8 string
pub fn read_str<R: Read + ?Sized>(r: &mut R, context: &str) -> CovResult<String> {
    let len = read_len(r, context)?;
    let bytes = read_bytes(r, len, context)?;
    String::from_utf8(bytes).map_err(|_| CovError::format(format!("invalid UTF-8 in {context}")))
}

/// Read exactly `len` bytes without trusting `len` for preallocation
pub fn read_bytes<R: Read + ?Sized>(r: &mut R, len: usize, context: &str) -> CovResult<Vec<u8>> {
    let mut bytes = Vec::with_capacity(len.min(PREALLOC_LIMIT));
    let read = r.take(len as u64).read_to_end(&mut bytes)?;
    if read != len {
        return Err(CovError::truncated(context));
    }
    Ok(bytes)
}

fn read_byte<R: Read + ?Sized>(r: &mut R, context: &str) -> CovResult<u8> {
    let mut byte = [0u8; 1];
    match r.read_exact(&mut byte) {
        Ok(()) => Ok(byte[0]),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
            Err(CovError::truncated(context))
        }
        Err(err) => Err(err.into()),
    }
}

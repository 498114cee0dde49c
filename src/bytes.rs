//! Small bounds-checked little-endian readers used by every on-disk record
//! parser in `structs.rs` and `node.rs`. Nodes are walked as plain
//! immutable byte slices with every offset checked against the buffer's
//! length, rather than by casting pointers onto `#[repr(C, packed)]`
//! structs (which would build references to underpaligned fields).

use crate::error::{ParserError, Result};

pub fn u8_at(buf: &[u8], off: usize) -> Result<u8> {
    buf.get(off)
        .copied()
        .ok_or(ParserError::Malformed("read past end of buffer (u8)"))
}

pub fn u16_at(buf: &[u8], off: usize) -> Result<u16> {
    let s = buf
        .get(off..off + 2)
        .ok_or(ParserError::Malformed("read past end of buffer (u16)"))?;
    Ok(u16::from_le_bytes(s.try_into().unwrap()))
}

pub fn u32_at(buf: &[u8], off: usize) -> Result<u32> {
    let s = buf
        .get(off..off + 4)
        .ok_or(ParserError::Malformed("read past end of buffer (u32)"))?;
    Ok(u32::from_le_bytes(s.try_into().unwrap()))
}

pub fn u64_at(buf: &[u8], off: usize) -> Result<u64> {
    let s = buf
        .get(off..off + 8)
        .ok_or(ParserError::Malformed("read past end of buffer (u64)"))?;
    Ok(u64::from_le_bytes(s.try_into().unwrap()))
}

pub fn bytes_at<'a>(buf: &'a [u8], off: usize, len: usize) -> Result<&'a [u8]> {
    buf.get(off..off + len)
        .ok_or(ParserError::Malformed("read past end of buffer (bytes)"))
}

//! Block I/O façade.
//!
//! The parser never assumes a single memory-mapped image file the way the
//! original tooling did. Callers register one read callback per device id
//! (the `device_id` values that show up in `Stripe` records); multi-device
//! filesystems are resolved by dispatching each physical read to whichever
//! device backs it.

use std::collections::HashMap;

use crate::error::{ParserError, Result};

/// Reads `buf.len()` bytes starting at the given physical offset on a
/// device. Returns the number of bytes actually read.
pub trait BlockRead: Send {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize>;
}

impl<F> BlockRead for F
where
    F: FnMut(u64, &mut [u8]) -> std::io::Result<usize> + Send,
{
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        self(offset, buf)
    }
}

impl<F> BlockWrite for F
where
    F: FnMut(u64, &[u8]) -> std::io::Result<usize> + Send,
{
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<usize> {
        self(offset, buf)
    }
}

/// Writes `buf` at the given physical offset on a device. Returns the
/// number of bytes actually written. No tree walker in this parser calls
/// this; it exists so the façade stays symmetric with `BlockRead`, per
/// spec.md's note that writes are provided but unused.
pub trait BlockWrite: Send {
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<usize>;
}

/// Dispatches physical reads (and, symmetrically, writes) to per-device
/// callbacks.
#[derive(Default)]
pub struct BlockIo {
    devices: HashMap<u64, Box<dyn BlockRead>>,
    write_devices: HashMap<u64, Box<dyn BlockWrite>>,
}

impl BlockIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_read_handler(&mut self, device_id: u64, handler: Box<dyn BlockRead>) {
        self.devices.insert(device_id, handler);
    }

    pub fn set_write_handler(&mut self, device_id: u64, handler: Box<dyn BlockWrite>) {
        self.write_devices.insert(device_id, handler);
    }

    /// Reads exactly `buf.len()` bytes from `device_id` at `offset`.
    pub fn read_raw(&mut self, device_id: u64, offset: u64, buf: &mut [u8]) -> Result<()> {
        let device = self
            .devices
            .get_mut(&device_id)
            .ok_or(ParserError::TranslationFailure { logical: offset })?;

        let n = device
            .read_at(offset, buf)
            .map_err(|_| ParserError::ShortRead {
                requested: buf.len() as u64,
                actual: 0,
            })?;
        if n != buf.len() {
            return Err(ParserError::ShortRead {
                requested: buf.len() as u64,
                actual: n as u64,
            });
        }
        Ok(())
    }

    /// Writes `buf` at `device_id`/`offset`. Unused by any read-path
    /// operation; present only so a caller handed translated addresses
    /// (see `Parser::write_logical`) has somewhere to forward them to.
    pub fn write_raw(&mut self, device_id: u64, offset: u64, buf: &[u8]) -> Result<()> {
        let device = self
            .write_devices
            .get_mut(&device_id)
            .ok_or(ParserError::TranslationFailure { logical: offset })?;

        let n = device
            .write_at(offset, buf)
            .map_err(|_| ParserError::ShortRead {
                requested: buf.len() as u64,
                actual: 0,
            })?;
        if n != buf.len() {
            return Err(ParserError::ShortRead {
                requested: buf.len() as u64,
                actual: n as u64,
            });
        }
        Ok(())
    }
}

/// In-memory backing store, used by tests and by callers who have already
/// loaded (or memory-mapped) a whole device image.
pub struct MemoryDevice {
    data: Vec<u8>,
}

impl MemoryDevice {
    pub fn new(data: Vec<u8>) -> Self {
        MemoryDevice { data }
    }
}

impl BlockRead for MemoryDevice {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        let offset = offset as usize;
        let end = offset
            .checked_add(buf.len())
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;
        if end > self.data.len() {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        }
        buf.copy_from_slice(&self.data[offset..end]);
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_device_round_trips() {
        let mut io = BlockIo::new();
        io.set_read_handler(1, Box::new(MemoryDevice::new((0..16u8).collect())));

        let mut buf = [0u8; 4];
        io.read_raw(1, 4, &mut buf).unwrap();
        assert_eq!(buf, [4, 5, 6, 7]);
    }

    #[test]
    fn unknown_device_errors() {
        let mut io = BlockIo::new();
        let mut buf = [0u8; 4];
        assert!(io.read_raw(99, 0, &mut buf).is_err());
    }

    #[test]
    fn short_read_errors() {
        let mut io = BlockIo::new();
        io.set_read_handler(1, Box::new(MemoryDevice::new(vec![0u8; 4])));
        let mut buf = [0u8; 8];
        assert!(io.read_raw(1, 0, &mut buf).is_err());
    }
}

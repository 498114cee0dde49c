//! Superblock discovery: scans every candidate physical offset, validates
//! magic and checksum, and keeps the copy with the highest generation.

use crate::constants::{CSUM_COVERAGE_START, SUPERBLOCK_OFFSETS, SUPERBLOCK_SIZE};
use crate::crc32c::crc32c;
use crate::error::{ParserError, Result};
use crate::io::BlockIo;
use crate::structs::Superblock;

/// Reads and validates every candidate superblock on `device_id`, returning
/// the one with the highest `generation`. A candidate is rejected (not
/// fatal) if its offset is out of range, its magic doesn't match, or its
/// checksum doesn't match; only if *no* candidate validates is this an
/// error.
pub fn find_superblock(io: &mut BlockIo, device_id: u64) -> Result<Superblock> {
    let mut best: Option<Superblock> = None;

    for &offset in SUPERBLOCK_OFFSETS {
        let mut buf = vec![0u8; SUPERBLOCK_SIZE];
        if io.read_raw(device_id, offset, &mut buf).is_err() {
            continue;
        }

        let sb = match Superblock::parse(&buf) {
            Ok(sb) => sb,
            Err(_) => continue,
        };

        let expected = u32::from_le_bytes(sb.csum[0..4].try_into().unwrap());
        let actual = crc32c(!0u32, &buf[CSUM_COVERAGE_START..]);
        if actual != expected {
            continue;
        }

        if best.as_ref().map_or(true, |b| sb.generation > b.generation) {
            best = Some(sb);
        }
    }

    best.ok_or(ParserError::NoValidSuperblock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryDevice;

    fn synthetic_superblock(generation: u64) -> Vec<u8> {
        let mut buf = vec![0u8; SUPERBLOCK_SIZE];
        buf[32 + 16..32 + 16 + 8].copy_from_slice(&0u64.to_le_bytes()); // bytenr
        buf[32 + 16 + 8..32 + 16 + 16].copy_from_slice(&0u64.to_le_bytes()); // flags
        buf[32 + 16 + 16..32 + 16 + 24].copy_from_slice(b"_BHRfS_M");
        buf[32 + 16 + 24..32 + 16 + 32].copy_from_slice(&generation.to_le_bytes());
        let csum = crc32c(!0u32, &buf[CSUM_COVERAGE_START..]);
        buf[0..4].copy_from_slice(&csum.to_le_bytes());
        buf
    }

    #[test]
    fn picks_highest_generation_among_valid_candidates() {
        let mut image = vec![0u8; (SUPERBLOCK_OFFSETS[1] + SUPERBLOCK_SIZE as u64) as usize];
        let older = synthetic_superblock(1);
        let newer = synthetic_superblock(2);
        let o0 = SUPERBLOCK_OFFSETS[0] as usize;
        let o1 = SUPERBLOCK_OFFSETS[1] as usize;
        image[o0..o0 + SUPERBLOCK_SIZE].copy_from_slice(&older);
        image[o1..o1 + SUPERBLOCK_SIZE].copy_from_slice(&newer);

        let mut io = BlockIo::new();
        io.set_read_handler(1, Box::new(MemoryDevice::new(image)));

        let sb = find_superblock(&mut io, 1).unwrap();
        assert_eq!(sb.generation, 2);
    }

    #[test]
    fn no_valid_candidate_errors() {
        let image = vec![0u8; 4096];
        let mut io = BlockIo::new();
        io.set_read_handler(1, Box::new(MemoryDevice::new(image)));
        assert!(matches!(
            find_superblock(&mut io, 1),
            Err(ParserError::NoValidSuperblock)
        ));
    }
}

//! Checksum tree walker ("scrub"): compares every stored sector CRC
//! against a freshly computed one and reports how many sectors disagree.
//!
//! Unlike every other tree walker, a single mismatch doesn't abort the
//! walk — scrub's entire job is to count them.

use crate::constants::KEY_TYPE_EXTENT_CSUM;
use crate::crc32c::crc32c;
use crate::error::Result;
use crate::io::BlockIo;
use crate::node::{self, NodeView};
use crate::structs::ExtentChecksum;
use crate::translator::Translator;

/// Walks the checksum tree rooted at `root_logical`, reading every sector
/// it covers and comparing its recomputed CRC-32C against the stored
/// value. Returns the total number of sectors whose contents don't match
/// their recorded checksum.
pub fn scrub(
    translator: &Translator,
    io: &mut BlockIo,
    root_logical: u64,
    node_size: u32,
    sector_size: u32,
) -> Result<u64> {
    let mut mismatches = 0u64;
    walk(translator, io, root_logical, node_size, sector_size, &mut mismatches)?;
    Ok(mismatches)
}

fn walk(
    translator: &Translator,
    io: &mut BlockIo,
    logical: u64,
    node_size: u32,
    sector_size: u32,
    mismatches: &mut u64,
) -> Result<()> {
    let buf = node::fetch(io, translator, logical, node_size)?;
    let view = NodeView::parse(&buf)?;

    if view.is_leaf() {
        let mut ordinal = 0usize;
        while let Some(item) = view.find_item(KEY_TYPE_EXTENT_CSUM, 0, ordinal)? {
            ordinal += 1;
            let data = view.item_data(&item)?;
            let checksums = ExtentChecksum::parse(data, 0, data.len())?;

            for (i, &expected) in checksums.crcs.iter().enumerate() {
                let sector_logical = item.key.offset + (i as u64) * sector_size as u64;
                let (device_id, physical) = match translator.translate(sector_logical) {
                    Ok(addr) => addr,
                    Err(_) => {
                        *mismatches += 1;
                        continue;
                    }
                };
                let mut sector = vec![0u8; sector_size as usize];
                if io.read_raw(device_id, physical, &mut sector).is_err() {
                    *mismatches += 1;
                    continue;
                }
                let actual = crc32c(!0u32, &sector);
                if actual != expected {
                    *mismatches += 1;
                }
            }
        }
    } else {
        for ptr in view.key_ptrs()? {
            walk(translator, io, ptr.block_number, node_size, sector_size, mismatches)?;
        }
    }

    Ok(())
}

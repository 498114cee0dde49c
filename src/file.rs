//! File content reassembly from extent data items.
//!
//! Compressed and encrypted extents are out of scope (decoding their
//! payload would require pulling in compression codecs this parser
//! otherwise has no use for); such an extent causes `read_file` to fail
//! rather than silently return garbage.

use crate::constants::KEY_TYPE_EXTENT_DATA;
use crate::error::{ParserError, Result};
use crate::io::BlockIo;
use crate::node;
use crate::structs::ExtentData;
use crate::translator::Translator;

/// One `EXTENT_DATA` item, with its covered file-offset length resolved
/// up front so the read loop below doesn't need to re-decode it.
struct Extent {
    file_offset: u64,
    covered_len: u64,
    data: ExtentData,
}

/// Reads up to `dst.len()` bytes of `inode`'s contents starting at file
/// offset `offset`, walking its `EXTENT_DATA` items in file-offset order.
/// Returns the number of bytes actually copied into `dst`; this is less
/// than `dst.len()` once the last extent covering the inode is
/// exhausted.
pub fn read_file(
    translator: &Translator,
    io: &mut BlockIo,
    fs_tree_root: u64,
    node_size: u32,
    inode: u64,
    offset: u64,
    dst: &mut [u8],
) -> Result<u64> {
    let mut items = node::collect_items(translator, io, fs_tree_root, node_size, &mut |key| {
        key.objectid == inode && key.ty == KEY_TYPE_EXTENT_DATA
    })?;
    items.sort_by_key(|(key, _)| key.offset);

    let mut extents = Vec::with_capacity(items.len());
    for (key, data) in items {
        let extent = ExtentData::parse(&data, 0, data.len())?;
        let covered_len = covered_length(&extent)?;
        extents.push(Extent {
            file_offset: key.offset,
            covered_len,
            data: extent,
        });
    }

    let mut cur_offset = offset;
    let mut dst_pos = 0usize;
    let want = dst.len();

    while dst_pos < want {
        let remaining = (want - dst_pos) as u64;
        let found = extents
            .iter()
            .find(|e| e.file_offset <= cur_offset && cur_offset < e.file_offset + e.covered_len);

        let extent = match found {
            Some(e) => e,
            None => break,
        };

        let delta = cur_offset - extent.file_offset;
        let available = extent.covered_len - delta;
        let n = remaining.min(available) as usize;

        copy_extent_bytes(translator, io, &extent.data, delta, n, &mut dst[dst_pos..dst_pos + n])?;

        cur_offset += n as u64;
        dst_pos += n;
    }

    Ok(dst_pos as u64)
}

fn covered_length(extent: &ExtentData) -> Result<u64> {
    match extent {
        ExtentData::Inline { payload, .. } => Ok(payload.len() as u64),
        ExtentData::Regular {
            logical_byte_count, ..
        } => Ok(*logical_byte_count),
    }
}

/// Copies `n` bytes starting `delta` bytes into the file-offset range this
/// extent covers.
fn copy_extent_bytes(
    translator: &Translator,
    io: &mut BlockIo,
    extent: &ExtentData,
    delta: u64,
    n: usize,
    out: &mut [u8],
) -> Result<()> {
    match extent {
        ExtentData::Inline {
            compression,
            encryption,
            payload,
            ..
        } => {
            reject_encoded(*compression, *encryption)?;
            let start = delta as usize;
            let slice = payload
                .get(start..start + n)
                .ok_or(ParserError::Malformed("inline extent read out of bounds"))?;
            out.copy_from_slice(slice);
        }
        ExtentData::Regular {
            extent_logical_addr,
            prealloc,
            ..
        } => {
            if *prealloc {
                // Unwritten prealloc space reads as zeroes.
                out.iter_mut().for_each(|b| *b = 0);
                return Ok(());
            }

            // Matches `BTRFS_ReadFile`'s regular-extent read
            // (`extent_full->extent_logical_addr + off_in_ext`): the read
            // position is the extent's logical start plus the offset
            // within the file range this extent covers. `extent_offset`
            // is not part of that address.
            let (device_id, physical) = translator.translate(*extent_logical_addr)?;
            let physical = physical + delta;
            io.read_raw(device_id, physical, out)?;
        }
    }
    Ok(())
}

fn reject_encoded(compression: u8, encryption: u8) -> Result<()> {
    if compression != 0 {
        return Err(ParserError::Malformed("compressed extents are not supported"));
    }
    if encryption != 0 {
        return Err(ParserError::Malformed("encrypted extents are not supported"));
    }
    Ok(())
}

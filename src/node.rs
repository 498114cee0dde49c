//! Tree node reader: interior nodes and leaves, parsed as plain byte
//! slices rather than cast onto packed structs (see `structs.rs`), with
//! CRC-32C verification of the header's stored checksum.

use crate::crc32c::crc32c;
use crate::constants::CSUM_COVERAGE_START;
use crate::error::{ParserError, Result};
use crate::io::BlockIo;
use crate::structs::{Header, ItemPtr, KeyPtr};
use crate::translator::Translator;

/// Translates `logical` and reads one node-sized block into an owned
/// buffer. Shared by every tree walker so each one doesn't reimplement
/// translate-then-read.
pub fn fetch(io: &mut BlockIo, translator: &Translator, logical: u64, node_size: u32) -> Result<Vec<u8>> {
    let (device_id, physical) = translator.translate(logical)?;
    let mut buf = vec![0u8; node_size as usize];
    io.read_raw(device_id, physical, &mut buf)?;
    Ok(buf)
}

/// Descends a tree to find the single item whose key exactly equals
/// `target`, returning the logical address of the leaf it was found in, so
/// callers can memoise it.
pub fn find_item_with_leaf(
    translator: &Translator,
    io: &mut BlockIo,
    root_logical: u64,
    node_size: u32,
    target: crate::structs::Key,
) -> Result<Option<(u64, Vec<u8>)>> {
    let mut logical = root_logical;
    loop {
        let buf = fetch(io, translator, logical, node_size)?;
        let view = NodeView::parse(&buf)?;

        if view.is_leaf() {
            for item in view.item_ptrs()? {
                if item.key == target {
                    return Ok(Some((logical, view.item_data(&item)?.to_vec())));
                }
            }
            return Ok(None);
        }

        let ptrs = view.key_ptrs()?;
        let chosen = ptrs
            .iter()
            .take_while(|ptr| ptr.key <= target)
            .last()
            .or_else(|| ptrs.first());
        match chosen {
            Some(ptr) => logical = ptr.block_number,
            None => return Ok(None),
        }
    }
}

/// Reads the node at `logical` and, if it's a leaf, looks for an item with
/// exactly key `target` among its item pointers without descending from
/// any tree root. Used by the inode cache's fast path: a cached leaf
/// address is read once and scanned directly, and only falls back to a
/// full root-to-leaf descent on a miss or a stale cache entry.
pub fn scan_leaf_for_key(
    io: &mut BlockIo,
    translator: &Translator,
    leaf_logical: u64,
    node_size: u32,
    target: crate::structs::Key,
) -> Result<Option<Vec<u8>>> {
    let buf = fetch(io, translator, leaf_logical, node_size)?;
    let view = NodeView::parse(&buf)?;
    if !view.is_leaf() {
        return Ok(None);
    }
    for item in view.item_ptrs()? {
        if item.key == target {
            return Ok(Some(view.item_data(&item)?.to_vec()));
        }
    }
    Ok(None)
}

/// Walks an entire tree collecting every item whose key satisfies
/// `predicate`. Used where a range scan (rather than a single exact-key
/// descent) is needed: directory listings, per-inode extent scans, and
/// the checksum tree's full scrub.
pub fn collect_items<F>(
    translator: &Translator,
    io: &mut BlockIo,
    root_logical: u64,
    node_size: u32,
    predicate: &mut F,
) -> Result<Vec<(crate::structs::Key, Vec<u8>)>>
where
    F: FnMut(&crate::structs::Key) -> bool,
{
    let mut out = Vec::new();
    collect_items_rec(translator, io, root_logical, node_size, predicate, &mut out)?;
    Ok(out)
}

fn collect_items_rec<F>(
    translator: &Translator,
    io: &mut BlockIo,
    logical: u64,
    node_size: u32,
    predicate: &mut F,
    out: &mut Vec<(crate::structs::Key, Vec<u8>)>,
) -> Result<()>
where
    F: FnMut(&crate::structs::Key) -> bool,
{
    let buf = fetch(io, translator, logical, node_size)?;
    let view = NodeView::parse(&buf)?;

    if view.is_leaf() {
        for item in view.item_ptrs()? {
            if predicate(&item.key) {
                out.push((item.key, view.item_data(&item)?.to_vec()));
            }
        }
    } else {
        for ptr in view.key_ptrs()? {
            collect_items_rec(translator, io, ptr.block_number, node_size, predicate, out)?;
        }
    }

    Ok(())
}

/// A parsed tree node: its header plus either key pointers (interior) or
/// item pointers (leaf).
pub enum NodeView<'a> {
    Interior {
        header: Header,
        buf: &'a [u8],
    },
    Leaf {
        header: Header,
        buf: &'a [u8],
    },
}

impl<'a> NodeView<'a> {
    /// Parses `buf` as a node, verifying the checksum stored in its header
    /// against `crc32c(!0, buf[0x20..])` as spec.md requires.
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        let header = Header::parse(buf)?;
        Self::verify_checksum(&header, buf)?;

        if header.is_leaf() {
            Ok(NodeView::Leaf { header, buf })
        } else {
            Ok(NodeView::Interior { header, buf })
        }
    }

    fn verify_checksum(header: &Header, buf: &[u8]) -> Result<()> {
        let actual = crc32c(!0u32, &buf[CSUM_COVERAGE_START..]);
        let expected = u32::from_le_bytes(header.csum[0..4].try_into().unwrap());
        if actual != expected {
            return Err(ParserError::ChecksumMismatch {
                logical: None,
                expected,
                actual,
            });
        }
        Ok(())
    }

    pub fn header(&self) -> &Header {
        match self {
            NodeView::Interior { header, .. } => header,
            NodeView::Leaf { header, .. } => header,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeView::Leaf { .. })
    }

    /// Interior node children, in key order.
    pub fn key_ptrs(&self) -> Result<Vec<KeyPtr>> {
        let (header, buf) = match self {
            NodeView::Interior { header, buf } => (header, buf),
            NodeView::Leaf { .. } => return Ok(Vec::new()),
        };

        let mut out = Vec::with_capacity(header.nritems as usize);
        let mut off = Header::SIZE;
        for _ in 0..header.nritems {
            out.push(KeyPtr::parse(buf, off)?);
            off += KeyPtr::SIZE;
        }
        Ok(out)
    }

    /// Leaf item pointers, in key order.
    pub fn item_ptrs(&self) -> Result<Vec<ItemPtr>> {
        let (header, buf) = match self {
            NodeView::Leaf { header, buf } => (header, buf),
            NodeView::Interior { .. } => return Ok(Vec::new()),
        };

        let mut out = Vec::with_capacity(header.nritems as usize);
        let mut off = Header::SIZE;
        for _ in 0..header.nritems {
            out.push(ItemPtr::parse(buf, off)?);
            off += ItemPtr::SIZE;
        }
        Ok(out)
    }

    /// Scans a leaf's item pointers starting at position `skip`, counting
    /// those whose key type equals `ty`, and returns the `ordinal`-th match
    /// (0-based). Returns `None` on an interior node or once the leaf is
    /// exhausted without reaching `ordinal` matches.
    pub fn find_item(&self, ty: u8, skip: usize, ordinal: usize) -> Result<Option<ItemPtr>> {
        let (header, buf) = match self {
            NodeView::Leaf { header, buf } => (header, buf),
            NodeView::Interior { .. } => return Ok(None),
        };

        let mut matched = 0usize;
        let mut off = Header::SIZE + skip * ItemPtr::SIZE;
        for _ in skip..header.nritems as usize {
            let item = ItemPtr::parse(buf, off)?;
            if item.key.ty == ty {
                if matched == ordinal {
                    return Ok(Some(item));
                }
                matched += 1;
            }
            off += ItemPtr::SIZE;
        }
        Ok(None)
    }

    /// The payload bytes for a leaf item, relative to the start of the
    /// leaf's data area (immediately after the header).
    pub fn item_data(&self, item: &ItemPtr) -> Result<&'a [u8]> {
        let buf = match self {
            NodeView::Leaf { buf, .. } => buf,
            NodeView::Interior { .. } => {
                return Err(ParserError::Malformed("item_data called on interior node"))
            }
        };
        let start = Header::SIZE + item.data_offset as usize;
        let end = start + item.data_size as usize;
        buf.get(start..end)
            .ok_or(ParserError::Malformed("item payload out of bounds"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::Key;

    fn build_leaf(items: &[(Key, &[u8])]) -> Vec<u8> {
        // `data_offset` is relative to the start of the header (matching
        // real on-disk btrfs leaves, where item data and the item array
        // share the same zero point even though they grow from opposite
        // ends of the node), so it must include the item array's own
        // size, not just the running payload position.
        let item_array_len = items.len() * ItemPtr::SIZE;
        let data_start = Header::SIZE + item_array_len;
        let mut payload = Vec::new();
        let mut ptrs = Vec::new();
        for (key, data) in items {
            ptrs.push((*key, (item_array_len + payload.len()) as u32, data.len() as u32));
            payload.extend_from_slice(data);
        }

        let mut buf = vec![0u8; data_start + payload.len()];
        // header.nritems at Header::SIZE - 5 (4 bytes nritems + 1 byte level)
        let nritems_off = Header::SIZE - 5;
        buf[nritems_off..nritems_off + 4].copy_from_slice(&(items.len() as u32).to_le_bytes());
        // level stays 0 -> leaf

        let mut off = Header::SIZE;
        for (key, data_offset, data_size) in &ptrs {
            buf[off..off + 8].copy_from_slice(&key.objectid.to_le_bytes());
            buf[off + 8] = key.ty;
            buf[off + 9..off + 17].copy_from_slice(&key.offset.to_le_bytes());
            buf[off + 17..off + 21].copy_from_slice(&data_offset.to_le_bytes());
            buf[off + 21..off + 25].copy_from_slice(&data_size.to_le_bytes());
            off += ItemPtr::SIZE;
        }

        buf[data_start..].copy_from_slice(&payload);

        let csum = crc32c(!0u32, &buf[CSUM_COVERAGE_START..]);
        buf[0..4].copy_from_slice(&csum.to_le_bytes());

        buf
    }

    #[test]
    fn leaf_round_trips_items() {
        let key = Key {
            objectid: 5,
            ty: 1,
            offset: 0,
        };
        let buf = build_leaf(&[(key, b"hello")]);
        let node = NodeView::parse(&buf).unwrap();
        assert!(node.is_leaf());
        let ptrs = node.item_ptrs().unwrap();
        assert_eq!(ptrs.len(), 1);
        assert_eq!(node.item_data(&ptrs[0]).unwrap(), b"hello");
    }

    #[test]
    fn find_item_selects_nth_match_of_type() {
        let dir_item = |objectid: u64, offset: u64| Key {
            objectid,
            ty: 1,
            offset,
        };
        let other = Key {
            objectid: 5,
            ty: 2,
            offset: 0,
        };
        let buf = build_leaf(&[
            (dir_item(5, 0), b"a"),
            (other, b"b"),
            (dir_item(5, 1), b"c"),
            (dir_item(5, 2), b"d"),
        ]);
        let node = NodeView::parse(&buf).unwrap();

        let first = node.find_item(1, 0, 0).unwrap().unwrap();
        assert_eq!(node.item_data(&first).unwrap(), b"a");

        let second = node.find_item(1, 0, 1).unwrap().unwrap();
        assert_eq!(node.item_data(&second).unwrap(), b"c");

        let skipped = node.find_item(1, 2, 0).unwrap().unwrap();
        assert_eq!(node.item_data(&skipped).unwrap(), b"c");

        assert!(node.find_item(1, 0, 3).unwrap().is_none());
        assert!(node.find_item(99, 0, 0).unwrap().is_none());
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let key = Key {
            objectid: 5,
            ty: 1,
            offset: 0,
        };
        let mut buf = build_leaf(&[(key, b"hello")]);
        buf[CSUM_COVERAGE_START] ^= 0xff;
        assert!(matches!(
            NodeView::parse(&buf),
            Err(ParserError::ChecksumMismatch { .. })
        ));
    }
}

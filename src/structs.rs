//! Owned, parsed representations of every on-disk record spec.md names.
//!
//! Each type is parsed from a byte slice with `parse(buf, off)` returning
//! either `Self` (fixed-size records) or `(Self, usize)` (variable-length
//! records, the `usize` being bytes consumed). Bounds are checked by the
//! helpers in `bytes.rs`; nothing here takes a reference to an unaligned
//! field the way a `#[repr(C, packed)]` + pointer-cast would.

use crate::bytes::{bytes_at, u16_at, u32_at, u64_at, u8_at};
use crate::constants::*;
use crate::error::{ParserError, Result};

/// The 17-byte ordering key shared by every item in every tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Key {
    pub objectid: u64,
    pub ty: u8,
    pub offset: u64,
}

impl Key {
    pub const SIZE: usize = 17;

    pub fn parse(buf: &[u8], off: usize) -> Result<Self> {
        Ok(Key {
            objectid: u64_at(buf, off)?,
            ty: u8_at(buf, off + 8)?,
            offset: u64_at(buf, off + 9)?,
        })
    }
}

/// Common node header, present at the start of every tree block.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub csum: [u8; CSUM_SIZE],
    pub fsid: [u8; UUID_SIZE],
    pub bytenr: u64,
    pub flags: u64,
    pub chunk_tree_uuid: [u8; UUID_SIZE],
    pub generation: u64,
    pub owner: u64,
    pub nritems: u32,
    pub level: u8,
}

impl Header {
    pub const SIZE: usize = CSUM_SIZE + UUID_SIZE + 8 + 8 + UUID_SIZE + 8 + 8 + 4 + 1;

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(ParserError::Malformed("buffer too small for node header"));
        }
        let mut csum = [0u8; CSUM_SIZE];
        csum.copy_from_slice(bytes_at(buf, 0, CSUM_SIZE)?);
        let mut fsid = [0u8; UUID_SIZE];
        fsid.copy_from_slice(bytes_at(buf, CSUM_SIZE, UUID_SIZE)?);
        let mut off = CSUM_SIZE + UUID_SIZE;
        let bytenr = u64_at(buf, off)?;
        off += 8;
        let flags = u64_at(buf, off)?;
        off += 8;
        let mut chunk_tree_uuid = [0u8; UUID_SIZE];
        chunk_tree_uuid.copy_from_slice(bytes_at(buf, off, UUID_SIZE)?);
        off += UUID_SIZE;
        let generation = u64_at(buf, off)?;
        off += 8;
        let owner = u64_at(buf, off)?;
        off += 8;
        let nritems = u32_at(buf, off)?;
        off += 4;
        let level = u8_at(buf, off)?;

        Ok(Header {
            csum,
            fsid,
            bytenr,
            flags,
            chunk_tree_uuid,
            generation,
            owner,
            nritems,
            level,
        })
    }

    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }
}

/// Interior node entry: a key, the logical address of the child, and the
/// generation it was written at.
#[derive(Debug, Clone, Copy)]
pub struct KeyPtr {
    pub key: Key,
    pub block_number: u64,
    pub generation: u64,
}

impl KeyPtr {
    pub const SIZE: usize = Key::SIZE + 8 + 8;

    pub fn parse(buf: &[u8], off: usize) -> Result<Self> {
        let key = Key::parse(buf, off)?;
        let block_number = u64_at(buf, off + Key::SIZE)?;
        let generation = u64_at(buf, off + Key::SIZE + 8)?;
        Ok(KeyPtr {
            key,
            block_number,
            generation,
        })
    }
}

/// Leaf item pointer: a key plus where/how big its payload is, relative to
/// the start of the leaf's data area (immediately following the header).
#[derive(Debug, Clone, Copy)]
pub struct ItemPtr {
    pub key: Key,
    pub data_offset: u32,
    pub data_size: u32,
}

impl ItemPtr {
    pub const SIZE: usize = Key::SIZE + 4 + 4;

    pub fn parse(buf: &[u8], off: usize) -> Result<Self> {
        let key = Key::parse(buf, off)?;
        let data_offset = u32_at(buf, off + Key::SIZE)?;
        let data_size = u32_at(buf, off + Key::SIZE + 4)?;
        Ok(ItemPtr {
            key,
            data_offset,
            data_size,
        })
    }
}

/// One physical backing region of a chunk.
#[derive(Debug, Clone, Copy)]
pub struct Stripe {
    pub device_id: u64,
    pub offset: u64,
    pub dev_uuid: [u8; UUID_SIZE],
}

impl Stripe {
    pub const SIZE: usize = 8 + 8 + UUID_SIZE;

    pub fn parse(buf: &[u8], off: usize) -> Result<Self> {
        let device_id = u64_at(buf, off)?;
        let offset = u64_at(buf, off + 8)?;
        let mut dev_uuid = [0u8; UUID_SIZE];
        dev_uuid.copy_from_slice(bytes_at(buf, off + 16, UUID_SIZE)?);
        Ok(Stripe {
            device_id,
            offset,
            dev_uuid,
        })
    }
}

/// A logical range mapped to one or more physical stripes.
#[derive(Debug, Clone)]
pub struct ChunkItem {
    pub chunk_size_bytes: u64,
    pub owner: u64,
    pub stripe_size: u64,
    pub ty: u64,
    pub io_align: u32,
    pub io_width: u32,
    pub sector_size: u32,
    pub stripe_count: u16,
    pub sub_stripes: u16,
    pub stripes: Vec<Stripe>,
}

impl ChunkItem {
    /// Size of the fixed header preceding the stripe array.
    const FIXED_SIZE: usize = 8 + 8 + 8 + 8 + 4 + 4 + 4 + 2 + 2;

    pub fn parse(buf: &[u8], off: usize) -> Result<(Self, usize)> {
        let chunk_size_bytes = u64_at(buf, off)?;
        let owner = u64_at(buf, off + 8)?;
        let stripe_size = u64_at(buf, off + 16)?;
        let ty = u64_at(buf, off + 24)?;
        let io_align = u32_at(buf, off + 32)?;
        let io_width = u32_at(buf, off + 36)?;
        let sector_size = u32_at(buf, off + 40)?;
        let stripe_count = u16_at(buf, off + 44)?;
        let sub_stripes = u16_at(buf, off + 46)?;

        if stripe_count == 0 {
            return Err(ParserError::Malformed("chunk item with zero stripes"));
        }

        let mut stripes = Vec::with_capacity(stripe_count as usize);
        let mut cursor = off + Self::FIXED_SIZE;
        for _ in 0..stripe_count {
            stripes.push(Stripe::parse(buf, cursor)?);
            cursor += Stripe::SIZE;
        }

        let consumed = Self::FIXED_SIZE + Stripe::SIZE * stripe_count as usize;
        Ok((
            ChunkItem {
                chunk_size_bytes,
                owner,
                stripe_size,
                ty,
                io_align,
                io_width,
                sector_size,
                stripe_count,
                sub_stripes,
                stripes,
            },
            consumed,
        ))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Timespec {
    pub sec: u64,
    pub nsec: u32,
}

impl Timespec {
    pub const SIZE: usize = 12;

    pub fn parse(buf: &[u8], off: usize) -> Result<Self> {
        Ok(Timespec {
            sec: u64_at(buf, off)?,
            nsec: u32_at(buf, off + 8)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InodeItem {
    pub generation: u64,
    pub transid: u64,
    pub size: u64,
    pub nbytes: u64,
    pub block_group: u64,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub rdev: u64,
    pub flags: u64,
    pub sequence: u64,
    pub atime: Timespec,
    pub ctime: Timespec,
    pub mtime: Timespec,
    pub otime: Timespec,
}

impl InodeItem {
    /// 9 leading u64s, 4 u32s, a 32-byte reserved block, then 4 timespecs.
    pub const SIZE: usize = 8 * 9 + 4 * 4 + 32 + Timespec::SIZE * 4;

    pub fn parse(buf: &[u8], off: usize) -> Result<Self> {
        let generation = u64_at(buf, off)?;
        let transid = u64_at(buf, off + 8)?;
        let size = u64_at(buf, off + 16)?;
        let nbytes = u64_at(buf, off + 24)?;
        let block_group = u64_at(buf, off + 32)?;
        let nlink = u32_at(buf, off + 40)?;
        let uid = u32_at(buf, off + 44)?;
        let gid = u32_at(buf, off + 48)?;
        let mode = u32_at(buf, off + 52)?;
        let rdev = u64_at(buf, off + 56)?;
        let flags = u64_at(buf, off + 64)?;
        let sequence = u64_at(buf, off + 72)?;
        let reserved_end = off + 80 + 32;
        let atime = Timespec::parse(buf, reserved_end)?;
        let ctime = Timespec::parse(buf, reserved_end + Timespec::SIZE)?;
        let mtime = Timespec::parse(buf, reserved_end + Timespec::SIZE * 2)?;
        let otime = Timespec::parse(buf, reserved_end + Timespec::SIZE * 3)?;

        Ok(InodeItem {
            generation,
            transid,
            size,
            nbytes,
            block_group,
            nlink,
            uid,
            gid,
            mode,
            rdev,
            flags,
            sequence,
            atime,
            ctime,
            mtime,
            otime,
        })
    }
}

/// `RootItem` — carries the logical root block number of a named tree.
#[derive(Debug, Clone, Copy)]
pub struct RootItem {
    pub inode: InodeItem,
    pub generation: u64,
    pub root_dirid: u64,
    pub bytenr: u64,
    pub byte_limit: u64,
    pub bytes_used: u64,
    pub last_snapshot: u64,
    pub flags: u64,
    pub refs: u32,
    pub drop_progress: Key,
    pub drop_level: u8,
    pub level: u8,
}

impl RootItem {
    pub fn parse(buf: &[u8], off: usize) -> Result<Self> {
        let inode = InodeItem::parse(buf, off)?;
        let mut cur = off + InodeItem::SIZE;
        let generation = u64_at(buf, cur)?;
        cur += 8;
        let root_dirid = u64_at(buf, cur)?;
        cur += 8;
        let bytenr = u64_at(buf, cur)?;
        cur += 8;
        let byte_limit = u64_at(buf, cur)?;
        cur += 8;
        let bytes_used = u64_at(buf, cur)?;
        cur += 8;
        let last_snapshot = u64_at(buf, cur)?;
        cur += 8;
        let flags = u64_at(buf, cur)?;
        cur += 8;
        let refs = u32_at(buf, cur)?;
        cur += 4;
        let drop_progress = Key::parse(buf, cur)?;
        cur += Key::SIZE;
        let drop_level = u8_at(buf, cur)?;
        cur += 1;
        let level = u8_at(buf, cur)?;

        Ok(RootItem {
            inode,
            generation,
            root_dirid,
            bytenr,
            byte_limit,
            bytes_used,
            last_snapshot,
            flags,
            refs,
            drop_progress,
            drop_level,
            level,
        })
    }
}

/// Directory entry: `DirItem` (hashed lookup) and `DirIndex` share this
/// layout.
#[derive(Debug, Clone)]
pub struct DirItem {
    pub location: Key,
    pub transid: u64,
    pub data_len: u16,
    pub name_len: u16,
    pub ty: u8,
    pub name: Vec<u8>,
}

impl DirItem {
    const FIXED_SIZE: usize = Key::SIZE + 8 + 2 + 2 + 1;

    pub fn parse(buf: &[u8], off: usize) -> Result<Self> {
        let location = Key::parse(buf, off)?;
        let mut cur = off + Key::SIZE;
        let transid = u64_at(buf, cur)?;
        cur += 8;
        let data_len = u16_at(buf, cur)?;
        cur += 2;
        let name_len = u16_at(buf, cur)?;
        cur += 2;
        let ty = u8_at(buf, cur)?;
        cur += 1;
        let name = bytes_at(buf, cur, name_len as usize)?.to_vec();

        Ok(DirItem {
            location,
            transid,
            data_len,
            name_len,
            ty,
            name,
        })
    }

    #[allow(dead_code)]
    pub const fn fixed_size() -> usize {
        Self::FIXED_SIZE
    }
}

/// Backlink from an inode to the directory entry naming it.
#[derive(Debug, Clone)]
pub struct InodeRef {
    pub index: u64,
    pub name: Vec<u8>,
}

impl InodeRef {
    pub fn parse(buf: &[u8], off: usize) -> Result<Self> {
        let index = u64_at(buf, off)?;
        let name_len = u16_at(buf, off + 8)?;
        let name = bytes_at(buf, off + 10, name_len as usize)?.to_vec();
        Ok(InodeRef { index, name })
    }
}

/// File data descriptor. Inline extents carry their payload immediately
/// after the header; regular/prealloc extents point at another logical
/// address.
#[derive(Debug, Clone)]
pub enum ExtentData {
    Inline {
        generation: u64,
        decoded_size: u64,
        compression: u8,
        encryption: u8,
        other_encoding: u16,
        payload: Vec<u8>,
    },
    Regular {
        generation: u64,
        extent_logical_addr: u64,
        extent_size: u64,
        extent_offset: u64,
        logical_byte_count: u64,
        prealloc: bool,
    },
}

impl ExtentData {
    const HEADER_SIZE: usize = 8 + 8 + 1 + 1 + 2 + 1;

    pub fn parse(buf: &[u8], off: usize, data_size: usize) -> Result<Self> {
        let generation = u64_at(buf, off)?;
        let decoded_size = u64_at(buf, off + 8)?;
        let compression = u8_at(buf, off + 16)?;
        let encryption = u8_at(buf, off + 17)?;
        let other_encoding = u16_at(buf, off + 18)?;
        let ty = u8_at(buf, off + 20)?;

        match ty {
            EXTENT_TYPE_INLINE => {
                let payload_len = data_size.saturating_sub(Self::HEADER_SIZE);
                let payload = bytes_at(buf, off + Self::HEADER_SIZE, payload_len)?.to_vec();
                Ok(ExtentData::Inline {
                    generation,
                    decoded_size,
                    compression,
                    encryption,
                    other_encoding,
                    payload,
                })
            }
            EXTENT_TYPE_REGULAR | EXTENT_TYPE_PREALLOC => {
                let extent_logical_addr = u64_at(buf, off + Self::HEADER_SIZE)?;
                let extent_size = u64_at(buf, off + Self::HEADER_SIZE + 8)?;
                let extent_offset = u64_at(buf, off + Self::HEADER_SIZE + 16)?;
                let logical_byte_count = u64_at(buf, off + Self::HEADER_SIZE + 24)?;
                Ok(ExtentData::Regular {
                    generation,
                    extent_logical_addr,
                    extent_size,
                    extent_offset,
                    logical_byte_count,
                    prealloc: ty == EXTENT_TYPE_PREALLOC,
                })
            }
            _ => Err(ParserError::Malformed("unknown extent data type")),
        }
    }
}

/// `ExtentChecksum` — one CRC-32C per `sector_size` bytes starting at
/// `key.offset`.
#[derive(Debug, Clone)]
pub struct ExtentChecksum {
    pub crcs: Vec<u32>,
}

impl ExtentChecksum {
    pub fn parse(buf: &[u8], off: usize, data_size: usize) -> Result<Self> {
        let count = data_size / 4;
        let mut crcs = Vec::with_capacity(count);
        for i in 0..count {
            crcs.push(u32_at(buf, off + i * 4)?);
        }
        Ok(ExtentChecksum { crcs })
    }
}

/// Parsed but not consumed by any tree walker — present for completeness.
#[derive(Debug, Clone, Copy)]
pub struct DeviceItem {
    pub devid: u64,
    pub total_bytes: u64,
    pub bytes_used: u64,
}

impl DeviceItem {
    pub fn parse(buf: &[u8], off: usize) -> Result<Self> {
        Ok(DeviceItem {
            devid: u64_at(buf, off)?,
            total_bytes: u64_at(buf, off + 8)?,
            bytes_used: u64_at(buf, off + 16)?,
        })
    }
}

/// Parsed but not consumed by any tree walker — present for completeness.
#[derive(Debug, Clone, Copy)]
pub struct BlockGroupItem {
    pub used: u64,
    pub chunk_objectid: u64,
    pub flags: u64,
}

impl BlockGroupItem {
    pub fn parse(buf: &[u8], off: usize) -> Result<Self> {
        Ok(BlockGroupItem {
            used: u64_at(buf, off)?,
            chunk_objectid: u64_at(buf, off + 8)?,
            flags: u64_at(buf, off + 16)?,
        })
    }
}

/// The on-disk device item embedded in the superblock (one entry, the
/// device the superblock itself was read from).
#[derive(Debug, Clone, Copy)]
pub struct SuperblockDevItem {
    pub devid: u64,
    pub total_bytes: u64,
    pub bytes_used: u64,
    pub io_align: u32,
    pub io_width: u32,
    pub sector_size: u32,
    pub ty: u64,
    pub generation: u64,
    pub start_offset: u64,
    pub dev_group: u32,
    pub seek_speed: u8,
    pub bandwidth: u8,
    pub uuid: [u8; UUID_SIZE],
    pub fsid: [u8; UUID_SIZE],
}

impl SuperblockDevItem {
    pub const SIZE: usize = 8 + 8 + 8 + 4 + 4 + 4 + 8 + 8 + 8 + 4 + 1 + 1 + UUID_SIZE + UUID_SIZE;

    pub fn parse(buf: &[u8], off: usize) -> Result<Self> {
        let devid = u64_at(buf, off)?;
        let total_bytes = u64_at(buf, off + 8)?;
        let bytes_used = u64_at(buf, off + 16)?;
        let io_align = u32_at(buf, off + 24)?;
        let io_width = u32_at(buf, off + 28)?;
        let sector_size = u32_at(buf, off + 32)?;
        let ty = u64_at(buf, off + 36)?;
        let generation = u64_at(buf, off + 44)?;
        let start_offset = u64_at(buf, off + 52)?;
        let dev_group = u32_at(buf, off + 60)?;
        let seek_speed = u8_at(buf, off + 64)?;
        let bandwidth = u8_at(buf, off + 65)?;
        let mut uuid = [0u8; UUID_SIZE];
        uuid.copy_from_slice(bytes_at(buf, off + 66, UUID_SIZE)?);
        let mut fsid = [0u8; UUID_SIZE];
        fsid.copy_from_slice(bytes_at(buf, off + 66 + UUID_SIZE, UUID_SIZE)?);

        Ok(SuperblockDevItem {
            devid,
            total_bytes,
            bytes_used,
            io_align,
            io_width,
            sector_size,
            ty,
            generation,
            start_offset,
            dev_group,
            seek_speed,
            bandwidth,
            uuid,
            fsid,
        })
    }
}

/// Snapshot of the 4 KiB superblock, taken once at boot.
#[derive(Debug, Clone)]
pub struct Superblock {
    pub csum: [u8; CSUM_SIZE],
    pub fsid: [u8; UUID_SIZE],
    pub bytenr: u64,
    pub flags: u64,
    pub generation: u64,
    pub root: u64,
    pub chunk_root: u64,
    pub log_root: u64,
    pub log_root_transid: u64,
    pub total_bytes: u64,
    pub bytes_used: u64,
    pub root_dir_objectid: u64,
    pub num_devices: u64,
    pub sector_size: u32,
    pub node_size: u32,
    pub leaf_size: u32,
    pub stripe_size: u32,
    pub sys_chunk_array_size: u32,
    pub chunk_root_generation: u64,
    pub compat_flags: u64,
    pub compat_ro_flags: u64,
    pub incompat_flags: u64,
    pub csum_type: u16,
    pub root_level: u8,
    pub chunk_root_level: u8,
    pub log_root_level: u8,
    pub dev_item: SuperblockDevItem,
    pub label: [u8; LABEL_SIZE],
    /// Raw bytes of the trailing seed chunk table, `sys_chunk_array_size`
    /// long: a run of `(Key, ChunkItem)` records.
    pub sys_chunk_array: Vec<u8>,
}

impl Superblock {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < SUPERBLOCK_SIZE {
            return Err(ParserError::Malformed("buffer too small for superblock"));
        }

        let mut csum = [0u8; CSUM_SIZE];
        csum.copy_from_slice(bytes_at(buf, 0, CSUM_SIZE)?);
        let mut fsid = [0u8; UUID_SIZE];
        fsid.copy_from_slice(bytes_at(buf, CSUM_SIZE, UUID_SIZE)?);
        let mut cur = CSUM_SIZE + UUID_SIZE;

        let bytenr = u64_at(buf, cur)?;
        cur += 8;
        let flags = u64_at(buf, cur)?;
        cur += 8;
        let magic = bytes_at(buf, cur, 8)?;
        if magic != SUPERBLOCK_MAGIC {
            return Err(ParserError::NoValidSuperblock);
        }
        cur += 8;
        let generation = u64_at(buf, cur)?;
        cur += 8;
        let root = u64_at(buf, cur)?;
        cur += 8;
        let chunk_root = u64_at(buf, cur)?;
        cur += 8;
        let log_root = u64_at(buf, cur)?;
        cur += 8;
        let log_root_transid = u64_at(buf, cur)?;
        cur += 8;
        let total_bytes = u64_at(buf, cur)?;
        cur += 8;
        let bytes_used = u64_at(buf, cur)?;
        cur += 8;
        let root_dir_objectid = u64_at(buf, cur)?;
        cur += 8;
        let num_devices = u64_at(buf, cur)?;
        cur += 8;
        let sector_size = u32_at(buf, cur)?;
        cur += 4;
        let node_size = u32_at(buf, cur)?;
        cur += 4;
        let leaf_size = u32_at(buf, cur)?;
        cur += 4;
        let stripe_size = u32_at(buf, cur)?;
        cur += 4;
        let sys_chunk_array_size = u32_at(buf, cur)?;
        cur += 4;
        let chunk_root_generation = u64_at(buf, cur)?;
        cur += 8;
        let compat_flags = u64_at(buf, cur)?;
        cur += 8;
        let compat_ro_flags = u64_at(buf, cur)?;
        cur += 8;
        let incompat_flags = u64_at(buf, cur)?;
        cur += 8;
        let csum_type = u16_at(buf, cur)?;
        cur += 2;
        let root_level = u8_at(buf, cur)?;
        cur += 1;
        let chunk_root_level = u8_at(buf, cur)?;
        cur += 1;
        let log_root_level = u8_at(buf, cur)?;
        cur += 1;
        let dev_item = SuperblockDevItem::parse(buf, cur)?;
        cur += SuperblockDevItem::SIZE;
        let mut label = [0u8; LABEL_SIZE];
        label.copy_from_slice(bytes_at(buf, cur, LABEL_SIZE)?);
        cur += LABEL_SIZE;

        // cache_generation(8) + uuid_tree_generation(8) + metadata_uuid(16)
        // + reserved(28*8) precede the seed chunk table.
        cur += 8 + 8 + UUID_SIZE + 28 * 8;

        let sys_chunk_array = bytes_at(buf, cur, sys_chunk_array_size as usize)?.to_vec();

        Ok(Superblock {
            csum,
            fsid,
            bytenr,
            flags,
            generation,
            root,
            chunk_root,
            log_root,
            log_root_transid,
            total_bytes,
            bytes_used,
            root_dir_objectid,
            num_devices,
            sector_size,
            node_size,
            leaf_size,
            stripe_size,
            sys_chunk_array_size,
            chunk_root_generation,
            compat_flags,
            compat_ro_flags,
            incompat_flags,
            csum_type,
            root_level,
            chunk_root_level,
            log_root_level,
            dev_item,
            label,
            sys_chunk_array,
        })
    }

    pub fn label_str(&self) -> std::borrow::Cow<'_, str> {
        let end = self
            .label
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.label.len());
        String::from_utf8_lossy(&self.label[..end])
    }
}

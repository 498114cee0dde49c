//! Magic numbers, reserved object ids, and layout constants used throughout
//! the parser. Gathered in one place rather than scattered across the
//! structs that use them.

/// Size of the checksum field carried by superblocks and node headers.
pub const CSUM_SIZE: usize = 32;
/// Size of a uuid/fsid field.
pub const UUID_SIZE: usize = 16;
/// Size of the volume label field in the superblock.
pub const LABEL_SIZE: usize = 256;
/// Size of the embedded seed chunk table in the superblock.
pub const SYSTEM_CHUNK_ARRAY_SIZE: usize = 2048;

/// Candidate physical byte offsets for the superblock, in scan order.
/// Zero-terminated per spec; the zero itself is not a candidate.
pub const SUPERBLOCK_OFFSETS: &[u64] = &[0x10_000, 0x400_0000, 0x40_0000_0000, 0x1_0000_0000_0000];

pub const SUPERBLOCK_MAGIC: [u8; 8] = *b"_BHRfS_M";
pub const SUPERBLOCK_SIZE: usize = 4096;

/// Checksum covers bytes starting here through the end of the block/node.
pub const CSUM_COVERAGE_START: usize = 0x20;

// Key types (the `type` byte of a `Key`).
pub const KEY_TYPE_INODE_ITEM: u8 = 0x01;
pub const KEY_TYPE_INODE_REF: u8 = 0x0c;
pub const KEY_TYPE_INODE_EXTREF: u8 = 0x0d;
pub const KEY_TYPE_XATTR_ITEM: u8 = 0x18;
pub const KEY_TYPE_ORPHAN_ITEM: u8 = 0x30;
pub const KEY_TYPE_DIR_LOG_ITEM: u8 = 0x3c;
pub const KEY_TYPE_DIR_LOG_INDEX: u8 = 0x48;
pub const KEY_TYPE_DIR_ITEM: u8 = 0x54;
pub const KEY_TYPE_DIR_INDEX: u8 = 0x60;
pub const KEY_TYPE_EXTENT_DATA: u8 = 0x6c;
pub const KEY_TYPE_EXTENT_CSUM: u8 = 0x80;
pub const KEY_TYPE_ROOT_ITEM: u8 = 0x84;
pub const KEY_TYPE_ROOT_BACKREF: u8 = 0x90;
pub const KEY_TYPE_ROOT_REF: u8 = 0x9c;
pub const KEY_TYPE_EXTENT_ITEM: u8 = 0xa8;
pub const KEY_TYPE_TREE_BLOCK_REF: u8 = 0xb0;
pub const KEY_TYPE_EXTENT_DATA_REF: u8 = 0xb2;
pub const KEY_TYPE_EXTENT_REF_V0: u8 = 0xb4;
pub const KEY_TYPE_SHARED_BLOCK_REF: u8 = 0xb6;
pub const KEY_TYPE_SHARED_DATA_REF: u8 = 0xb8;
pub const KEY_TYPE_BLOCK_GROUP_ITEM: u8 = 0xc0;
pub const KEY_TYPE_DEV_EXTENT: u8 = 0xcc;
pub const KEY_TYPE_DEV_ITEM: u8 = 0xd8;
pub const KEY_TYPE_CHUNK_ITEM: u8 = 0xe4;
pub const KEY_TYPE_STRING_ITEM: u8 = 0xfd;

// Reserved object ids.
pub const OBJECTID_EXTENT_TREE: u64 = 2;
pub const OBJECTID_DEV_TREE: u64 = 4;
pub const OBJECTID_FS_TREE: u64 = 5;
pub const OBJECTID_CHECKSUM_TREE: u64 = 7;
/// Root directory inode of the default filesystem tree.
pub const DEFAULT_ROOT_INODE: u64 = 256;

// Directory entry types.
pub const DIR_ITEM_TYPE_UNKNOWN: u8 = 0;
pub const DIR_ITEM_TYPE_FILE: u8 = 1;
pub const DIR_ITEM_TYPE_DIRECTORY: u8 = 2;

// Extent data types.
pub const EXTENT_TYPE_INLINE: u8 = 0;
pub const EXTENT_TYPE_REGULAR: u8 = 1;
pub const EXTENT_TYPE_PREALLOC: u8 = 2;

// Address translator level span sizes (bytes).
pub const L4_SIZE: u64 = 512 * 1024 * 1024 * 1024;
pub const L3_SIZE: u64 = 1024 * 1024 * 1024;
pub const L2_SIZE: u64 = 2 * 1024 * 1024;
pub const L1_SIZE: u64 = 4 * 1024;

/// Bit shifts selecting each level's 9-bit index out of a logical address.
pub const LEVEL_SHIFTS: [u32; 4] = [39, 30, 21, 12];
pub const LEVEL_SIZES: [u64; 4] = [L4_SIZE, L3_SIZE, L2_SIZE, L1_SIZE];
/// Number of slots in one level table (9 bits of index).
pub const TABLE_ENTRIES: usize = 512;

/// Direct-mapped inode-to-leaf cache size.
pub const DEFAULT_INODE_CACHE_SIZE: usize = 64 * 1024;

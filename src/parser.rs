//! Parser driver: orchestrates the boot sequence and exposes the public
//! operations described in spec.md §6 (`resolve_path`, `read_file`,
//! `scrub`, and the various accessors).
//!
//! Everything the boot sequence produces — the translator, the recorded
//! tree roots, the snapshotted superblock, and the inode cache — lives
//! together in one `Parser` value rather than as process-wide globals
//! (spec.md §9 calls this out explicitly: the source's use of file-scope
//! state, especially the `current_inode` cursor during filesystem-tree
//! recursion, is fragile once more than one caller is in play). Boot is
//! single-shot: `start()` may only be called once per `initialize()`.

use crate::chunk_tree;
use crate::checksum_tree;
use crate::constants::DEFAULT_INODE_CACHE_SIZE;
use crate::error::{ParserError, Result};
use crate::file;
use crate::fs_tree::{self, DirEntry};
use crate::inode_cache::InodeCache;
use crate::io::{BlockIo, BlockRead, BlockWrite};
use crate::root_tree::{self, TreeRoots};
use crate::structs::{InodeItem, InodeRef, Superblock};
use crate::superblock;
use crate::translator::Translator;

/// Boot-time id of the device the superblock is read from. Multi-device
/// filesystems still designate one device to carry the superblock; this
/// parser only ever reads superblocks from device 0, matching spec.md
/// §4.4.
const SUPERBLOCK_DEVICE_ID: u64 = 0;

pub struct Parser {
    io: BlockIo,
    translator: Translator,
    inode_cache: InodeCache,
    superblock: Option<Superblock>,
    roots: TreeRoots,
    booted: bool,
}

impl Parser {
    /// Constructs a parser with a `cache_size`-entry inode cache. Callers
    /// still need to register read handlers and call `start()` before any
    /// other operation is valid.
    pub fn new(cache_size: usize) -> Self {
        Parser {
            io: BlockIo::new(),
            translator: Translator::new(),
            inode_cache: InodeCache::new(cache_size),
            superblock: None,
            roots: TreeRoots::default(),
            booted: false,
        }
    }

    /// Resets all boot-derived state, as if freshly constructed. Existing
    /// read/write handlers are dropped along with it — re-register them
    /// before calling `start()` again.
    pub fn initialize(&mut self, cache_size: usize) {
        *self = Parser::new(cache_size);
    }

    pub fn set_read_handler(&mut self, device_id: u64, handler: Box<dyn BlockRead>) {
        self.io.set_read_handler(device_id, handler);
    }

    pub fn set_write_handler(&mut self, device_id: u64, handler: Box<dyn BlockWrite>) {
        self.io.set_write_handler(device_id, handler);
    }

    /// Runs the boot sequence: locate and validate the superblock, seed
    /// the translator from its embedded chunk table, walk the chunk tree
    /// to complete the translator, then walk the root tree to record the
    /// logical roots of the other trees. Idempotent only in the sense
    /// that repeated calls against an unchanged backing image converge on
    /// the same state; calling `start()` twice in a row re-does the same
    /// work rather than erroring.
    pub fn start(&mut self) -> Result<()> {
        if self.booted {
            tracing::warn!("start() called on an already-booted parser");
            return Err(ParserError::AlreadyBooted);
        }

        let sb = superblock::find_superblock(&mut self.io, SUPERBLOCK_DEVICE_ID).map_err(|e| {
            tracing::warn!(error = %e, "no valid superblock found");
            e
        })?;
        tracing::debug!(generation = sb.generation, label = %sb.label_str(), "selected superblock");

        let mut translator = Translator::new();
        chunk_tree::seed_from_superblock(&mut translator, &sb.sys_chunk_array)?;
        chunk_tree::walk_chunk_tree(&mut translator, &mut self.io, sb.chunk_root, sb.node_size)?;

        let roots = root_tree::walk_root_tree(&translator, &mut self.io, sb.root, sb.node_size)?;
        tracing::debug!(
            fs_tree = ?roots.fs_tree,
            extent_tree = ?roots.extent_tree,
            dev_tree = ?roots.dev_tree,
            checksum_tree = ?roots.checksum_tree,
            "root tree walk complete"
        );

        self.translator = translator;
        self.roots = roots;
        self.superblock = Some(sb);
        self.booted = true;
        Ok(())
    }

    fn superblock(&self) -> Result<&Superblock> {
        self.superblock.as_ref().ok_or(ParserError::NoValidSuperblock)
    }

    fn fs_tree_root(&self) -> Result<u64> {
        self.roots
            .fs_tree
            .ok_or(ParserError::TranslationFailure { logical: 0 })
    }

    /// Resolves a `/`-separated path to the inode it names, per spec.md
    /// §4.7.
    pub fn resolve_path(&mut self, path: &str) -> Result<u64> {
        let sb = self.superblock()?;
        let node_size = sb.node_size;
        let fs_tree_root = self.fs_tree_root()?;

        let result = fs_tree::resolve_path(
            &self.translator,
            &mut self.io,
            &mut self.inode_cache,
            fs_tree_root,
            node_size,
            path,
        );
        match &result {
            Ok(key) => tracing::debug!(path, inode = key.objectid, "path resolved"),
            Err(e) => tracing::debug!(path, error = %e, "path resolution failed"),
        }
        Ok(result?.objectid)
    }

    /// Reads up to `dst.len()` bytes of `inode`'s contents starting at
    /// `offset`, returning the number of bytes actually produced.
    pub fn read_file(&mut self, inode: u64, offset: u64, dst: &mut [u8]) -> Result<u64> {
        let sb = self.superblock()?;
        let node_size = sb.node_size;
        let fs_tree_root = self.fs_tree_root()?;

        file::read_file(
            &self.translator,
            &mut self.io,
            fs_tree_root,
            node_size,
            inode,
            offset,
            dst,
        )
    }

    /// Looks up `inode`'s on-disk metadata (size, mode, timestamps, link
    /// count), per spec.md §4.6.
    pub fn stat(&mut self, inode: u64) -> Result<InodeItem> {
        let sb = self.superblock()?;
        let node_size = sb.node_size;
        let fs_tree_root = self.fs_tree_root()?;

        fs_tree::get_inode_item(
            &self.translator,
            &mut self.io,
            &mut self.inode_cache,
            fs_tree_root,
            node_size,
            inode,
        )
    }

    /// Lists every entry of `inode`, in on-disk (index) order, per spec.md
    /// §4.7.
    pub fn list_dir(&mut self, inode: u64) -> Result<Vec<DirEntry>> {
        let sb = self.superblock()?;
        let node_size = sb.node_size;
        let fs_tree_root = self.fs_tree_root()?;

        fs_tree::list_dir(&self.translator, &mut self.io, fs_tree_root, node_size, inode)
    }

    /// Looks up `inode`'s backlink to the directory entry naming it.
    pub fn inode_ref(&mut self, inode: u64) -> Result<InodeRef> {
        let sb = self.superblock()?;
        let node_size = sb.node_size;
        let fs_tree_root = self.fs_tree_root()?;

        fs_tree::get_inode_ref(&self.translator, &mut self.io, fs_tree_root, node_size, inode)
    }

    /// Walks the checksum tree, verifying every covered sector against its
    /// recorded CRC-32C, and returns the number of sectors that disagree.
    pub fn scrub(&mut self) -> Result<u64> {
        let sb = self.superblock()?;
        let node_size = sb.node_size;
        let sector_size = sb.sector_size;
        let checksum_tree_root = self
            .roots
            .checksum_tree
            .ok_or(ParserError::TranslationFailure { logical: 0 })?;

        let mismatches =
            checksum_tree::scrub(&self.translator, &mut self.io, checksum_tree_root, node_size, sector_size)?;
        if mismatches > 0 {
            tracing::warn!(mismatches, "scrub found checksum mismatches");
        } else {
            tracing::debug!("scrub completed with no mismatches");
        }
        Ok(mismatches)
    }

    /// Translates `logical` and forwards `buf` to the owning device's
    /// write handler, performing no other bookkeeping. Mirrors the
    /// source's write entry point, described in spec.md §1 as a stub that
    /// "simply forwards translated addresses" — there is no transaction
    /// or generation handling here.
    pub fn write_logical(&mut self, logical: u64, buf: &[u8]) -> Result<()> {
        let (device_id, physical) = self.translator.translate(logical)?;
        self.io.write_raw(device_id, physical, buf)
    }

    pub fn sector_size(&self) -> Result<u32> {
        Ok(self.superblock()?.sector_size)
    }

    pub fn node_size(&self) -> Result<u32> {
        Ok(self.superblock()?.node_size)
    }

    pub fn leaf_size(&self) -> Result<u32> {
        Ok(self.superblock()?.leaf_size)
    }

    pub fn label(&self) -> Result<String> {
        Ok(self.superblock()?.label_str().into_owned())
    }

    pub fn chunk_tree_root(&self) -> Result<u64> {
        Ok(self.superblock()?.chunk_root)
    }

    pub fn root_tree_root(&self) -> Result<u64> {
        Ok(self.superblock()?.root)
    }

    pub fn fs_tree_root_addr(&self) -> Option<u64> {
        self.roots.fs_tree
    }

    pub fn extent_tree_root(&self) -> Option<u64> {
        self.roots.extent_tree
    }

    pub fn dev_tree_root(&self) -> Option<u64> {
        self.roots.dev_tree
    }

    pub fn checksum_tree_root(&self) -> Option<u64> {
        self.roots.checksum_tree
    }
}

impl Default for Parser {
    fn default() -> Self {
        Parser::new(DEFAULT_INODE_CACHE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{
        CSUM_COVERAGE_START, KEY_TYPE_CHUNK_ITEM, KEY_TYPE_DIR_INDEX, KEY_TYPE_DIR_ITEM,
        KEY_TYPE_INODE_ITEM, KEY_TYPE_INODE_REF, KEY_TYPE_ROOT_ITEM, LABEL_SIZE, OBJECTID_FS_TREE,
        SUPERBLOCK_MAGIC, SUPERBLOCK_OFFSETS, SUPERBLOCK_SIZE, UUID_SIZE,
    };
    use crate::crc32c::{crc32c, name_hash};
    use crate::io::MemoryDevice;
    use crate::structs::{Header, InodeItem, ItemPtr, Key, SuperblockDevItem};

    const NODE_SIZE: u32 = 4096;

    /// Builds one node-sized leaf carrying `items` in key order, computing
    /// each item's `data_offset` relative to `Header::SIZE` (which includes
    /// the item-pointer array's own length, since on-disk the pointer array
    /// and the data region share that same zero point) and stamping the
    /// header checksum over the result.
    fn build_leaf(items: &[(Key, Vec<u8>)]) -> Vec<u8> {
        let item_array_len = items.len() * ItemPtr::SIZE;
        let data_start = Header::SIZE + item_array_len;
        let mut payload = Vec::new();
        let mut ptrs = Vec::new();
        for (key, data) in items {
            ptrs.push((*key, (item_array_len + payload.len()) as u32, data.len() as u32));
            payload.extend_from_slice(data);
        }
        assert!(data_start + payload.len() <= NODE_SIZE as usize);

        let mut buf = vec![0u8; NODE_SIZE as usize];
        let nritems_off = Header::SIZE - 5;
        buf[nritems_off..nritems_off + 4].copy_from_slice(&(items.len() as u32).to_le_bytes());

        let mut off = Header::SIZE;
        for (key, data_offset, data_size) in &ptrs {
            buf[off..off + 8].copy_from_slice(&key.objectid.to_le_bytes());
            buf[off + 8] = key.ty;
            buf[off + 9..off + 17].copy_from_slice(&key.offset.to_le_bytes());
            buf[off + 17..off + 21].copy_from_slice(&data_offset.to_le_bytes());
            buf[off + 21..off + 25].copy_from_slice(&data_size.to_le_bytes());
            off += ItemPtr::SIZE;
        }
        buf[data_start..data_start + payload.len()].copy_from_slice(&payload);

        let csum = crc32c(!0u32, &buf[CSUM_COVERAGE_START..]);
        buf[0..4].copy_from_slice(&csum.to_le_bytes());
        buf
    }

    /// The `(Key, ChunkItem)` pair layout the superblock's embedded
    /// `sys_chunk_array` and the real chunk tree both use: a 17-byte key
    /// immediately followed by the chunk item (here, always one stripe).
    fn encode_chunk_array_entry(stripe_size: u64, stripe_offset: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&256u64.to_le_bytes()); // key.objectid (conventional first-chunk-tree id)
        buf.push(KEY_TYPE_CHUNK_ITEM);
        buf.extend_from_slice(&0u64.to_le_bytes()); // key.offset: logical start of the chunk

        buf.extend_from_slice(&chunk_item_payload(stripe_size, 0, stripe_offset));
        buf
    }

    fn chunk_item_payload(stripe_size: u64, device_id: u64, stripe_offset: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&stripe_size.to_le_bytes()); // chunk_size_bytes
        buf.extend_from_slice(&0u64.to_le_bytes()); // owner
        buf.extend_from_slice(&stripe_size.to_le_bytes()); // stripe_size
        buf.extend_from_slice(&0u64.to_le_bytes()); // ty
        buf.extend_from_slice(&0u32.to_le_bytes()); // io_align
        buf.extend_from_slice(&0u32.to_le_bytes()); // io_width
        buf.extend_from_slice(&4096u32.to_le_bytes()); // sector_size
        buf.extend_from_slice(&1u16.to_le_bytes()); // stripe_count
        buf.extend_from_slice(&0u16.to_le_bytes()); // sub_stripes
        buf.extend_from_slice(&device_id.to_le_bytes()); // stripe.device_id
        buf.extend_from_slice(&stripe_offset.to_le_bytes()); // stripe.offset
        buf.extend_from_slice(&[0u8; 16]); // stripe.dev_uuid
        buf
    }

    fn build_root_item(fs_tree_root_logical: u64) -> Vec<u8> {
        let total = InodeItem::SIZE + 8 * 7 + 4 + Key::SIZE + 1 + 1;
        let mut buf = vec![0u8; total];
        let bytenr_off = InodeItem::SIZE + 8 + 8; // past inode, generation, root_dirid
        buf[bytenr_off..bytenr_off + 8].copy_from_slice(&fs_tree_root_logical.to_le_bytes());
        buf
    }

    /// Writes a superblock with every field `Superblock::parse` reads
    /// populated at its correct, hand-verified offset (fields this test
    /// doesn't care about are left zeroed).
    fn build_superblock(generation: u64, chunk_root: u64, root: u64, sys_array: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; SUPERBLOCK_SIZE];
        let mut cur = CSUM_COVERAGE_START;
        cur += UUID_SIZE; // fsid
        cur += 8; // bytenr
        cur += 8; // flags
        buf[cur..cur + 8].copy_from_slice(&SUPERBLOCK_MAGIC);
        cur += 8;
        buf[cur..cur + 8].copy_from_slice(&generation.to_le_bytes());
        cur += 8;
        buf[cur..cur + 8].copy_from_slice(&root.to_le_bytes());
        cur += 8;
        buf[cur..cur + 8].copy_from_slice(&chunk_root.to_le_bytes());
        cur += 8;
        cur += 8; // log_root
        cur += 8; // log_root_transid
        cur += 8; // total_bytes
        cur += 8; // bytes_used
        cur += 8; // root_dir_objectid
        cur += 8; // num_devices
        buf[cur..cur + 4].copy_from_slice(&NODE_SIZE.to_le_bytes()); // sector_size
        cur += 4;
        buf[cur..cur + 4].copy_from_slice(&NODE_SIZE.to_le_bytes()); // node_size
        cur += 4;
        buf[cur..cur + 4].copy_from_slice(&NODE_SIZE.to_le_bytes()); // leaf_size
        cur += 4;
        cur += 4; // stripe_size
        buf[cur..cur + 4].copy_from_slice(&(sys_array.len() as u32).to_le_bytes()); // sys_chunk_array_size
        cur += 4;
        cur += 8; // chunk_root_generation
        cur += 8 + 8 + 8; // compat/compat_ro/incompat flags
        cur += 2; // csum_type
        cur += 1 + 1 + 1; // root/chunk_root/log_root level
        cur += SuperblockDevItem::SIZE;
        cur += LABEL_SIZE;
        cur += 8 + 8 + UUID_SIZE + 28 * 8; // cache_generation + uuid_tree_generation + metadata_uuid + reserved

        buf[cur..cur + sys_array.len()].copy_from_slice(sys_array);

        let csum = crc32c(!0u32, &buf[CSUM_COVERAGE_START..]);
        buf[0..4].copy_from_slice(&csum.to_le_bytes());
        buf
    }

    /// Builds a minimal, single-device image: superblock at offset 0,
    /// chunk tree root leaf (one ChunkItem mapping the low 3MiB), root
    /// tree root leaf (one RootItem naming the fs tree), and a fs tree
    /// root leaf with one file at "/hello".
    fn build_image() -> Vec<u8> {
        const CHUNK_TREE_ROOT: u64 = 0x20_0000;
        const ROOT_TREE_ROOT: u64 = 0x21_0000;
        const FS_TREE_ROOT: u64 = 0x22_0000;
        const SPAN: u64 = 0x30_0000;

        // Logical addresses below SPAN map 1:1 onto physical offsets in
        // `image` on device 0, so every other tree root's logical address
        // can double as its byte offset within the image.
        let sys_array = encode_chunk_array_entry(SPAN, 0);
        let sb = build_superblock(1, CHUNK_TREE_ROOT, ROOT_TREE_ROOT, &sys_array);

        // Chunk tree leaf: repeats the same mapping (harmless re-insert).
        let chunk_key = Key {
            objectid: 256,
            ty: KEY_TYPE_CHUNK_ITEM,
            offset: 0,
        };
        let chunk_leaf = build_leaf(&[(chunk_key, chunk_item_payload(SPAN, 0, 0))]);

        // Root tree leaf: one RootItem for the FS tree objectid.
        let root_key = Key {
            objectid: OBJECTID_FS_TREE,
            ty: KEY_TYPE_ROOT_ITEM,
            offset: 0,
        };
        let root_leaf = build_leaf(&[(root_key, build_root_item(FS_TREE_ROOT))]);

        // FS tree leaf: InodeItem(256) + DirItem("hello" -> 300).
        let inode_key = Key {
            objectid: 256,
            ty: KEY_TYPE_INODE_ITEM,
            offset: 0,
        };
        let inode_item_buf = vec![0u8; InodeItem::SIZE];

        let name = b"hello";
        let hash = name_hash(name) as u64;
        let dir_key = Key {
            objectid: 256,
            ty: KEY_TYPE_DIR_ITEM,
            offset: hash,
        };
        let mut dir_item_buf = Vec::new();
        dir_item_buf.extend_from_slice(&300u64.to_le_bytes()); // location.objectid
        dir_item_buf.push(1); // location.ty = file
        dir_item_buf.extend_from_slice(&0u64.to_le_bytes()); // location.offset
        dir_item_buf.extend_from_slice(&0u64.to_le_bytes()); // transid
        dir_item_buf.extend_from_slice(&0u16.to_le_bytes()); // data_len
        dir_item_buf.extend_from_slice(&(name.len() as u16).to_le_bytes()); // name_len
        dir_item_buf.push(1); // ty = file
        dir_item_buf.extend_from_slice(name);

        let dir_index_key = Key {
            objectid: 256,
            ty: KEY_TYPE_DIR_INDEX,
            offset: 2,
        };

        let file_inode_key = Key {
            objectid: 300,
            ty: KEY_TYPE_INODE_ITEM,
            offset: 0,
        };
        let file_inode_item_buf = vec![0u8; InodeItem::SIZE];

        let inode_ref_key = Key {
            objectid: 300,
            ty: KEY_TYPE_INODE_REF,
            offset: 256,
        };
        let mut inode_ref_buf = Vec::new();
        inode_ref_buf.extend_from_slice(&2u64.to_le_bytes()); // index, matches dir_index_key.offset
        inode_ref_buf.extend_from_slice(&(name.len() as u16).to_le_bytes()); // name_len
        inode_ref_buf.extend_from_slice(name);

        let fs_leaf = build_leaf(&[
            (inode_key, inode_item_buf),
            (dir_key, dir_item_buf.clone()),
            (dir_index_key, dir_item_buf),
            (file_inode_key, file_inode_item_buf),
            (inode_ref_key, inode_ref_buf),
        ]);

        let total = (FS_TREE_ROOT as usize) + NODE_SIZE as usize;
        let mut image = vec![0u8; total];
        image[SUPERBLOCK_OFFSETS[0] as usize..SUPERBLOCK_OFFSETS[0] as usize + sb.len()]
            .copy_from_slice(&sb);
        image[CHUNK_TREE_ROOT as usize..CHUNK_TREE_ROOT as usize + chunk_leaf.len()]
            .copy_from_slice(&chunk_leaf);
        image[ROOT_TREE_ROOT as usize..ROOT_TREE_ROOT as usize + root_leaf.len()]
            .copy_from_slice(&root_leaf);
        image[FS_TREE_ROOT as usize..FS_TREE_ROOT as usize + fs_leaf.len()]
            .copy_from_slice(&fs_leaf);
        image
    }

    #[test]
    fn boots_and_resolves_a_path() {
        let image = build_image();
        let mut parser = Parser::new(16);
        parser.set_read_handler(0, Box::new(MemoryDevice::new(image)));
        parser.start().unwrap();

        let inode = parser.resolve_path("/hello").unwrap();
        assert_eq!(inode, 300);
    }

    #[test]
    fn starting_twice_errors() {
        let image = build_image();
        let mut parser = Parser::new(16);
        parser.set_read_handler(0, Box::new(MemoryDevice::new(image)));
        parser.start().unwrap();
        assert!(matches!(parser.start(), Err(ParserError::AlreadyBooted)));
    }

    #[test]
    fn stat_returns_inode_item() {
        let image = build_image();
        let mut parser = Parser::new(16);
        parser.set_read_handler(0, Box::new(MemoryDevice::new(image)));
        parser.start().unwrap();

        let inode = parser.resolve_path("/hello").unwrap();
        parser.stat(inode).unwrap();
    }

    #[test]
    fn list_dir_finds_the_single_entry() {
        let image = build_image();
        let mut parser = Parser::new(16);
        parser.set_read_handler(0, Box::new(MemoryDevice::new(image)));
        parser.start().unwrap();

        let entries = parser.list_dir(256).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, b"hello");
        assert_eq!(entries[0].location.objectid, 300);
    }

    #[test]
    fn inode_ref_resolves_backlink_name() {
        let image = build_image();
        let mut parser = Parser::new(16);
        parser.set_read_handler(0, Box::new(MemoryDevice::new(image)));
        parser.start().unwrap();

        let inode = parser.resolve_path("/hello").unwrap();
        let reference = parser.inode_ref(inode).unwrap();
        assert_eq!(reference.name, b"hello");
        assert_eq!(reference.index, 2);
    }

    #[test]
    fn missing_path_component_errors() {
        let image = build_image();
        let mut parser = Parser::new(16);
        parser.set_read_handler(0, Box::new(MemoryDevice::new(image)));
        parser.start().unwrap();

        assert!(matches!(
            parser.resolve_path("/world"),
            Err(ParserError::PathNotFound { .. })
        ));
    }
}

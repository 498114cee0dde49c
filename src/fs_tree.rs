//! Filesystem tree: inode metadata, directory entries, and path
//! resolution.
//!
//! The original implementation threaded the inode being visited through a
//! file-scope global (`current_inode`), which made recursive traversal
//! fragile — a nested call would clobber the caller's notion of "current"
//! inode. Here it's an explicit parameter/return value at every step.

use crate::constants::{
    DEFAULT_ROOT_INODE, KEY_TYPE_DIR_INDEX, KEY_TYPE_DIR_ITEM, KEY_TYPE_INODE_ITEM,
    KEY_TYPE_INODE_REF,
};
use crate::crc32c::name_hash;
use crate::error::{ParserError, Result};
use crate::inode_cache::InodeCache;
use crate::io::BlockIo;
use crate::node;
use crate::structs::{DirItem, InodeItem, InodeRef, Key};
use crate::translator::Translator;

/// One entry of a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: Vec<u8>,
    pub location: Key,
    pub ty: u8,
}

/// Looks up the inode's on-disk metadata. When `cache` holds a leaf
/// address for `inode`, that leaf is read and scanned directly instead of
/// descending from `fs_tree_root`; a miss (stale or absent entry) falls
/// back to a full descent, which then refreshes the cache.
pub fn get_inode_item(
    translator: &Translator,
    io: &mut BlockIo,
    cache: &mut InodeCache,
    fs_tree_root: u64,
    node_size: u32,
    inode: u64,
) -> Result<InodeItem> {
    let target = Key {
        objectid: inode,
        ty: KEY_TYPE_INODE_ITEM,
        offset: 0,
    };

    if let Some(leaf) = cache.get(inode) {
        if let Some(data) = node::scan_leaf_for_key(io, translator, leaf, node_size, target)? {
            return InodeItem::parse(&data, 0);
        }
    }

    let (leaf, data) = node::find_item_with_leaf(translator, io, fs_tree_root, node_size, target)?
        .ok_or(ParserError::PathNotFound {
            component: format!("inode {inode}"),
        })?;
    cache.insert(inode, leaf);
    InodeItem::parse(&data, 0)
}

/// Looks up `inode`'s backlink to the directory entry naming it. An inode
/// can have more than one `INODE_REF` (hardlinks); this returns the first
/// one found in key order.
pub fn get_inode_ref(
    translator: &Translator,
    io: &mut BlockIo,
    fs_tree_root: u64,
    node_size: u32,
    inode: u64,
) -> Result<InodeRef> {
    let items = node::collect_items(translator, io, fs_tree_root, node_size, &mut |key| {
        key.objectid == inode && key.ty == KEY_TYPE_INODE_REF
    })?;
    let (_, data) = items.first().ok_or(ParserError::PathNotFound {
        component: format!("inode {inode} has no INODE_REF"),
    })?;
    InodeRef::parse(data, 0)
}

/// Looks up a single named entry within `dir_inode`.
///
/// Directory entries are keyed by the CRC-32C hash of their name, which
/// two different names can collide on; unlike the original implementation
/// (which trusted the hash alone), this also compares the stored name
/// bytes against `name` before accepting a match.
///
/// `dir_inode`'s cached leaf address (if any) is tried first, since a
/// directory's `InodeItem` and its `DirItem` children are keyed by the
/// same `object_id` and therefore ordinarily live in the same leaf.
pub fn lookup_dir_entry(
    translator: &Translator,
    io: &mut BlockIo,
    cache: &mut InodeCache,
    fs_tree_root: u64,
    node_size: u32,
    dir_inode: u64,
    name: &[u8],
) -> Result<DirEntry> {
    let target = Key {
        objectid: dir_inode,
        ty: KEY_TYPE_DIR_ITEM,
        offset: name_hash(name) as u64,
    };

    let from_cache = match cache.get(dir_inode) {
        Some(leaf) => node::scan_leaf_for_key(io, translator, leaf, node_size, target)?,
        None => None,
    };

    let data = match from_cache {
        Some(data) => data,
        None => {
            let (leaf, data) =
                node::find_item_with_leaf(translator, io, fs_tree_root, node_size, target)?.ok_or(
                    ParserError::PathNotFound {
                        component: String::from_utf8_lossy(name).into_owned(),
                    },
                )?;
            cache.insert(dir_inode, leaf);
            data
        }
    };

    let dir_item = DirItem::parse(&data, 0)?;

    if dir_item.name != name {
        return Err(ParserError::PathNotFound {
            component: String::from_utf8_lossy(name).into_owned(),
        });
    }

    Ok(DirEntry {
        name: dir_item.name,
        location: dir_item.location,
        ty: dir_item.ty,
    })
}

/// Lists every entry in `dir_inode`, in on-disk (index) order.
pub fn list_dir(
    translator: &Translator,
    io: &mut BlockIo,
    fs_tree_root: u64,
    node_size: u32,
    dir_inode: u64,
) -> Result<Vec<DirEntry>> {
    let mut items = node::collect_items(translator, io, fs_tree_root, node_size, &mut |key| {
        key.objectid == dir_inode && key.ty == KEY_TYPE_DIR_INDEX
    })?;
    items.sort_by_key(|(key, _)| key.offset);

    items
        .into_iter()
        .map(|(_, data)| {
            let dir_item = DirItem::parse(&data, 0)?;
            Ok(DirEntry {
                name: dir_item.name,
                location: dir_item.location,
                ty: dir_item.ty,
            })
        })
        .collect()
}

/// Resolves a `/`-separated path, starting at the default filesystem
/// tree's root inode, to the inode `Key` it names.
pub fn resolve_path(
    translator: &Translator,
    io: &mut BlockIo,
    cache: &mut InodeCache,
    fs_tree_root: u64,
    node_size: u32,
    path: &str,
) -> Result<Key> {
    let mut current_inode = DEFAULT_ROOT_INODE;
    let mut current_key = Key {
        objectid: DEFAULT_ROOT_INODE,
        ty: KEY_TYPE_INODE_ITEM,
        offset: 0,
    };

    for component in path.split('/').filter(|c| !c.is_empty()) {
        let entry = lookup_dir_entry(
            translator,
            io,
            cache,
            fs_tree_root,
            node_size,
            current_inode,
            component.as_bytes(),
        )?;
        current_key = entry.location;
        current_inode = entry.location.objectid;
    }

    Ok(current_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_resolves_to_root_inode() {
        // An empty/root path should resolve to the default root inode
        // without touching storage at all.
        let translator = Translator::new();
        let mut io = BlockIo::new();
        let mut cache = InodeCache::new(16);
        // resolve_path with "" never calls lookup_dir_entry, so no I/O
        // handler needs to be registered.
        let key = resolve_path(&translator, &mut io, &mut cache, 0, 4096, "").unwrap();
        assert_eq!(key.objectid, DEFAULT_ROOT_INODE);
    }
}

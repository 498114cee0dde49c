//! Root tree: a thin directory of the other trees' logical roots, keyed
//! by a handful of reserved object ids.

use crate::constants::{
    KEY_TYPE_ROOT_ITEM, OBJECTID_CHECKSUM_TREE, OBJECTID_DEV_TREE, OBJECTID_EXTENT_TREE,
    OBJECTID_FS_TREE,
};
use crate::error::Result;
use crate::io::BlockIo;
use crate::node::{self, NodeView};
use crate::structs::RootItem;
use crate::translator::Translator;

/// Logical roots of the trees the root tree points at. Each is `None`
/// until the corresponding `RootItem` is found.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeRoots {
    pub fs_tree: Option<u64>,
    pub extent_tree: Option<u64>,
    pub dev_tree: Option<u64>,
    pub checksum_tree: Option<u64>,
}

pub fn walk_root_tree(
    translator: &Translator,
    io: &mut BlockIo,
    root_logical: u64,
    node_size: u32,
) -> Result<TreeRoots> {
    let mut roots = TreeRoots::default();
    walk(translator, io, root_logical, node_size, &mut roots)?;
    Ok(roots)
}

fn walk(
    translator: &Translator,
    io: &mut BlockIo,
    logical: u64,
    node_size: u32,
    roots: &mut TreeRoots,
) -> Result<()> {
    let buf = node::fetch(io, translator, logical, node_size)?;
    let node = NodeView::parse(&buf)?;

    if node.is_leaf() {
        let mut ordinal = 0usize;
        while let Some(item) = node.find_item(KEY_TYPE_ROOT_ITEM, 0, ordinal)? {
            let data = node.item_data(&item)?;
            let root_item = RootItem::parse(data, 0)?;

            match item.key.objectid {
                OBJECTID_FS_TREE => roots.fs_tree = Some(root_item.bytenr),
                OBJECTID_EXTENT_TREE => roots.extent_tree = Some(root_item.bytenr),
                OBJECTID_DEV_TREE => roots.dev_tree = Some(root_item.bytenr),
                OBJECTID_CHECKSUM_TREE => roots.checksum_tree = Some(root_item.bytenr),
                _ => {}
            }
            ordinal += 1;
        }
    } else {
        for ptr in node.key_ptrs()? {
            walk(translator, io, ptr.block_number, node_size, roots)?;
        }
    }

    Ok(())
}

//! Chunk tree: the component that turns the translator from an empty
//! shell into something that can resolve the rest of the filesystem.
//!
//! The superblock's embedded `sys_chunk_array` seeds just enough mappings
//! to read the real chunk tree root; walking that tree then installs the
//! remaining mappings for every other tree.

use crate::constants::KEY_TYPE_CHUNK_ITEM;
use crate::error::{ParserError, Result};
use crate::io::BlockIo;
use crate::node::{self, NodeView};
use crate::structs::{ChunkItem, Key};
use crate::translator::Translator;

/// Installs the bootstrap mappings carried directly in the superblock.
pub fn seed_from_superblock(translator: &mut Translator, sys_chunk_array: &[u8]) -> Result<()> {
    let array_size = sys_chunk_array.len();
    let mut offset = 0usize;

    while offset < array_size {
        let key = Key::parse(sys_chunk_array, offset)?;
        if key.ty != KEY_TYPE_CHUNK_ITEM {
            return Err(ParserError::Malformed(
                "unexpected key type in sys_chunk_array",
            ));
        }
        offset += Key::SIZE;

        let (chunk, consumed) = ChunkItem::parse(sys_chunk_array, offset)?;
        offset += consumed;

        install_chunk(translator, key.offset, &chunk)?;
    }

    Ok(())
}

/// Installs every mapping reachable from the chunk tree root.
pub fn walk_chunk_tree(
    translator: &mut Translator,
    io: &mut BlockIo,
    root_logical: u64,
    node_size: u32,
) -> Result<()> {
    let buf = node::fetch(io, translator, root_logical, node_size)?;
    let node = NodeView::parse(&buf)?;

    if node.is_leaf() {
        let mut ordinal = 0usize;
        while let Some(item) = node.find_item(KEY_TYPE_CHUNK_ITEM, 0, ordinal)? {
            let data = node.item_data(&item)?;
            let (chunk, _) = ChunkItem::parse(data, 0)?;
            install_chunk(translator, item.key.offset, &chunk)?;
            ordinal += 1;
        }
    } else {
        for ptr in node.key_ptrs()? {
            walk_chunk_tree(translator, io, ptr.block_number, node_size)?;
        }
    }

    Ok(())
}

fn install_chunk(translator: &mut Translator, logical: u64, chunk: &ChunkItem) -> Result<()> {
    // Every stripe of a chunk is expected to carry identical content,
    // mirroring each other for resilience; the first stripe determines the
    // mapping we resolve through.
    let stripe = chunk
        .stripes
        .first()
        .ok_or(ParserError::Malformed("chunk item with zero stripes"))?;

    if chunk.stripes.len() > 1 {
        tracing::debug!(
            logical,
            count = chunk.stripes.len(),
            "chunk has multiple stripes, mapping through the first"
        );
    }

    // spec.md flags the original's use of `chunk_size_bytes` as the
    // per-mapping span as a likely defect: a multi-stripe/striped chunk's
    // *logical* extent is governed by `stripe_size`, not the total
    // allocation size. Use `stripe_size`.
    translator.insert(logical, stripe.offset, chunk.stripe_size, stripe.device_id)
}

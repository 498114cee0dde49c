//! Read-only parser for the on-disk btrfs format.
//!
//! `Parser` is the only entry point a caller needs: register one read (and,
//! if writes are ever wanted, write) handler per device id, call `start()`
//! to locate the superblock and bring up the address translator, then use
//! `resolve_path`/`read_file`/`scrub` to walk the filesystem it describes.

mod bytes;
mod constants;
mod crc32c;
mod error;
mod io;
mod structs;
mod translator;

mod node;

mod checksum_tree;
mod chunk_tree;
mod file;
mod fs_tree;
mod inode_cache;
mod root_tree;
mod superblock;

mod parser;

pub use error::{ParserError, Result};
pub use fs_tree::DirEntry;
pub use io::{BlockIo, BlockRead, BlockWrite, MemoryDevice};
pub use parser::Parser;
pub use structs::{InodeItem, InodeRef};

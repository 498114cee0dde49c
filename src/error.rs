//! Discriminated error type surfaced by every fallible operation in the
//! parser. spec.md enumerates five error kinds (no valid superblock,
//! checksum mismatch, translation failure, path not found, short read);
//! `AlignmentViolation` is added so the translator's silent-rejection
//! behaviour is independently observable and testable.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParserError {
    #[error("no valid superblock found among candidate offsets")]
    NoValidSuperblock,

    #[error("checksum mismatch at logical={logical:?}: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        logical: Option<u64>,
        expected: u32,
        actual: u32,
    },

    #[error("logical address {logical:#x} is not mapped by the translator")]
    TranslationFailure { logical: u64 },

    #[error("path component {component:?} not found")]
    PathNotFound { component: String },

    #[error("short read: requested {requested} bytes, got {actual}")]
    ShortRead { requested: u64, actual: u64 },

    #[error("unaligned mapping insert: logical={logical:#x} physical={physical:#x} length={length:#x}")]
    AlignmentViolation {
        logical: u64,
        physical: u64,
        length: u64,
    },

    #[error("parser has already been booted; call initialize() before start() again")]
    AlreadyBooted,

    #[error("malformed on-disk record: {0}")]
    Malformed(&'static str),
}

pub type Result<T> = std::result::Result<T, ParserError>;

impl ParserError {
    /// Maps an error onto the legacy integer convention described in
    /// spec.md §6/§7: -1 for I/O/checksum/translation failures, -2 for a
    /// missing path component.
    pub fn as_legacy_code(&self) -> i32 {
        match self {
            ParserError::PathNotFound { .. } => -2,
            _ => -1,
        }
    }
}

//! Logical-to-physical address translator.
//!
//! A four-level radix tree keyed by 9-bit slices of the logical address,
//! mirroring a hardware page table: L4 spans 512GiB, L3 1GiB, L2 2MiB, L1
//! 4KiB. Mappings installed from the chunk tree are greedily decomposed
//! into the largest aligned span at each step, so a single multi-gigabyte
//! chunk collapses to one L4 (or L3) leaf instead of thousands of 4KiB
//! leaves.
//!
//! Leaves are tagged `Slot` variants rather than pointer tagging on the
//! low address bits.

use crate::constants::{LEVEL_SHIFTS, LEVEL_SIZES, L1_SIZE, TABLE_ENTRIES};
use crate::error::{ParserError, Result};

enum Slot {
    Empty,
    Child(Box<Table>),
    Leaf { device_id: u64, physical_start: u64 },
}

struct Table {
    entries: Box<[Slot; TABLE_ENTRIES]>,
}

impl Table {
    fn new() -> Self {
        Table {
            entries: Box::new(std::array::from_fn(|_| Slot::Empty)),
        }
    }
}

/// Maps btrfs logical addresses to `(device_id, physical offset)` pairs.
pub struct Translator {
    root: Table,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new()
    }
}

impl Translator {
    pub fn new() -> Self {
        Translator { root: Table::new() }
    }

    /// Installs a mapping covering `[logical, logical+length)` -> physical
    /// addresses on `device_id` starting at `physical`. `logical`,
    /// `physical`, and `length` must all be 4KiB-aligned.
    pub fn insert(&mut self, logical: u64, physical: u64, length: u64, device_id: u64) -> Result<()> {
        if logical & (L1_SIZE - 1) != 0 || physical & (L1_SIZE - 1) != 0 || length & (L1_SIZE - 1) != 0
        {
            return Err(ParserError::AlignmentViolation {
                logical,
                physical,
                length,
            });
        }

        let mut cur_logical = logical;
        let mut cur_physical = physical;
        let mut remaining = length;

        while remaining > 0 {
            let span = LEVEL_SIZES
                .iter()
                .copied()
                .find(|&s| s <= remaining && cur_logical % s == 0)
                .unwrap_or(L1_SIZE);
            self.insert_span(cur_logical, cur_physical, device_id, span)?;
            cur_logical += span;
            cur_physical += span;
            remaining -= span;
        }

        Ok(())
    }

    fn insert_span(&mut self, logical: u64, physical: u64, device_id: u64, span: u64) -> Result<()> {
        let level = LEVEL_SIZES
            .iter()
            .position(|&s| s == span)
            .expect("span must be one of the four known level sizes");

        let mut table = &mut self.root;
        for depth in 0..level {
            let idx = Self::index(logical, depth);
            match &table.entries[idx] {
                // A narrower span collides with a broader mapping already
                // installed here. Source behaviour (spec.md §3/§4.3)
                // discards the existing leaf and redescends rather than
                // erroring, accepting the loss of the broader mapping.
                Slot::Leaf { .. } | Slot::Empty => {
                    table.entries[idx] = Slot::Child(Box::new(Table::new()))
                }
                Slot::Child(_) => {}
            }
            table = match &mut table.entries[idx] {
                Slot::Child(t) => t.as_mut(),
                _ => unreachable!(),
            };
        }

        let idx = Self::index(logical, level);
        table.entries[idx] = Slot::Leaf {
            device_id,
            physical_start: physical,
        };
        Ok(())
    }

    /// Resolves `logical` to the device and physical offset backing it.
    pub fn translate(&self, logical: u64) -> Result<(u64, u64)> {
        let mut table = &self.root;
        for depth in 0..LEVEL_SHIFTS.len() {
            let idx = Self::index(logical, depth);
            match &table.entries[idx] {
                Slot::Empty => return Err(ParserError::TranslationFailure { logical }),
                Slot::Leaf {
                    device_id,
                    physical_start,
                } => {
                    let span = LEVEL_SIZES[depth];
                    let within = logical & (span - 1);
                    return Ok((*device_id, physical_start + within));
                }
                Slot::Child(t) => table = t.as_ref(),
            }
        }
        Err(ParserError::TranslationFailure { logical })
    }

    fn index(logical: u64, depth: usize) -> usize {
        ((logical >> LEVEL_SHIFTS[depth]) & (TABLE_ENTRIES as u64 - 1)) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{L1_SIZE, L2_SIZE};

    #[test]
    fn single_page_round_trips() {
        let mut t = Translator::new();
        t.insert(0, 0x1000_0000, L1_SIZE, 1).unwrap();
        assert_eq!(t.translate(0).unwrap(), (1, 0x1000_0000));
        assert_eq!(t.translate(100).unwrap(), (1, 0x1000_0000 + 100));
    }

    #[test]
    fn span_spanning_multiple_levels_decomposes() {
        let mut t = Translator::new();
        let length = L2_SIZE + L1_SIZE;
        t.insert(0, 0x2000_0000, length, 7).unwrap();
        assert_eq!(t.translate(0).unwrap(), (7, 0x2000_0000));
        assert_eq!(t.translate(L2_SIZE).unwrap(), (7, 0x2000_0000 + L2_SIZE));
        assert!(t.translate(length).is_err());
    }

    #[test]
    fn unaligned_insert_rejected() {
        let mut t = Translator::new();
        assert!(t.insert(1, 0, L1_SIZE, 1).is_err());
        assert!(t.insert(0, 1, L1_SIZE, 1).is_err());
        assert!(t.insert(0, 0, 1, 1).is_err());
    }

    #[test]
    fn untranslated_address_errors() {
        let t = Translator::new();
        assert!(t.translate(0x1234).is_err());
    }
}

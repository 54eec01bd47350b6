//! Structural checks of a whole table.

use getset::CopyGetters;
use pagemap_abi::{
    errors::PagingErrors,
    mode::{PagingLevel, PagingMode},
};

use super::{entry::PageEntry, pae_pdpt};
use crate::{
    addr::{PAddr, VAddr},
    globals::{BASE_PAGE_LENGTH, PAE_ROOT_ALIGNMENT},
    memory::PhysMemory,
};

/// Bits that must be zero in a present PAE PDPTE: 2:1, 8:5 and 63.
const PAE_PDPTE_RESERVED_BITS: u64 = 0x8000_0000_0000_01e6;

/// What is wrong with an entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Violation {
    /// These reserved bits are set.
    ReservedBits(u64),
    /// The entry maps a page larger than the paging mode allows.
    PageTooLarge,
}

/// The first offending entry found by [`validate_table`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct EntryViolation {
    /// Level of the structure holding the entry.
    level: PagingLevel,
    /// First linear address translated through the entry.
    linear_address: VAddr,
    entry: PageEntry,
    violation: Violation,
}

struct Validator<'a, M> {
    memory: &'a M,
    max_leaf_level: PagingLevel,
}

impl<'a, M: PhysMemory> Validator<'a, M> {
    fn check(
        &self,
        entry: PageEntry,
        level: PagingLevel,
        linear: u64,
    ) -> Option<EntryViolation> {
        let violation = |violation| EntryViolation {
            level,
            linear_address: VAddr::new(linear),
            entry,
            violation,
        };

        let reserved = entry.reserved_bits(level);
        if reserved != 0 {
            return Some(violation(Violation::ReservedBits(reserved)));
        }
        if entry.is_leaf(level) && level > self.max_leaf_level {
            return Some(violation(Violation::PageTooLarge));
        }
        None
    }

    fn walk(&self, table: PAddr, level: PagingLevel, linear_base: u64) -> Option<EntryViolation> {
        let memory = self.memory;
        for (index, &entry) in memory.table(table).iter().enumerate() {
            if !entry.is_present() {
                continue;
            }

            let linear = linear_base + index as u64 * level.region_length();
            if let Some(violation) = self.check(entry, level, linear) {
                return Some(violation);
            }
            if let Some(lower) = level.lower().filter(|_| !entry.is_leaf(level)) {
                if let Some(violation) = self.walk(entry.table_address(), lower, linear) {
                    return Some(violation);
                }
            }
        }
        None
    }

    fn walk_pae(&self, root: PAddr) -> Option<EntryViolation> {
        for (index, &entry) in pae_pdpt(self.memory, root).iter().enumerate() {
            if !entry.is_present() {
                continue;
            }

            let linear = index as u64 * PagingLevel::Pdpte.region_length();
            let reserved = entry.bits() & PAE_PDPTE_RESERVED_BITS;
            if reserved != 0 {
                return Some(EntryViolation {
                    level: PagingLevel::Pdpte,
                    linear_address: VAddr::new(linear),
                    entry,
                    violation: Violation::ReservedBits(reserved),
                });
            }
            if let Some(violation) = self.walk(entry.table_address(), PagingLevel::Pde, linear) {
                return Some(violation);
            }
        }
        None
    }
}

/// Check every present entry reachable from `root` against the layout rules of its
/// level and of `mode`.
///
/// Returns the first entry, in linear address order, that has reserved bits set or maps
/// a page larger than `mode` supports. 32-bit tables are [`PagingErrors::Unsupported`].
pub fn validate_table<M: PhysMemory>(
    memory: &M,
    root: PAddr,
    mode: PagingMode,
) -> Result<Option<EntryViolation>, PagingErrors> {
    let validator = Validator {
        memory,
        max_leaf_level: mode.max_leaf_level(),
    };

    match mode {
        PagingMode::Paging32Bit => Err(PagingErrors::Unsupported),
        PagingMode::Pae => {
            if !root.is_aligned(PAE_ROOT_ALIGNMENT) {
                return Err(PagingErrors::InvalidParameter);
            }
            Ok(validator.walk_pae(root))
        }
        _ => {
            if !root.is_aligned(BASE_PAGE_LENGTH as u64) {
                return Err(PagingErrors::InvalidParameter);
            }
            Ok(validator.walk(root, mode.max_level(), 0))
        }
    }
}

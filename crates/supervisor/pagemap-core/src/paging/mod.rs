/// Level independent attributes and masks.
pub mod attribute;

/// Raw entry layouts.
pub mod entry;

mod map;
mod parse;
mod validate;


pub use attribute::{AttributeMask, MapAttribute, MapFlags};
pub use entry::PageEntry;
pub use map::{map, required_buffer_size, MapRequest, Mapping};
pub use parse::{parse, parse_to_vec, MapRegion};
pub use validate::{validate_table, EntryViolation, Violation};

use core::ops::{Deref, DerefMut};

use crate::{
    addr::PAddr,
    globals::{BASE_PAGE_LENGTH, ENTRIES_PER_TABLE, PAE_PDPT_ENTRIES},
    memory::PhysMemory,
};

/// One paging structure: 512 entries filling a 4 KiB page.
#[derive(Debug, Clone, Eq, PartialEq)]
#[repr(C, align(4096))]
pub struct PageTable([PageEntry; ENTRIES_PER_TABLE]);

assert_eq_size!(PageTable, [u8; BASE_PAGE_LENGTH]);
const_assert_eq!(core::mem::align_of::<PageTable>(), BASE_PAGE_LENGTH);

impl PageTable {
    /// A table with every entry absent.
    pub const fn new() -> Self {
        Self([PageEntry::empty(); ENTRIES_PER_TABLE])
    }

    /// Mark every entry absent.
    pub fn clear(&mut self) {
        self.0 = [PageEntry::empty(); ENTRIES_PER_TABLE];
    }
}

/// The four PDPTEs of a PAE root, which need not start a page.
pub(crate) fn pae_pdpt<M: PhysMemory>(memory: &M, root: PAddr) -> &[PageEntry] {
    let page = root.align_down(BASE_PAGE_LENGTH as u64);
    let first = ((root - page) / 8) as usize;
    &memory.table(page)[first..first + PAE_PDPT_ENTRIES]
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for PageTable {
    type Target = [PageEntry; ENTRIES_PER_TABLE];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PageTable {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

use alloc::{boxed::Box, collections::BTreeMap};

use super::{PageBuffer, PhysMemory};
use crate::{addr::PAddr, globals::BASE_PAGE_LENGTH, paging::PageTable};

/// Default physical address of the first arena page.
const DEFAULT_ARENA_BASE: u64 = 0x10_0000;

/// Page table memory kept on the heap, keyed by made-up physical addresses.
///
/// The arena doubles as the physical page allocator a caller of the map engine needs:
/// it hands out zeroed roots and page buffers whose addresses it can later resolve.
/// Two arenas compare equal when they hold the same pages with the same contents.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PageArena {
    pages: BTreeMap<PAddr, Box<PageTable>>,
    next: PAddr,
}

impl Default for PageArena {
    fn default() -> Self {
        Self::new()
    }
}

impl PageArena {
    /// Create an empty arena handing out addresses from 1 MiB upwards.
    pub fn new() -> Self {
        Self::with_base(PAddr::new(DEFAULT_ARENA_BASE))
    }

    /// Create an empty arena handing out addresses from `base` upwards.
    pub fn with_base(base: PAddr) -> Self {
        assert!(base.is_aligned(BASE_PAGE_LENGTH as u64));
        Self {
            pages: BTreeMap::new(),
            next: base,
        }
    }

    /// Allocate one zeroed page, suitable as an empty root table.
    pub fn allocate_table(&mut self) -> PAddr {
        let paddr = self.next;
        self.pages.insert(paddr, Box::new(PageTable::new()));
        self.next += BASE_PAGE_LENGTH as u64;
        paddr
    }

    /// Allocate a buffer of at least `size` bytes of contiguous zeroed pages.
    pub fn allocate_buffer(&mut self, size: usize) -> PageBuffer {
        let pages = (size + BASE_PAGE_LENGTH - 1) / BASE_PAGE_LENGTH;
        let base = self.next;
        for _ in 0..pages {
            self.allocate_table();
        }
        PageBuffer {
            base,
            size: pages * BASE_PAGE_LENGTH,
        }
    }

    /// Number of pages handed out so far.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl PhysMemory for PageArena {
    fn table(&self, paddr: PAddr) -> &PageTable {
        self.pages
            .get(&paddr)
            .unwrap_or_else(|| panic!("no paging structure at {:#x}", paddr))
    }

    fn table_mut(&mut self, paddr: PAddr) -> &mut PageTable {
        self.pages
            .get_mut(&paddr)
            .unwrap_or_else(|| panic!("no paging structure at {:#x}", paddr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation() {
        let mut arena = PageArena::new();
        let root = arena.allocate_table();
        let buffer = arena.allocate_buffer(0x1800);

        assert_eq!(root, PAddr::new(DEFAULT_ARENA_BASE));
        assert_eq!(buffer.base(), PAddr::new(DEFAULT_ARENA_BASE + 0x1000));
        assert_eq!(buffer.size(), 0x2000);
        assert_eq!(arena.page_count(), 3);
        for paddr in [root, buffer.base(), buffer.base() + 0x1000] {
            assert!(arena.table(paddr).iter().all(|entry| entry.is_empty()));
        }
    }

    #[test]
    #[should_panic(expected = "no paging structure")]
    fn test_unknown_page() {
        let arena = PageArena::new();
        arena.table(PAddr::new(0x5000));
    }
}

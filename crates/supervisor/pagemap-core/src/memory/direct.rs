use super::PhysMemory;
use crate::{addr::PAddr, globals::BASE_PAGE_LENGTH, paging::PageTable};

/// Reaches paging structures through a fixed offset between physical and virtual
/// addresses, e.g. an identity map (offset 0) or a kernel's direct physical map.
#[derive(Debug, Copy, Clone)]
pub struct DirectMap {
    offset: u64,
}

impl DirectMap {
    /// Create a backend that reads the page at `paddr` from virtual address
    /// `paddr + offset`.
    ///
    /// # Safety
    ///
    /// Every physical page reachable from a table given to the engines, and every page of
    /// a buffer given to the map engine, must be mapped readable and writable at
    /// `paddr + offset` and must not be accessed through any other alias while the
    /// engines run.
    pub const unsafe fn new(offset: u64) -> Self {
        Self { offset }
    }

    fn pointer(&self, paddr: PAddr) -> *mut PageTable {
        assert!(paddr.is_aligned(BASE_PAGE_LENGTH as u64));
        paddr.as_u64().wrapping_add(self.offset) as *mut PageTable
    }
}

impl PhysMemory for DirectMap {
    fn table(&self, paddr: PAddr) -> &PageTable {
        // Validity of the mapping is guaranteed by the contract of `DirectMap::new`.
        unsafe { &*self.pointer(paddr) }
    }

    fn table_mut(&mut self, paddr: PAddr) -> &mut PageTable {
        unsafe { &mut *self.pointer(paddr) }
    }
}

//! Physical memory holding paging structures.
//!
//! The engines never dereference a physical address on their own. They go through a
//! [`PhysMemory`] backend, which hands out a typed [`PageTable`] view of the 4 KiB page at
//! a physical address. The pages themselves always belong to the caller.

mod arena;
mod direct;

pub use arena::PageArena;
pub use direct::DirectMap;

use getset::CopyGetters;

use crate::{
    addr::PAddr,
    globals::BASE_PAGE_LENGTH,
    paging::PageTable,
    PagingErrors,
};

/// Access to the pages of a page table, keyed by physical address.
pub trait PhysMemory {
    /// Borrow the paging structure stored at `paddr`.
    fn table(&self, paddr: PAddr) -> &PageTable;

    /// Mutably borrow the paging structure stored at `paddr`.
    fn table_mut(&mut self, paddr: PAddr) -> &mut PageTable;
}

/// A contiguous pool of free pages given to the map engine.
///
/// Pages are consumed from the high end. Once consumed a page becomes part of the table
/// it was linked into; the pool itself never returns pages.
#[derive(Debug, Copy, Clone, Eq, PartialEq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct PageBuffer {
    /// Physical address of the lowest page.
    base: PAddr,
    /// Size in bytes, always a multiple of 4 KiB.
    size: usize,
}

impl PageBuffer {
    /// Describe `size` bytes of free pages starting at `base`.
    pub fn new(base: PAddr, size: usize) -> Result<Self, PagingErrors> {
        if !base.is_aligned(BASE_PAGE_LENGTH as u64) || size % BASE_PAGE_LENGTH != 0 {
            return Err(PagingErrors::InvalidParameter);
        }
        Ok(Self { base, size })
    }

    /// A buffer with no pages, used to ask the map engine for its required size.
    pub const fn empty() -> Self {
        Self {
            base: PAddr::new(0),
            size: 0,
        }
    }

    /// Take the highest remaining page.
    pub(crate) fn take_page(&mut self) -> Option<PAddr> {
        if self.size < BASE_PAGE_LENGTH {
            return None;
        }
        self.size -= BASE_PAGE_LENGTH;
        Some(self.base + self.size as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_validation() {
        assert_eq!(
            PageBuffer::new(PAddr::new(0x1800), 0x1000),
            Err(PagingErrors::InvalidParameter)
        );
        assert_eq!(
            PageBuffer::new(PAddr::new(0x1000), 0x1800),
            Err(PagingErrors::InvalidParameter)
        );
        assert_eq!(PageBuffer::empty().size(), 0);
    }

    #[test]
    fn test_buffer_consumed_from_top() {
        let mut buffer = PageBuffer::new(PAddr::new(0x10_0000), 0x3000).unwrap();
        assert_eq!(buffer.size(), 3 * BASE_PAGE_LENGTH);
        assert_eq!(buffer.take_page(), Some(PAddr::new(0x10_2000)));
        assert_eq!(buffer.take_page(), Some(PAddr::new(0x10_1000)));
        assert_eq!(buffer.take_page(), Some(PAddr::new(0x10_0000)));
        assert_eq!(buffer.take_page(), None);
        assert_eq!(buffer.size(), 0);
    }
}

//! Construction, update and introspection of IA-32e page tables.
//!
//! Tables live in memory owned by the caller and are reached through a [`memory::PhysMemory`]
//! backend. [`paging::map`] edits a range of linear addresses, [`paging::parse`] reads a
//! table back as a list of coalesced regions. Neither engine allocates: map consumes pages
//! from a caller-supplied [`memory::PageBuffer`] and reports the exact size it needs when the
//! buffer falls short.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;
#[macro_use]
extern crate pagemap_utils;
#[macro_use]
extern crate static_assertions;

/// Support for addresses.
pub mod addr;

/// Crate level configuration.
pub mod globals;

/// Backends giving access to page table memory.
pub mod memory;

/// Page table entries, the map engine and the parse engine.
pub mod paging;

#[cfg(test)]
mod test_logger;

pub use pagemap_abi::prelude::*;

/// Prelude to re-export commonly used items.
pub mod prelude {
    pub use crate::addr::{PAddr, VAddr};
    pub use crate::memory::{DirectMap, PageArena, PageBuffer, PhysMemory};
    pub use crate::paging::{
        map, parse, parse_to_vec, required_buffer_size, validate_table, AttributeMask,
        MapAttribute, MapFlags, MapRegion, MapRequest, Mapping, PageTable,
    };
    pub use pagemap_abi::prelude::*;
}

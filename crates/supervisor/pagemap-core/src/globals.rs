use log::Level;

/// Log settings. Targets used by the engines, for filtering in the installed logger.
pub const MAP_LOG_TARGET: &str = "map";
pub const PARSE_LOG_TARGET: &str = "parse";
pub const DEFAULT_LOG_LEVEL: Level = Level::Info;

/// Basic page length in x86_64 (4 KiB).
pub const BASE_PAGE_LENGTH: usize = 4096; // 4 KiB

/// Entries in one paging structure.
pub const ENTRIES_PER_TABLE: usize = 512;

/// Entries in the PAE page directory pointer table.
pub const PAE_PDPT_ENTRIES: usize = 4;

/// Alignment of a PAE root, which holds four 8-byte entries.
pub const PAE_ROOT_ALIGNMENT: u64 = 32;

/// MAXPHYADDR, which is at most 52; (use CPUID for finding system value).
pub const MAXPHYADDR: u64 = 52;

/// Mask to find the physical address of an entry in a page-table.
pub const ADDRESS_MASK: u64 = ((1 << MAXPHYADDR) - 1) & !0xfff;

const_assert!(BASE_PAGE_LENGTH * ENTRIES_PER_TABLE == 2 * 1024 * 1024);

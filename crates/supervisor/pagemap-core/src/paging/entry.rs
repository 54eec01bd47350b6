//! Raw IA-32e paging structure entries.
//!
//! The same 64-bit word is read three ways depending on where it sits:
//!
//! - a directory entry references a lower paging structure (PML5E, PML4E, and PDPTE/PDE
//!   with PS clear),
//! - a big leaf maps a 1 GiB or 2 MiB page (PDPTE/PDE with PS set), PAT at bit 12,
//! - a 4 KiB leaf maps a page (PTE), PAT at bit 7.
//!
//! All conversion between these layouts and [`MapAttribute`] happens here.

use pagemap_abi::mode::PagingLevel;
use paste::paste;

use super::attribute::{AttributeMask, MapAttribute, MapFlags};
use crate::{addr::PAddr, globals::ADDRESS_MASK};

macro_rules! check_flag {
    ($doc:meta, $flag:ident) => {
        paste! {
            #[$doc]
            #[inline]
            pub fn [< is_ $flag:lower >](self) -> bool {
                self.contains(Self::$flag)
            }
        }
    };
}

/// Copy the boolean fields selected by `$mask` from an attribute into an entry.
macro_rules! apply_masked {
    ($entry:expr, $attribute:expr, $mask:expr, $($flag:ident),+) => {
        $(
            if $mask.contains(AttributeMask::$flag) {
                $entry.set(Self::$flag, $attribute.contains(MapFlags::$flag));
            }
        )+
    };
}

bitflags! {
    /// An entry of any paging structure.
    #[derive(Default)]
    pub struct PageEntry: u64 {
        /// Present; must be 1 to map a page or reference a paging structure.
        const PRESENT         = bit!(0);
        /// Read/write; if 0, writes may not be allowed to the region controlled by this entry.
        const READ_WRITE      = bit!(1);
        /// User/supervisor; if 0, user-mode accesses are not allowed to the region.
        const USER_SUPERVISOR = bit!(2);
        /// Page-level write-through.
        const WRITE_THROUGH   = bit!(3);
        /// Page-level cache disable.
        const CACHE_DISABLE   = bit!(4);
        /// Accessed; indicates whether this entry has been used for linear-address translation.
        const ACCESSED        = bit!(5);
        /// Dirty; leaf only, indicates whether software has written to the page.
        const DIRTY           = bit!(6);
        /// Page size; in a PDPTE or PDE, set if the entry maps a 1 GiB or 2 MiB page.
        const PAGE_SIZE       = bit!(7);
        /// PAT index bit of a PTE, sharing the position of `PAGE_SIZE`.
        const PTE_PAT         = bit!(7);
        /// Global; leaf only, if CR4.PGE = 1 the translation is global.
        const GLOBAL          = bit!(8);
        /// PAT index bit of a 1 GiB or 2 MiB page.
        const LARGE_PAT       = bit!(12);
        /// Protection key; leaf only.
        const PROTECTION_KEY  = 0xf << 59;
        /// If IA32_EFER.NXE = 1, execute-disable.
        const EXECUTE_DISABLE = bit!(63);
    }
}

const PROTECTION_KEY_SHIFT: u64 = 59;

/// Bits that must be zero in a directory entry, indexed by level.
const DIRECTORY_RESERVED_BITS: [u64; 6] = [
    0,
    0,
    0,
    0,
    bit!(7), // PML4E: PS is reserved
    bit!(7), // PML5E: PS is reserved
];

/// Bits that must be zero in a leaf entry, indexed by level. With a 52-bit MAXPHYADDR
/// only the address bits below a big page's alignment are reserved.
const LEAF_RESERVED_BITS: [u64; 4] = [
    0,
    0,
    0x0000_0000_001f_e000, // 2 MiB page: bits 20:13
    0x0000_0000_3fff_e000, // 1 GiB page: bits 29:13
];

impl PageEntry {
    /// A directory entry referencing the table at `table`, present, writable and user
    /// accessible so that restrictions come from the entries below it.
    pub fn directory(table: PAddr) -> PageEntry {
        assert!(table.is_aligned(PagingLevel::Pte.region_length()));
        let mut entry = PageEntry::empty();
        entry.set_directory(&MapAttribute::permissive(), AttributeMask::all());
        entry.bits |= table.as_u64() & ADDRESS_MASK;
        entry
    }

    /// A leaf at `level` carrying every field of `attribute`.
    pub fn leaf(level: PagingLevel, attribute: &MapAttribute) -> PageEntry {
        let mut entry = PageEntry::empty();
        entry.set_leaf(level, 0, attribute, AttributeMask::all());
        entry
    }

    check_flag!(doc = "Is the entry present?", PRESENT);
    check_flag!(doc = "Are writes allowed through this entry?", READ_WRITE);
    check_flag!(doc = "Are user-mode accesses allowed through this entry?", USER_SUPERVISOR);
    check_flag!(doc = "Are instruction fetches disabled through this entry?", EXECUTE_DISABLE);

    /// Whether the entry maps a page rather than referencing another paging structure.
    pub fn is_leaf(self, level: PagingLevel) -> bool {
        match level {
            PagingLevel::Pte => true,
            PagingLevel::Pde | PagingLevel::Pdpte => self.contains(Self::PAGE_SIZE),
            PagingLevel::Pml4 | PagingLevel::Pml5 => false,
        }
    }

    /// Physical address of the paging structure a directory entry references.
    #[inline]
    pub fn table_address(self) -> PAddr {
        PAddr::new(self.bits & ADDRESS_MASK)
    }

    /// Physical address of the page a leaf at `level` maps.
    #[inline]
    pub fn page_address(self, level: PagingLevel) -> PAddr {
        PAddr::new(self.bits & Self::address_field(level))
    }

    /// Address bits of a leaf at `level`.
    #[inline]
    fn address_field(level: PagingLevel) -> u64 {
        ADDRESS_MASK & !(level.region_length() - 1)
    }

    /// Bit holding the PAT index of a leaf at `level`.
    #[inline]
    fn pat_flag(level: PagingLevel) -> PageEntry {
        if level == PagingLevel::Pte {
            Self::PTE_PAT
        } else {
            Self::LARGE_PAT
        }
    }

    /// Protection key of a leaf.
    #[inline]
    pub fn protection_key(self) -> u8 {
        ((self.bits & Self::PROTECTION_KEY.bits) >> PROTECTION_KEY_SHIFT) as u8
    }

    /// Reserved bits that are set, for an entry interpreted at `level`.
    pub fn reserved_bits(self, level: PagingLevel) -> u64 {
        let index = level as usize;
        if self.is_leaf(level) {
            self.bits & LEAF_RESERVED_BITS[index]
        } else {
            self.bits & DIRECTORY_RESERVED_BITS[index]
        }
    }

    /// Permission bits that accumulate down the hierarchy: an entry only grants what
    /// every ancestor grants, and any ancestor can forbid execution.
    fn inherited(self, parent: &MapAttribute) -> MapFlags {
        let mut flags = MapFlags::empty();
        flags.set(
            MapFlags::PRESENT,
            parent.contains(MapFlags::PRESENT) && self.is_present(),
        );
        flags.set(
            MapFlags::READ_WRITE,
            parent.contains(MapFlags::READ_WRITE) && self.is_read_write(),
        );
        flags.set(
            MapFlags::USER_SUPERVISOR,
            parent.contains(MapFlags::USER_SUPERVISOR) && self.is_user_supervisor(),
        );
        flags.set(
            MapFlags::EXECUTE_DISABLE,
            parent.contains(MapFlags::EXECUTE_DISABLE) || self.is_execute_disable(),
        );
        flags
    }

    /// Effective attribute of a directory entry under an ancestor attribute `parent`.
    pub fn directory_attribute(self, parent: &MapAttribute) -> MapAttribute {
        let mut flags = self.inherited(parent);
        flags.set(MapFlags::WRITE_THROUGH, self.contains(Self::WRITE_THROUGH));
        flags.set(MapFlags::CACHE_DISABLE, self.contains(Self::CACHE_DISABLE));
        flags.set(MapFlags::ACCESSED, self.contains(Self::ACCESSED));
        MapAttribute::new(flags, self.table_address())
    }

    /// Effective attribute of a leaf at `level` under an ancestor attribute `parent`.
    pub fn leaf_attribute(self, level: PagingLevel, parent: &MapAttribute) -> MapAttribute {
        let mut flags = self.inherited(parent);
        flags.set(MapFlags::WRITE_THROUGH, self.contains(Self::WRITE_THROUGH));
        flags.set(MapFlags::CACHE_DISABLE, self.contains(Self::CACHE_DISABLE));
        flags.set(MapFlags::ACCESSED, self.contains(Self::ACCESSED));
        flags.set(MapFlags::DIRTY, self.contains(Self::DIRTY));
        flags.set(MapFlags::GLOBAL, self.contains(Self::GLOBAL));
        flags.set(MapFlags::PAT, self.contains(Self::pat_flag(level)));
        MapAttribute::new(flags, self.page_address(level))
            .with_protection_key(self.protection_key())
    }

    /// Effective attribute of this entry at `level`, whichever layout it uses.
    pub fn merged_attribute(self, level: PagingLevel, parent: &MapAttribute) -> MapAttribute {
        if self.is_leaf(level) {
            self.leaf_attribute(level, parent)
        } else {
            self.directory_attribute(parent)
        }
    }

    /// Write the fields of `attribute` selected by `mask` into a directory entry. Fields
    /// that only exist in leaves and the table address are left alone.
    pub fn set_directory(&mut self, attribute: &MapAttribute, mask: AttributeMask) {
        apply_masked!(
            self,
            attribute,
            mask,
            PRESENT,
            READ_WRITE,
            USER_SUPERVISOR,
            WRITE_THROUGH,
            CACHE_DISABLE,
            ACCESSED,
            EXECUTE_DISABLE
        );
    }

    /// Write the fields of `attribute` selected by `mask` into a leaf at `level`. A masked
    /// base address writes `attribute.base_address() + offset` and marks a PDPTE or PDE
    /// as a page.
    pub fn set_leaf(
        &mut self,
        level: PagingLevel,
        offset: u64,
        attribute: &MapAttribute,
        mask: AttributeMask,
    ) {
        apply_masked!(
            self,
            attribute,
            mask,
            PRESENT,
            READ_WRITE,
            USER_SUPERVISOR,
            WRITE_THROUGH,
            CACHE_DISABLE,
            ACCESSED,
            DIRTY,
            GLOBAL,
            EXECUTE_DISABLE
        );

        if mask.contains(AttributeMask::PAT) {
            self.set(Self::pat_flag(level), attribute.contains(MapFlags::PAT));
        }

        if mask.contains(AttributeMask::PROTECTION_KEY) {
            self.bits = (self.bits & !Self::PROTECTION_KEY.bits)
                | ((attribute.protection_key() as u64) << PROTECTION_KEY_SHIFT);
        }

        if mask.contains(AttributeMask::BASE_ADDRESS) {
            let field = Self::address_field(level);
            let address = (attribute.base_address() + offset).as_u64();
            self.bits = (self.bits & !field) | (address & field);
            if level != PagingLevel::Pte {
                self.insert(Self::PAGE_SIZE);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1 << 30;

    #[test]
    fn test_leaf_discriminator() {
        let big = PageEntry::PRESENT | PageEntry::PAGE_SIZE;
        assert!(big.is_leaf(PagingLevel::Pde));
        assert!(big.is_leaf(PagingLevel::Pdpte));
        assert!(!big.is_leaf(PagingLevel::Pml4));
        assert!(PageEntry::empty().is_leaf(PagingLevel::Pte));
        assert!(!PageEntry::PRESENT.is_leaf(PagingLevel::Pde));
    }

    #[test]
    fn test_directory_entry() {
        let entry = PageEntry::directory(PAddr::new(0x7000));
        assert!(entry.is_present() && entry.is_read_write() && entry.is_user_supervisor());
        assert!(!entry.is_execute_disable());
        assert_eq!(entry.table_address(), PAddr::new(0x7000));
        assert_eq!(entry.bits(), 0x7007);
    }

    #[test]
    fn test_pat_position() {
        let attribute = MapAttribute::new(MapFlags::PRESENT | MapFlags::PAT, PAddr::new(GIB));

        let pte = PageEntry::leaf(PagingLevel::Pte, &attribute);
        assert!(pte.contains(PageEntry::PTE_PAT));
        assert!(!pte.contains(PageEntry::LARGE_PAT));

        let pdpte = PageEntry::leaf(PagingLevel::Pdpte, &attribute);
        assert_eq!(pdpte.bits(), GIB | bit!(12) | bit!(7) | bit!(0));
        assert_eq!(pdpte.page_address(PagingLevel::Pdpte), PAddr::new(GIB));
        assert_eq!(pdpte.reserved_bits(PagingLevel::Pdpte), 0);

        let back = pdpte.leaf_attribute(PagingLevel::Pdpte, &MapAttribute::permissive());
        assert_eq!(back, attribute);
    }

    #[test]
    fn test_protection_key_and_offset() {
        let attribute = MapAttribute::new(
            MapFlags::PRESENT | MapFlags::READ_WRITE | MapFlags::EXECUTE_DISABLE,
            PAddr::new(0x20_0000),
        )
        .with_protection_key(0xa);
        let mut entry = PageEntry::empty();
        entry.set_leaf(PagingLevel::Pte, 0x3000, &attribute, AttributeMask::all());

        assert_eq!(entry.page_address(PagingLevel::Pte), PAddr::new(0x20_3000));
        assert_eq!(entry.protection_key(), 0xa);
        assert!(entry.is_execute_disable());
        assert!(!entry.contains(PageEntry::PAGE_SIZE));
    }

    #[test]
    fn test_partial_mask_keeps_other_fields() {
        let attribute = MapAttribute::new(
            MapFlags::PRESENT | MapFlags::READ_WRITE | MapFlags::GLOBAL,
            PAddr::new(0x40_0000),
        );
        let mut entry = PageEntry::leaf(PagingLevel::Pde, &attribute);
        let readonly = MapAttribute::new(MapFlags::PRESENT, PAddr::new(0));
        entry.set_leaf(PagingLevel::Pde, 0, &readonly, AttributeMask::READ_WRITE);

        assert!(!entry.is_read_write());
        assert!(entry.contains(PageEntry::GLOBAL));
        assert_eq!(entry.page_address(PagingLevel::Pde), PAddr::new(0x40_0000));
    }

    #[test]
    fn test_inheritance() {
        let parent = MapAttribute::new(
            MapFlags::PRESENT | MapFlags::USER_SUPERVISOR | MapFlags::EXECUTE_DISABLE,
            PAddr::new(0),
        );
        let entry = PageEntry::leaf(
            PagingLevel::Pte,
            &MapAttribute::new(
                MapFlags::PRESENT | MapFlags::READ_WRITE | MapFlags::CACHE_DISABLE,
                PAddr::new(0x5000),
            ),
        );
        let merged = entry.merged_attribute(PagingLevel::Pte, &parent);

        assert!(merged.is_present());
        assert!(!merged.contains(MapFlags::READ_WRITE));
        assert!(!merged.contains(MapFlags::USER_SUPERVISOR));
        assert!(merged.contains(MapFlags::EXECUTE_DISABLE));
        assert!(merged.contains(MapFlags::CACHE_DISABLE));
        assert_eq!(merged.base_address(), PAddr::new(0x5000));
    }

    #[test]
    fn test_reserved_bits() {
        let mut entry = PageEntry::leaf(
            PagingLevel::Pde,
            &MapAttribute::new(MapFlags::PRESENT, PAddr::new(0x20_0000)),
        );
        entry.bits |= 0x2000;
        assert_eq!(entry.reserved_bits(PagingLevel::Pde), 0x2000);
        assert_eq!(entry.reserved_bits(PagingLevel::Pte), 0);

        let pml4e = PageEntry::PRESENT | PageEntry::PAGE_SIZE;
        assert_eq!(pml4e.reserved_bits(PagingLevel::Pml4), bit!(7));
    }
}

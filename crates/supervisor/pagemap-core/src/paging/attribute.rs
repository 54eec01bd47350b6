//! The level independent view of a mapping.
//!
//! A [`MapAttribute`] describes what an entry means regardless of where it sits in the
//! hierarchy; an [`AttributeMask`] says which of its fields an operation is allowed to
//! change. Only [`crate::paging::entry`] knows how either maps onto raw bits.

use getset::CopyGetters;

use crate::addr::PAddr;

bitflags! {
    /// Boolean fields of a mapping.
    #[derive(Default)]
    pub struct MapFlags: u64 {
        /// The translation exists.
        const PRESENT         = bit!(0);
        /// Writes are allowed.
        const READ_WRITE      = bit!(1);
        /// User-mode accesses are allowed.
        const USER_SUPERVISOR = bit!(2);
        /// Page-level write-through.
        const WRITE_THROUGH   = bit!(3);
        /// Page-level cache disable.
        const CACHE_DISABLE   = bit!(4);
        /// Accessed.
        const ACCESSED        = bit!(5);
        /// Dirty.
        const DIRTY           = bit!(6);
        /// Page attribute table index bit.
        const PAT             = bit!(7);
        /// Global translation.
        const GLOBAL          = bit!(8);
        /// Instruction fetches are not allowed.
        const EXECUTE_DISABLE = bit!(63);
    }
}

bitflags! {
    /// Selects the fields of a [`MapAttribute`] an operation applies.
    ///
    /// A set bit makes the corresponding attribute field authoritative; a clear bit
    /// keeps whatever value is already in effect for the entry being edited.
    pub struct AttributeMask: u64 {
        const PRESENT         = bit!(0);
        const READ_WRITE      = bit!(1);
        const USER_SUPERVISOR = bit!(2);
        const WRITE_THROUGH   = bit!(3);
        const CACHE_DISABLE   = bit!(4);
        const ACCESSED        = bit!(5);
        const DIRTY           = bit!(6);
        const PAT             = bit!(7);
        const GLOBAL          = bit!(8);
        const BASE_ADDRESS    = bit!(12);
        const PROTECTION_KEY  = bit!(59);
        const EXECUTE_DISABLE = bit!(63);
    }
}

impl AttributeMask {
    /// The boolean fields covered by this mask.
    #[inline]
    pub fn flags(self) -> MapFlags {
        MapFlags::from_bits_truncate(self.bits())
    }
}

/// Attributes of a mapping, independent of the level storing them.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct MapAttribute {
    /// Permission, caching and status bits.
    flags: MapFlags,
    /// Physical address the first byte of the range maps to.
    base_address: PAddr,
    /// Protection key, 4 bits.
    protection_key: u8,
}

impl MapAttribute {
    /// An attribute mapping to `base_address` with the given flags and protection key 0.
    pub const fn new(flags: MapFlags, base_address: PAddr) -> Self {
        Self {
            flags,
            base_address,
            protection_key: 0,
        }
    }

    /// The same attribute with protection key `key` (only the low 4 bits are kept).
    pub const fn with_protection_key(mut self, key: u8) -> Self {
        self.protection_key = key & 0xf;
        self
    }

    /// The same attribute mapping to `base_address`.
    pub const fn with_base_address(mut self, base_address: PAddr) -> Self {
        self.base_address = base_address;
        self
    }

    /// Present, writable and user accessible with nothing else set. Directories carry
    /// this so that restrictions are expressed by their descendants.
    pub const fn permissive() -> Self {
        Self::new(
            MapFlags::from_bits_truncate(
                MapFlags::PRESENT.bits()
                    | MapFlags::READ_WRITE.bits()
                    | MapFlags::USER_SUPERVISOR.bits(),
            ),
            PAddr::new(0),
        )
    }

    #[inline]
    pub fn is_present(&self) -> bool {
        self.flags.contains(MapFlags::PRESENT)
    }

    #[inline]
    pub fn contains(&self, flags: MapFlags) -> bool {
        self.flags.contains(flags)
    }

    /// Compare the fields selected by `mask`, leaving out the base address.
    pub fn matches(&self, other: &MapAttribute, mask: AttributeMask) -> bool {
        let flags = mask.flags();
        (self.flags & flags) == (other.flags & flags)
            && (!mask.contains(AttributeMask::PROTECTION_KEY)
                || self.protection_key == other.protection_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_flags() {
        let mask = AttributeMask::READ_WRITE
            | AttributeMask::BASE_ADDRESS
            | AttributeMask::EXECUTE_DISABLE;
        assert_eq!(mask.flags(), MapFlags::READ_WRITE | MapFlags::EXECUTE_DISABLE);
        assert_eq!(AttributeMask::all().flags(), MapFlags::all());
    }

    #[test]
    fn test_matches() {
        let rw = MapAttribute::new(MapFlags::PRESENT | MapFlags::READ_WRITE, PAddr::new(0));
        let ro = MapAttribute::new(MapFlags::PRESENT, PAddr::new(0x1000));

        assert!(rw.matches(&ro, AttributeMask::PRESENT | AttributeMask::BASE_ADDRESS));
        assert!(!rw.matches(&ro, AttributeMask::READ_WRITE));
        assert!(rw.matches(&rw.with_protection_key(3), AttributeMask::READ_WRITE));
        assert!(!rw.matches(&rw.with_protection_key(3), AttributeMask::all()));
    }

    #[test]
    fn test_permissive() {
        let nop = MapAttribute::permissive();
        assert!(nop.is_present());
        assert!(nop.contains(MapFlags::READ_WRITE | MapFlags::USER_SUPERVISOR));
        assert!(!nop.contains(MapFlags::EXECUTE_DISABLE));
        assert_eq!(nop.with_protection_key(0x1f).protection_key(), 0xf);
    }
}

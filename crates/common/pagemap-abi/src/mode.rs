//! Paging modes and the levels of a paging hierarchy.

/// Level of a paging structure. The ordinal equals the hardware level: a `Pte` maps
/// 4 KiB, a `Pml5` entry spans 256 TiB.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum PagingLevel {
    /// Page table, entries map 4 KiB pages.
    Pte = 1,
    /// Page directory, entries map 2 MiB pages or reference a page table.
    Pde = 2,
    /// Page directory pointer table, entries map 1 GiB pages or reference a directory.
    Pdpte = 3,
    /// Page map level 4.
    Pml4 = 4,
    /// Page map level 5.
    Pml5 = 5,
}

assert_eq_size!(PagingLevel, u8);
const_assert!(PagingLevel::Pte.region_length() == 0x1000);
const_assert!(PagingLevel::Pml5.region_length() == 1 << 48);

impl PagingLevel {
    /// Bit position of the lowest linear address bit that selects an entry at this level.
    #[inline]
    pub const fn shift(self) -> u32 {
        (self as u32) * 9 + 3
    }

    /// Bytes of linear address space covered by one entry at this level.
    #[inline]
    pub const fn region_length(self) -> u64 {
        1 << self.shift()
    }

    /// Index of the entry translating `address` in a table of this level.
    #[inline]
    pub const fn index_of(self, address: u64) -> usize {
        ((address >> self.shift()) & 0x1ff) as usize
    }

    /// The next level towards the leaves, `None` for `Pte`.
    pub const fn lower(self) -> Option<Self> {
        match self {
            Self::Pte => None,
            Self::Pde => Some(Self::Pte),
            Self::Pdpte => Some(Self::Pde),
            Self::Pml4 => Some(Self::Pdpte),
            Self::Pml5 => Some(Self::Pml4),
        }
    }
}

/// Paging mode selected by CR0, CR4 and EFER.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PagingMode {
    /// Legacy 32-bit paging with 4-byte entries.
    Paging32Bit,
    /// PAE paging: 4-entry PDPT root, 2 MiB max page.
    Pae,
    /// 4-level paging, 2 MiB max page.
    Paging4Level,
    /// 4-level paging with 1 GiB pages.
    Paging4Level1Gb,
    /// 5-level paging, 2 MiB max page.
    Paging5Level,
    /// 5-level paging with 1 GiB pages.
    Paging5Level1Gb,
}

impl PagingMode {
    /// Level of the root table.
    pub const fn max_level(self) -> PagingLevel {
        match self {
            Self::Paging32Bit => PagingLevel::Pde,
            Self::Pae => PagingLevel::Pdpte,
            Self::Paging4Level | Self::Paging4Level1Gb => PagingLevel::Pml4,
            Self::Paging5Level | Self::Paging5Level1Gb => PagingLevel::Pml5,
        }
    }

    /// Highest level at which an entry may map a page.
    pub const fn max_leaf_level(self) -> PagingLevel {
        match self {
            Self::Paging4Level1Gb | Self::Paging5Level1Gb => PagingLevel::Pdpte,
            _ => PagingLevel::Pde,
        }
    }

    /// Width of the linear address space translated in this mode.
    pub const fn linear_address_bits(self) -> u32 {
        match self {
            Self::Paging32Bit | Self::Pae => 32,
            _ => self.max_level().shift() + 9,
        }
    }

    /// Whether entries use the 64-bit IA-32e layout at every level.
    pub const fn is_ia32e(self) -> bool {
        !matches!(self, Self::Paging32Bit | Self::Pae)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_lengths() {
        assert_eq!(PagingLevel::Pte.region_length(), 4 << 10);
        assert_eq!(PagingLevel::Pde.region_length(), 2 << 20);
        assert_eq!(PagingLevel::Pdpte.region_length(), 1 << 30);
        assert_eq!(PagingLevel::Pml4.region_length(), 512 << 30);
        assert_eq!(PagingLevel::Pml5.region_length(), 256 << 40);
    }

    #[test]
    fn test_index_of() {
        let address = 0x0000_7fff_ffe0_1000;
        assert_eq!(PagingLevel::Pml4.index_of(address), 255);
        assert_eq!(PagingLevel::Pdpte.index_of(address), 511);
        assert_eq!(PagingLevel::Pde.index_of(address), 511);
        assert_eq!(PagingLevel::Pte.index_of(address), 1);
    }

    #[test]
    fn test_level_walk() {
        let mut level = PagingLevel::Pml5;
        let mut count = 1;
        while let Some(lower) = level.lower() {
            assert_eq!(lower.region_length() * 512, level.region_length());
            level = lower;
            count += 1;
        }
        assert_eq!(level, PagingLevel::Pte);
        assert_eq!(count, 5);
    }

    #[test]
    fn test_modes() {
        assert_eq!(PagingMode::Paging4Level.linear_address_bits(), 48);
        assert_eq!(PagingMode::Paging5Level1Gb.linear_address_bits(), 57);
        assert_eq!(PagingMode::Paging4Level.max_leaf_level(), PagingLevel::Pde);
        assert_eq!(PagingMode::Paging4Level1Gb.max_leaf_level(), PagingLevel::Pdpte);
        assert!(!PagingMode::Pae.is_ia32e());
        assert!(PagingMode::Paging5Level.is_ia32e());
    }
}

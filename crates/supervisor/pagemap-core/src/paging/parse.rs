//! Reading a table back as a list of regions.

use alloc::{vec, vec::Vec};

use getset::CopyGetters;
use pagemap_abi::{
    errors::PagingErrors,
    mode::{PagingLevel, PagingMode},
};

use super::{attribute::MapAttribute, pae_pdpt};
use crate::{
    addr::{PAddr, VAddr},
    globals::{BASE_PAGE_LENGTH, PAE_ROOT_ALIGNMENT, PARSE_LOG_TARGET},
    memory::PhysMemory,
};

/// A run of linear addresses translated with one attribute. The physical address of
/// each byte is `attribute.base_address()` plus its distance from `linear_address`.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct MapRegion {
    linear_address: VAddr,
    length: u64,
    attribute: MapAttribute,
}

impl MapRegion {
    pub const fn new(linear_address: VAddr, length: u64, attribute: MapAttribute) -> Self {
        Self {
            linear_address,
            length,
            attribute,
        }
    }

    /// Grow the region by `next` if `next` continues it both linearly and physically
    /// with the same attribute.
    fn try_extend(&mut self, next: &MapRegion) -> bool {
        let linear_end = self.linear_address + self.length;
        let physical_end = self.attribute.base_address() + self.length;
        let continued = self.attribute.with_base_address(physical_end);

        if linear_end == next.linear_address && continued == next.attribute {
            self.length += next.length;
            true
        } else {
            false
        }
    }
}

struct Parser<'a, 'r, M> {
    memory: &'a M,
    regions: &'r mut [MapRegion],
    /// Regions found so far, including those that did not fit.
    count: usize,
    last: Option<MapRegion>,
}

impl<'a, 'r, M: PhysMemory> Parser<'a, 'r, M> {
    fn emit(&mut self, region: MapRegion) {
        if let Some(last) = self.last.as_mut() {
            if last.try_extend(&region) {
                if let Some(slot) = self.regions.get_mut(self.count - 1) {
                    *slot = *last;
                }
                return;
            }
        }

        if let Some(slot) = self.regions.get_mut(self.count) {
            *slot = region;
        }
        self.count += 1;
        self.last = Some(region);
    }

    /// Walk the structure at `table` of `level`, which translates linear addresses from
    /// `linear_base` on under the ancestor attribute `inherited`.
    fn walk(
        &mut self,
        table: PAddr,
        level: PagingLevel,
        linear_base: u64,
        inherited: MapAttribute,
    ) {
        let memory = self.memory;
        let region_length = level.region_length();

        for (index, entry) in memory.table(table).iter().enumerate() {
            if !entry.is_present() {
                continue;
            }

            let reserved = entry.reserved_bits(level);
            if reserved != 0 {
                debug_panic!(
                    "{:?} entry {:#x} at {:#x} has reserved bits {:#x} set",
                    level,
                    entry.bits(),
                    table + (index * 8) as u64,
                    reserved
                );
            }

            let linear = linear_base + index as u64 * region_length;
            match level.lower() {
                Some(lower) if !entry.is_leaf(level) => {
                    self.walk(
                        entry.table_address(),
                        lower,
                        linear,
                        entry.directory_attribute(&inherited),
                    );
                }
                _ => self.emit(MapRegion::new(
                    VAddr::new(linear),
                    region_length,
                    entry.leaf_attribute(level, &inherited),
                )),
            }
        }
    }

    /// Walk a PAE table. The root is a 4-entry PDPT which need not start a page.
    fn walk_pae(&mut self, root: PAddr) {
        let pdpt = pae_pdpt(self.memory, root);

        for (index, entry) in pdpt.iter().enumerate() {
            if !entry.is_present() {
                continue;
            }
            // PDPTEs carry no access rights, everything below them is governed by the
            // page directories.
            self.walk(
                entry.table_address(),
                PagingLevel::Pde,
                index as u64 * PagingLevel::Pdpte.region_length(),
                MapAttribute::permissive(),
            );
        }
    }
}

/// Describe the translations of the table at `root` as regions in ascending linear order.
///
/// Adjacent pages merge into one region when they are contiguous both linearly and
/// physically and share every other attribute field. Returns the number of regions; if
/// that exceeds `regions.len()`, the leading regions are filled in and
/// [`PagingErrors::BufferTooSmall`] carries the full count.
pub fn parse<M: PhysMemory>(
    memory: &M,
    root: Option<PAddr>,
    mode: PagingMode,
    regions: &mut [MapRegion],
) -> Result<usize, PagingErrors> {
    if mode == PagingMode::Paging32Bit {
        return Err(PagingErrors::Unsupported);
    }

    let capacity = regions.len();
    let mut parser = Parser {
        memory,
        regions,
        count: 0,
        last: None,
    };

    match root {
        None => {}
        Some(root) if mode == PagingMode::Pae => {
            if !root.is_aligned(PAE_ROOT_ALIGNMENT) {
                return Err(PagingErrors::InvalidParameter);
            }
            parser.walk_pae(root);
        }
        Some(root) => {
            if !root.is_aligned(BASE_PAGE_LENGTH as u64) {
                return Err(PagingErrors::InvalidParameter);
            }
            parser.walk(root, mode.max_level(), 0, MapAttribute::permissive());
        }
    }

    let count = parser.count;
    trace!(
        target: PARSE_LOG_TARGET,
        "Parsed {:?} table at {:#x}: {} regions",
        mode,
        root.unwrap_or_default(),
        count
    );

    if count > capacity {
        return Err(PagingErrors::BufferTooSmall { required: count });
    }
    Ok(count)
}

/// [`parse`] into a vector sized to fit.
pub fn parse_to_vec<M: PhysMemory>(
    memory: &M,
    root: Option<PAddr>,
    mode: PagingMode,
) -> Result<Vec<MapRegion>, PagingErrors> {
    let required = match parse(memory, root, mode, &mut []) {
        Ok(count) => count,
        Err(PagingErrors::BufferTooSmall { required }) => required,
        Err(error) => return Err(error),
    };

    let mut regions = vec![MapRegion::default(); required];
    let count = parse(memory, root, mode, &mut regions)?;
    regions.truncate(count);
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        memory::PageArena,
        paging::{attribute::MapFlags, entry::PageEntry, PageTable},
    };

    const MIB: u64 = 1 << 20;

    fn flags() -> MapFlags {
        MapFlags::PRESENT | MapFlags::READ_WRITE
    }

    #[test]
    fn test_extend() {
        let attribute = MapAttribute::new(flags(), PAddr::new(0x4000));
        let mut region = MapRegion::new(VAddr::new(0x1000), 0x1000, attribute);

        let next = MapRegion::new(
            VAddr::new(0x2000),
            0x1000,
            attribute.with_base_address(PAddr::new(0x5000)),
        );
        assert!(region.try_extend(&next));
        assert_eq!(region.length(), 0x2000);

        // Linearly contiguous but physically not.
        let jump = MapRegion::new(
            VAddr::new(0x3000),
            0x1000,
            attribute.with_base_address(PAddr::new(0x9000)),
        );
        assert!(!region.try_extend(&jump));

        // Contiguous with a different caching attribute.
        let uncached = MapRegion::new(
            VAddr::new(0x3000),
            0x1000,
            MapAttribute::new(flags() | MapFlags::CACHE_DISABLE, PAddr::new(0x6000)),
        );
        assert!(!region.try_extend(&uncached));
    }

    #[test]
    fn test_absent_root() {
        let arena = PageArena::new();
        assert_eq!(parse(&arena, None, PagingMode::Paging4Level, &mut []), Ok(0));
        assert_eq!(
            parse(&arena, None, PagingMode::Paging32Bit, &mut []),
            Err(PagingErrors::Unsupported)
        );
    }

    #[test]
    fn test_hand_built_table() {
        let mut arena = PageArena::new();
        let pml4 = arena.allocate_table();
        let pdpt = arena.allocate_table();
        let pd = arena.allocate_table();

        arena.table_mut(pml4)[0] = PageEntry::directory(pdpt);
        arena.table_mut(pdpt)[0] = PageEntry::directory(pd);
        {
            let pd: &mut PageTable = arena.table_mut(pd);
            let leaf = |bits, base| {
                PageEntry::leaf(PagingLevel::Pde, &MapAttribute::new(bits, base))
            };
            pd[0] = leaf(flags(), PAddr::new(0));
            pd[1] = leaf(flags(), PAddr::new(2 * MIB));
            pd[3] = leaf(MapFlags::PRESENT, PAddr::new(6 * MIB));
        }

        let mut regions = [MapRegion::default(); 1];
        assert_eq!(
            parse(&arena, Some(pml4), PagingMode::Paging4Level, &mut regions),
            Err(PagingErrors::BufferTooSmall { required: 2 })
        );
        assert_eq!(regions[0].length(), 4 * MIB);

        let regions = parse_to_vec(&arena, Some(pml4), PagingMode::Paging4Level).unwrap();
        assert_eq!(
            regions,
            vec![
                MapRegion::new(VAddr::new(0), 4 * MIB, MapAttribute::new(flags(), PAddr::new(0))),
                MapRegion::new(
                    VAddr::new(6 * MIB),
                    2 * MIB,
                    MapAttribute::new(MapFlags::PRESENT, PAddr::new(6 * MIB))
                ),
            ]
        );
    }

    #[test]
    fn test_pae_root_inside_page() {
        let mut arena = PageArena::new();
        let page = arena.allocate_table();
        let pd = arena.allocate_table();
        let root = page + 0x20;

        // PDPTE 1 of the root is entry 5 of the page. Bits 1 and 2 are reserved there.
        let mut pdpte = PageEntry::directory(pd);
        pdpte.remove(PageEntry::READ_WRITE | PageEntry::USER_SUPERVISOR);
        arena.table_mut(page)[5] = pdpte;
        arena.table_mut(pd)[0] = PageEntry::leaf(
            PagingLevel::Pde,
            &MapAttribute::new(MapFlags::PRESENT | MapFlags::EXECUTE_DISABLE, PAddr::new(0)),
        );

        let regions = parse_to_vec(&arena, Some(root), PagingMode::Pae).unwrap();
        assert_eq!(
            regions,
            vec![MapRegion::new(
                VAddr::new(1 << 30),
                2 * MIB,
                MapAttribute::new(MapFlags::PRESENT | MapFlags::EXECUTE_DISABLE, PAddr::new(0)),
            )]
        );

        assert_eq!(
            parse(&arena, Some(page + 0x8), PagingMode::Pae, &mut []),
            Err(PagingErrors::InvalidParameter)
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "reserved bits")]
    fn test_reserved_bits_are_fatal() {
        let mut arena = PageArena::new();
        let pml4 = arena.allocate_table();
        arena.table_mut(pml4)[0] = PageEntry::PRESENT | PageEntry::PAGE_SIZE;
        let _ = parse(&arena, Some(pml4), PagingMode::Paging4Level, &mut []);
    }
}

//! Creating and updating mappings.
//!
//! A map runs twice over the same algorithm. The plan pass only reads the table and
//! counts the paging structures the edit needs; the commit pass performs it, carving
//! those structures from the caller's [`PageBuffer`]. All parameter errors surface in the
//! plan pass, so a commit never stops half way.

use core::cmp::min;

use getset::CopyGetters;
use pagemap_abi::{
    errors::PagingErrors,
    mode::{PagingLevel, PagingMode},
};
use pagemap_utils::align::{align_down, is_aligned};

use super::{
    attribute::{AttributeMask, MapAttribute, MapFlags},
    entry::PageEntry,
};
use crate::{
    addr::{PAddr, VAddr},
    globals::{BASE_PAGE_LENGTH, ENTRIES_PER_TABLE, MAP_LOG_TARGET, MAXPHYADDR},
    memory::{PageBuffer, PhysMemory},
};

/// A range of linear addresses and the attribute to apply to it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct MapRequest {
    /// First linear address, 4 KiB aligned.
    linear_address: VAddr,
    /// Length in bytes, a multiple of 4 KiB.
    length: u64,
    /// Attribute for the first page of the range. Following pages map consecutive
    /// physical addresses.
    attribute: MapAttribute,
    /// Fields of `attribute` to apply.
    mask: AttributeMask,
}

impl MapRequest {
    pub const fn new(
        linear_address: VAddr,
        length: u64,
        attribute: MapAttribute,
        mask: AttributeMask,
    ) -> Self {
        Self {
            linear_address,
            length,
            attribute,
            mask,
        }
    }

    /// Whether the request removes translations.
    fn unmaps(&self) -> bool {
        self.mask.contains(AttributeMask::PRESENT) && !self.attribute.is_present()
    }

    /// A translation created where none existed must be fully described.
    fn check_new_translation(&self) -> Result<(), PagingErrors> {
        if self.unmaps() || self.mask == AttributeMask::all() {
            Ok(())
        } else {
            Err(PagingErrors::InvalidParameter)
        }
    }
}

/// Outcome of a successful [`map`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Mapping {
    /// Root of the table. `None` only if no root was given and none was needed.
    root: Option<PAddr>,
    /// Whether any entry changed. When false no TLB invalidation is needed.
    modified: bool,
    /// Bytes of the page buffer linked into the table.
    used: usize,
}

/// Where the entries of a paging structure come from.
#[derive(Debug, Copy, Clone)]
enum Directory {
    /// A structure in memory.
    Table(PAddr),
    /// A structure the commit pass will create with every entry absent.
    Absent,
    /// A structure the commit pass will create by splitting a page. Entry `i` maps
    /// `attribute` moved `i` regions of `level` further.
    Split {
        attribute: MapAttribute,
        level: PagingLevel,
    },
}

enum Access<'a, M> {
    Plan(&'a M),
    Commit(&'a mut M),
}

struct Mapper<'a, M> {
    memory: Access<'a, M>,
    buffer: PageBuffer,
    request: MapRequest,
    max_level: PagingLevel,
    max_leaf_level: PagingLevel,
    /// Bytes of paging structures created so far.
    required: usize,
    modified: bool,
}

/// Fill the entries of a structure that replaces a page, so that every address keeps its
/// translation.
fn split_entry(attribute: &MapAttribute, level: PagingLevel, index: usize) -> PageEntry {
    let base = attribute.base_address() + index as u64 * level.region_length();
    PageEntry::leaf(level, &attribute.with_base_address(base))
}

impl<'a, M: PhysMemory> Mapper<'a, M> {
    fn new(
        memory: Access<'a, M>,
        buffer: PageBuffer,
        request: MapRequest,
        mode: PagingMode,
    ) -> Self {
        Self {
            memory,
            buffer,
            request,
            max_level: mode.max_level(),
            max_leaf_level: mode.max_leaf_level(),
            required: 0,
            modified: false,
        }
    }

    fn committing(&self) -> bool {
        matches!(self.memory, Access::Commit(_))
    }

    fn read(&self, directory: &Directory, index: usize) -> PageEntry {
        match *directory {
            Directory::Table(paddr) => match &self.memory {
                Access::Plan(memory) => memory.table(paddr)[index],
                Access::Commit(memory) => memory.table(paddr)[index],
            },
            Directory::Absent => PageEntry::empty(),
            Directory::Split { attribute, level } => split_entry(&attribute, level, index),
        }
    }

    fn write(&mut self, directory: &Directory, index: usize, entry: PageEntry) {
        if let (Access::Commit(memory), Directory::Table(paddr)) = (&mut self.memory, directory) {
            memory.table_mut(*paddr)[index] = entry;
        }
    }

    /// Run the request against the table at `root`, returning the root afterwards.
    fn run(&mut self, root: Option<PAddr>) -> Result<Option<PAddr>, PagingErrors> {
        if self.request.length == 0 {
            return Ok(root);
        }

        // Stands in for CR3: a permissive directory entry referencing the root.
        let mut top = root.map_or(PageEntry::empty(), PageEntry::directory);
        self.map_level(&mut top, None, MapAttribute::permissive(), self.max_level, 0)?;

        if top.is_present() {
            Ok(Some(top.table_address()))
        } else {
            Ok(None)
        }
    }

    /// Apply the request to the part of the range below `parent`, starting `offset` bytes
    /// into the range. `parent` sits at `parent_level` (`None` for the root) and its
    /// entries are at `level`. `inherited` is the effective attribute above `parent`.
    fn map_level(
        &mut self,
        parent: &mut PageEntry,
        parent_level: Option<PagingLevel>,
        inherited: MapAttribute,
        level: PagingLevel,
        offset: u64,
    ) -> Result<(), PagingErrors> {
        let request = self.request;
        let linear = request.linear_address.as_u64() + offset;
        let page_level = parent_level.filter(|&upper| parent.is_present() && parent.is_leaf(upper));

        let directory = if !parent.is_present() {
            request.check_new_translation()?;
            if request.unmaps() {
                // Nothing is mapped here to begin with.
                return Ok(());
            }
            self.create_directory(parent, level, None)?
        } else if let Some(upper) = page_level {
            let page = parent.leaf_attribute(upper, &inherited);
            let page_start = align_down(linear, upper.region_length());
            if self.page_satisfies(&page, linear - page_start, offset) {
                return Ok(());
            }
            if self.committing() {
                debug!(
                    target: MAP_LOG_TARGET,
                    "Split {:?} page at {:#x} mapping {:#x}",
                    upper,
                    page_start,
                    page.base_address()
                );
            }
            self.create_directory(parent, level, Some(page))?
        } else {
            self.loosen(parent, level);
            Directory::Table(parent.table_address())
        };

        let inherited = parent.directory_attribute(&inherited);
        let region_length = level.region_length();
        let mut index = level.index_of(linear);
        let mut region_start = align_down(linear, region_length);
        let mut offset = offset;

        while offset < request.length && index < ENTRIES_PER_TABLE {
            let current = request.linear_address.as_u64() + offset;
            let sub_length = min(
                request.length - offset,
                region_start + region_length - current,
            );
            let mut entry = self.read(&directory, index);

            if self.fits_leaf(entry, level, current, offset, sub_length) {
                self.write_leaf(&directory, index, entry, level, offset)?;
            } else {
                let lower = level.lower().ok_or(PagingErrors::InvalidParameter)?;
                self.map_level(&mut entry, Some(level), inherited, lower, offset)?;
                self.write(&directory, index, entry);
            }

            offset += sub_length;
            index += 1;
            region_start += region_length;
        }

        Ok(())
    }

    /// Link a new paging structure for `level` into `parent`. Without `page` the structure
    /// starts empty; with it, the structure takes over the page `parent` mapped.
    fn create_directory(
        &mut self,
        parent: &mut PageEntry,
        level: PagingLevel,
        page: Option<MapAttribute>,
    ) -> Result<Directory, PagingErrors> {
        self.required += BASE_PAGE_LENGTH;

        let memory = match &mut self.memory {
            Access::Plan(_) => {
                return Ok(match page {
                    Some(attribute) => Directory::Split { attribute, level },
                    None => Directory::Absent,
                });
            }
            Access::Commit(memory) => memory,
        };

        // The plan pass sized the buffer, so this only fails if the table changed since.
        let paddr = self
            .buffer
            .take_page()
            .ok_or(PagingErrors::BufferTooSmall {
                required: self.required,
            })?;
        trace!(target: MAP_LOG_TARGET, "New {:?} table at {:#x}", level, paddr);

        let table = memory.table_mut(paddr);
        table.clear();
        if let Some(attribute) = page {
            for (index, entry) in table.iter_mut().enumerate() {
                *entry = split_entry(&attribute, level, index);
            }
        }

        *parent = PageEntry::directory(paddr);
        self.modified = true;
        Ok(Directory::Table(paddr))
    }

    /// Whether the page described by `page` already maps the request's range the way the
    /// request asks. `page_offset` is the distance of the range's current start from the
    /// page start.
    fn page_satisfies(&self, page: &MapAttribute, page_offset: u64, offset: u64) -> bool {
        let request = &self.request;
        page.matches(&request.attribute, request.mask)
            && (!request.mask.contains(AttributeMask::BASE_ADDRESS)
                || page.base_address() + page_offset == request.attribute.base_address() + offset)
    }

    /// Whether the slot `entry` at `level` can take the range `[linear, linear + length)`
    /// as one leaf.
    fn fits_leaf(
        &self,
        entry: PageEntry,
        level: PagingLevel,
        linear: u64,
        offset: u64,
        length: u64,
    ) -> bool {
        let region_length = level.region_length();
        let request = &self.request;

        // The base address is only meaningful, and only range checked, when masked.
        level <= self.max_leaf_level
            && length == region_length
            && is_aligned(linear, region_length)
            && (!request.mask.contains(AttributeMask::BASE_ADDRESS)
                || (request.attribute.base_address() + offset).is_aligned(region_length))
            && (!entry.is_present() || entry.is_leaf(level))
    }

    fn write_leaf(
        &mut self,
        directory: &Directory,
        index: usize,
        entry: PageEntry,
        level: PagingLevel,
        offset: u64,
    ) -> Result<(), PagingErrors> {
        let request = self.request;
        let mut updated = entry;

        if !entry.is_present() {
            request.check_new_translation()?;
            if request.unmaps() {
                return Ok(());
            }
            updated = PageEntry::empty();
        }

        updated.set_leaf(level, offset, &request.attribute, request.mask);
        if updated != entry && self.committing() {
            self.modified = true;
            self.write(directory, index, updated);
        }
        Ok(())
    }

    /// Grant through `parent` what the request grants, when `parent` currently forbids it.
    /// The restriction `parent` expressed is pushed onto every present entry below it so
    /// the rest of its region keeps its effective attributes.
    fn loosen(&mut self, parent: &mut PageEntry, level: PagingLevel) {
        let attribute = self.request.attribute;
        let mask = self.request.mask;
        let mut restricted = AttributeMask::empty();
        let mut restriction = MapFlags::empty();

        if mask.contains(AttributeMask::READ_WRITE)
            && attribute.contains(MapFlags::READ_WRITE)
            && !parent.is_read_write()
        {
            restricted |= AttributeMask::READ_WRITE;
        }
        if mask.contains(AttributeMask::USER_SUPERVISOR)
            && attribute.contains(MapFlags::USER_SUPERVISOR)
            && !parent.is_user_supervisor()
        {
            restricted |= AttributeMask::USER_SUPERVISOR;
        }
        if mask.contains(AttributeMask::EXECUTE_DISABLE)
            && !attribute.contains(MapFlags::EXECUTE_DISABLE)
            && parent.is_execute_disable()
        {
            restricted |= AttributeMask::EXECUTE_DISABLE;
            restriction |= MapFlags::EXECUTE_DISABLE;
        }

        if restricted.is_empty() {
            return;
        }

        // The plan pass leaves the restriction on `parent`; the effective attribute of
        // every entry below is the same either way.
        let memory = match &mut self.memory {
            Access::Plan(_) => return,
            Access::Commit(memory) => memory,
        };

        let table = parent.table_address();
        debug!(
            target: MAP_LOG_TARGET,
            "Loosen {:?} on {:?} table at {:#x}",
            restricted,
            level,
            table
        );

        parent.set_directory(&attribute, restricted);
        let restriction = MapAttribute::new(restriction, PAddr::new(0));
        for entry in memory.table_mut(table).iter_mut() {
            if !entry.is_present() {
                continue;
            }
            if entry.is_leaf(level) {
                entry.set_leaf(level, 0, &restriction, restricted);
            } else {
                entry.set_directory(&restriction, restricted);
            }
        }
        self.modified = true;
    }
}

fn check_request(
    mode: PagingMode,
    root: Option<PAddr>,
    request: &MapRequest,
) -> Result<(), PagingErrors> {
    if !mode.is_ia32e() {
        return Err(PagingErrors::Unsupported);
    }

    let page = BASE_PAGE_LENGTH as u64;
    let linear = request.linear_address.as_u64();
    let linear_end = 1u64 << mode.linear_address_bits();
    if !is_aligned(linear, page)
        || !is_aligned(request.length, page)
        || linear > linear_end
        || request.length > linear_end - linear
    {
        return Err(PagingErrors::InvalidParameter);
    }

    if root.map_or(false, |root| !root.is_aligned(page)) {
        return Err(PagingErrors::InvalidParameter);
    }

    if request.mask.contains(AttributeMask::BASE_ADDRESS) {
        let base = request.attribute.base_address().as_u64();
        let physical_end = 1u64 << MAXPHYADDR;
        if !is_aligned(base, page) || base > physical_end || request.length > physical_end - base {
            return Err(PagingErrors::InvalidParameter);
        }
    }

    // Fields of a non-present entry mean nothing, so an unmap may not set them.
    if request.unmaps() && request.mask != AttributeMask::PRESENT {
        return Err(PagingErrors::InvalidParameter);
    }

    Ok(())
}

/// Bytes of page buffer [`map`] needs to apply `request` to the table at `root`.
///
/// Only reads the table. Zero means the request only rewrites existing entries.
pub fn required_buffer_size<M: PhysMemory>(
    memory: &M,
    root: Option<PAddr>,
    mode: PagingMode,
    request: &MapRequest,
) -> Result<usize, PagingErrors> {
    check_request(mode, root, request)?;

    let mut planner = Mapper::new(Access::Plan(memory), PageBuffer::empty(), *request, mode);
    planner.run(root)?;
    Ok(planner.required)
}

/// Map `request` into the table at `root`, creating a table if `root` is `None`.
///
/// New paging structures come from the top of `buffer`. If `buffer` is too small nothing
/// is written and [`PagingErrors::BufferTooSmall`] carries the exact number of bytes
/// needed; pass [`PageBuffer::empty`] to ask for that size.
///
/// Existing pages are split when the request covers part of them with a different
/// attribute. Translations of addresses outside the request never change, but the caller
/// has to invalidate TLBs for the range when [`Mapping::modified`] is set.
pub fn map<M: PhysMemory>(
    memory: &mut M,
    root: Option<PAddr>,
    mode: PagingMode,
    buffer: PageBuffer,
    request: &MapRequest,
) -> Result<Mapping, PagingErrors> {
    let required = required_buffer_size(&*memory, root, mode, request)?;
    if required > buffer.size() {
        debug!(
            target: MAP_LOG_TARGET,
            "Mapping {:#x}+{:#x} needs {:#x} bytes, {:#x} given",
            request.linear_address,
            request.length,
            required,
            buffer.size()
        );
        return Err(PagingErrors::BufferTooSmall { required });
    }

    let mut mapper = Mapper::new(Access::Commit(memory), buffer, *request, mode);
    let root = mapper.run(root)?;
    debug!(
        target: MAP_LOG_TARGET,
        "Mapped {:#x}+{:#x}, {} new tables, modified: {}",
        request.linear_address,
        request.length,
        mapper.required / BASE_PAGE_LENGTH,
        mapper.modified
    );

    Ok(Mapping {
        root,
        modified: mapper.modified,
        used: mapper.required,
    })
}

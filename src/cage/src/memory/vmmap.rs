//! VMMAP data structure and structure-related operation
//!
//! This file provides the `vmmap` of a cage: the set of virtual memory regions it has mapped,
//! with their protections and backing. `VmmapEntry` describes one region and `Vmmap` stores
//! them. Regions are indexed in a `VmaTree` keyed by their end page, so the region containing
//! a page is the first region whose end lies above it, and are additionally threaded on an
//! ordered list so walking neighbouring regions never goes back to the tree.
//!
//! The `Vmmap` decides overlap policy: the index underneath trusts it to never insert two
//! regions covering the same page. Any change to a region's page range (splitting on unmap
//! or protection change) is done by removing the region and inserting the pieces.
use crate::memory::vmmap_constants::*;
use log::{debug, warn};
use std::io;
use std::ops::Range;
use vmatree::{NodeId, VmaTree, VmaTreeError};

/// Used to identify whether the vmmap entry is backed anonymously,
/// by an fd, or by a shared memory segment
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemoryBackingType {
    None, // just a dummy value for places where it needs to be passed, but you dont have the value
    Anonymous,
    SharedMemory(u64),   // stores shmid
    FileDescriptor(u64), // stores file descriptor
}

/// An entry in the virtual memory map: page range, permissions, file offset and backing.
///
/// The region covers pages `[page_num, page_num + npages)`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct VmmapEntry {
    pub page_num: u32,    // Base virtual address shifted right by PAGESHIFT
    pub npages: u32,      // Number of pages in this mapping
    pub prot: i32,        // Current memory protection flags (read/write/execute)
    pub maxprot: i32,     // Maximum allowed protection flags
    pub flags: i32,       // Memory mapping flags (shared/private/fixed/anonymous)
    pub file_offset: i64, // Offset into the backing file/device
    pub file_size: i64,   // Size of the backing store
    pub backing: MemoryBackingType,
}

impl VmmapEntry {
    pub fn new(
        page_num: u32,
        npages: u32,
        prot: i32,
        maxprot: i32,
        flags: i32,
        file_offset: i64,
        file_size: i64,
        backing: MemoryBackingType,
    ) -> Self {
        VmmapEntry {
            page_num,
            npages,
            prot,
            maxprot,
            flags,
            file_offset,
            file_size,
            backing,
        }
    }

    /// First page past the region. This is the key the region is indexed under.
    pub fn end_page(&self) -> u32 {
        self.page_num + self.npages
    }

    pub fn contains(&self, page_num: u32) -> bool {
        self.page_num <= page_num && page_num < self.end_page()
    }

    pub fn overlaps(&self, start: u32, end: u32) -> bool {
        self.page_num < end && start < self.end_page()
    }

    // Copy restricted to [start, end). File offsets move with the cut so the
    // piece still maps the same bytes.
    fn slice(&self, start: u32, end: u32) -> VmmapEntry {
        let mut part = self.clone();
        part.page_num = start;
        part.npages = end - start;
        match self.backing {
            MemoryBackingType::FileDescriptor(_) | MemoryBackingType::SharedMemory(_) => {
                part.file_offset += i64::from(start - self.page_num) << PAGESHIFT;
            }
            MemoryBackingType::None | MemoryBackingType::Anonymous => {}
        }
        part
    }
}

// What the index stores per region: the entry plus its links on the ordered list.
#[derive(Clone, Debug)]
struct Mapping {
    entry: VmmapEntry,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

/// VmmapOps trait provides an interface that can be shared by different virtual memory management
/// implementations, allowing different Vmmap versions to share the same interface.
pub trait VmmapOps {
    // Method to add a new entry; fails if any page is already mapped
    fn add_entry(&mut self, entry: VmmapEntry) -> Result<(), io::Error>;

    // Method to add an entry, unmapping whatever was there before
    fn add_entry_with_overwrite(&mut self, entry: VmmapEntry) -> Result<(), io::Error>;

    // Method to unmap a page range, splitting regions that straddle its edges
    fn remove_range(&mut self, page_num: u32, npages: u32) -> Result<(), io::Error>;

    // Method to change protection of a page range, splitting regions where needed
    fn change_prot(&mut self, page_num: u32, npages: u32, new_prot: i32) -> Result<(), io::Error>;

    // Method to check if requested pages exist with proper maximum permissions
    fn check_existing_mapping(&self, page_num: u32, npages: u32, prot: i32) -> bool;

    // Method to check address mapping against current permissions
    fn check_addr_mapping(&mut self, page_num: u32, npages: u32, prot: i32) -> Option<u32>;

    // Method to find the region containing a page
    fn find_page(&self, page_num: u32) -> Option<&VmmapEntry>;

    // Method to find the first region ending above a page
    fn find_vma(&self, page_num: u32) -> Option<&VmmapEntry>;

    // Method to find the first region ending above a page and the region before it
    fn find_vma_prev(&self, page_num: u32) -> (Option<&VmmapEntry>, Option<&VmmapEntry>);

    fn first_entry(&self) -> Option<&VmmapEntry>;

    fn last_entry(&self) -> Option<&VmmapEntry>;

    // Method to iterate over entries in address order, from both ends
    fn iter(&self) -> VmmapIter<'_>;

    // Method to find a free page range of at least `npages`
    fn find_space(&self, npages: u32) -> Option<Range<u32>>;

    fn find_space_above_hint(&self, npages: u32, hint: u32) -> Option<Range<u32>>;

    // Method to find free space whose start and length are multiples of pages_per_map
    fn find_map_space(&self, num_pages: u32, pages_per_map: u32) -> Option<Range<u32>>;

    fn find_map_space_with_hint(
        &self,
        num_pages: u32,
        pages_per_map: u32,
        hint: u32,
    ) -> Option<Range<u32>>;
}

/// Represents a virtual memory map that manages memory regions and their attributes
///
/// Fields:
/// - entries: index of the regions keyed by end page, values carry the list links
/// - head/tail: lowest and highest region on the ordered list
/// - cached_entry: last region that satisfied `check_addr_mapping`
/// - base_address: wasm base address. None means uninitialized yet
#[derive(Clone, Debug)]
pub struct Vmmap {
    entries: VmaTree<u32, Mapping>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    cached_entry: Option<NodeId>,
    pub base_address: Option<usize>,
    pub start_address: u32, // start page of valid vmmap range
    pub end_address: u32,   // end page of valid vmmap range
    pub program_break: u32, // program break (i.e. heap top) in pages
}

impl Default for Vmmap {
    fn default() -> Self {
        Self::new()
    }
}

impl Vmmap {
    /// Creates a new empty virtual memory map
    pub fn new() -> Self {
        Vmmap {
            entries: VmaTree::new(),
            head: None,
            tail: None,
            cached_entry: None,
            base_address: None,
            start_address: 0,
            end_address: DEFAULT_VMMAP_SIZE,
            program_break: 0,
        }
    }

    // Clear the vmmap struct, used for exec syscall
    // Discards every mapping so the new program starts in a clean address space
    // while the `Vmmap` itself is reused.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.head = None;
        self.tail = None;
        self.cached_entry = None;
        self.base_address = None;
        self.start_address = 0;
        self.end_address = DEFAULT_VMMAP_SIZE;
        self.program_break = 0;
    }

    /// Number of regions currently mapped
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copies the parent's regions and program break into this map.
    ///
    /// Used right after fork: the child keeps its own base address but starts
    /// with a layout identical to the parent's.
    pub fn fork_from(&mut self, parent: &Vmmap) {
        self.entries = parent.entries.clone();
        self.head = parent.head;
        self.tail = parent.tail;
        self.cached_entry = None;
        self.start_address = parent.start_address;
        self.end_address = parent.end_address;
        self.program_break = parent.program_break;
    }

    /// Rounds up a page number to the nearest multiple of pages_per_map
    fn round_page_num_up_to_map_multiple(&self, npages: u32, pages_per_map: u32) -> u32 {
        (npages + pages_per_map - 1) & !(pages_per_map - 1)
    }

    pub fn set_base_address(&mut self, base_address: usize) {
        self.base_address = Some(base_address);
    }

    pub fn set_program_break(&mut self, program_break: u32) {
        self.program_break = program_break;
    }

    /// Converts a user address to a system address, None before the base is set
    pub fn user_to_sys(&self, address: u32) -> Option<usize> {
        self.base_address.map(|base| address as usize + base)
    }

    /// Converts a system address to a user address
    pub fn sys_to_user(&self, address: usize) -> Option<u32> {
        let base = self.base_address?;
        address.checked_sub(base).map(|offset| offset as u32)
    }

    fn mapping(&self, id: NodeId) -> Option<&Mapping> {
        self.entries.value(id)
    }

    // Indexes `entry` and splices it onto the ordered list between the
    // neighbours the index found while descending.
    fn link_entry(&mut self, entry: VmmapEntry) -> Result<NodeId, io::Error> {
        let mapping = Mapping {
            entry,
            prev: None,
            next: None,
        };
        let key = mapping.entry.end_page();
        let inserted = self
            .entries
            .insert_with_neighbors(key, mapping)
            .map_err(|dup| {
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("a region ending at page {} is already mapped", dup.key),
                )
            })?;
        let id = inserted.id;

        if let Some(mapping) = self.entries.value_mut(id) {
            mapping.prev = inserted.prev;
            mapping.next = inserted.next;
        }
        match inserted.prev.and_then(|prev| self.entries.value_mut(prev)) {
            Some(prev) => prev.next = Some(id),
            None => self.head = Some(id),
        }
        match inserted.next.and_then(|next| self.entries.value_mut(next)) {
            Some(next) => next.prev = Some(id),
            None => self.tail = Some(id),
        }
        self.cached_entry = None;
        Ok(id)
    }

    // Drops the region from the index and the list, handing its entry back.
    fn unlink_entry(&mut self, id: NodeId) -> Option<VmmapEntry> {
        let (_, mapping) = self.entries.remove_id(id).ok()?;
        match mapping.prev.and_then(|prev| self.entries.value_mut(prev)) {
            Some(prev) => prev.next = mapping.next,
            None => self.head = mapping.next,
        }
        match mapping.next.and_then(|next| self.entries.value_mut(next)) {
            Some(next) => next.prev = mapping.prev,
            None => self.tail = mapping.prev,
        }
        self.cached_entry = None;
        Some(mapping.entry)
    }

    // End page of [page_num, page_num + npages) if it is non-empty and inside the window.
    fn check_bounds(&self, page_num: u32, npages: u32) -> Result<u32, io::Error> {
        if npages == 0 {
            return Err(invalid_input("Number of pages cannot be zero"));
        }
        let end = page_num
            .checked_add(npages)
            .ok_or_else(|| invalid_input("Page range overflows"))?;
        if page_num < self.start_address || end > self.end_address {
            return Err(invalid_input("Page range outside of vmmap bounds"));
        }
        Ok(end)
    }

    // Swaps the region behind `id` for `pieces`, skipping empty ones. The pieces must
    // lie within the region. If any piece cannot be linked the region is restored.
    fn replace_entry(&mut self, id: NodeId, pieces: Vec<VmmapEntry>) -> Result<(), io::Error> {
        let Some(original) = self.unlink_entry(id) else {
            return Ok(());
        };
        let mut linked = Vec::with_capacity(pieces.len());
        for piece in pieces.into_iter().filter(|piece| piece.npages > 0) {
            match self.link_entry(piece) {
                Ok(piece_id) => linked.push(piece_id),
                Err(err) => {
                    for piece_id in linked {
                        self.unlink_entry(piece_id);
                    }
                    self.link_entry(original)?;
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    // Regions overlapping [start, end), lowest first.
    fn overlapping(&self, start: u32, end: u32) -> Vec<NodeId> {
        let mut ids = Vec::new();
        let mut cursor = self.entries.find_first_above(&start);
        while let Some(id) = cursor {
            let Some(mapping) = self.mapping(id) else {
                break;
            };
            if mapping.entry.page_num >= end {
                break;
            }
            ids.push(id);
            cursor = mapping.next;
        }
        ids
    }

    // Walks the gaps between regions from page `from` up to `end_address` and
    // returns the first placement `fit` accepts.
    fn first_fit<F>(&self, from: u32, fit: F) -> Option<Range<u32>>
    where
        F: Fn(Range<u32>) -> Option<Range<u32>>,
    {
        let mut gap_start = from.max(self.start_address);
        let mut cursor = self.entries.find_first_above(&gap_start);
        while gap_start < self.end_address {
            let mapping = cursor.and_then(|id| self.mapping(id));
            let gap_end = mapping.map_or(self.end_address, |m| {
                m.entry.page_num.min(self.end_address)
            });
            if gap_start < gap_end {
                if let Some(found) = fit(gap_start..gap_end) {
                    return Some(found);
                }
            }
            let mapping = mapping?;
            gap_start = gap_start.max(mapping.entry.end_page());
            cursor = mapping.next;
        }
        None
    }

    /// Checks the index invariants and that the ordered list visits every
    /// region once, in address order, without overlap.
    pub fn validate(&self) -> Result<(), VmaTreeError> {
        self.entries.validate()?;

        let violation = |page: u32, reason: &str| VmaTreeError::InvariantViolated {
            key: page.to_string(),
            reason: reason.to_string(),
        };

        let mut count = 0;
        let mut prev: Option<NodeId> = None;
        let mut prev_end = self.start_address;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let (key, mapping) = self
                .entries
                .entry(id)
                .ok_or_else(|| violation(prev_end, "list links a removed region"))?;
            let entry = &mapping.entry;
            if entry.npages == 0 {
                return Err(violation(entry.page_num, "empty region"));
            }
            if *key != entry.end_page() {
                return Err(violation(entry.page_num, "indexed under the wrong end page"));
            }
            if mapping.prev != prev {
                return Err(violation(entry.page_num, "broken back link"));
            }
            if count > 0 && entry.page_num < prev_end {
                return Err(violation(entry.page_num, "overlaps the previous region"));
            }
            count += 1;
            prev_end = entry.end_page();
            prev = Some(id);
            cursor = mapping.next;
        }

        if prev != self.tail {
            return Err(violation(prev_end, "tail does not match the last region"));
        }
        if count != self.entries.len() {
            return Err(violation(prev_end, "list and index disagree on region count"));
        }
        Ok(())
    }
}

// NaCl-style: any access right implies PROT_READ
fn effective_prot(prot: i32) -> i32 {
    if prot & (PROT_EXEC | PROT_READ | PROT_WRITE) != PROT_NONE {
        prot | PROT_READ
    } else {
        prot
    }
}

fn invalid_input(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.to_string())
}

impl VmmapOps for Vmmap {
    /// Adds a new entry to the virtual memory map
    ///
    /// Arguments:
    /// - entry: region to add, covering pages [page_num, page_num + npages)
    ///
    /// Returns:
    /// - Ok(()) on success
    /// - Err(InvalidInput) if npages is 0 or the range leaves the vmmap bounds
    /// - Err(AlreadyExists) if any page in the range is already mapped
    fn add_entry(&mut self, entry: VmmapEntry) -> Result<(), io::Error> {
        let end = self.check_bounds(entry.page_num, entry.npages)?;

        // The only region that can overlap is the first one ending above our start.
        if let Some(existing) = self.find_vma(entry.page_num) {
            if existing.page_num < end {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!(
                        "pages [{}, {}) overlap region [{}, {})",
                        entry.page_num,
                        end,
                        existing.page_num,
                        existing.end_page()
                    ),
                ));
            }
        }

        debug!(
            "vmmap: add region [{}, {}) prot {:#x}",
            entry.page_num, end, entry.prot
        );
        self.link_entry(entry)?;
        Ok(())
    }

    /// Adds a new entry, unmapping any existing pages in its range first
    fn add_entry_with_overwrite(&mut self, entry: VmmapEntry) -> Result<(), io::Error> {
        // Nothing may be unmapped for an entry that cannot be added afterwards
        self.check_bounds(entry.page_num, entry.npages)?;
        self.remove_range(entry.page_num, entry.npages)?;
        self.add_entry(entry)
    }

    /// Removes the mapping from the specified page range
    ///
    /// Done on a best efforts basis: pages that are not mapped are ignored. A region that
    /// straddles either edge of the range is cut, and the part outside the range is
    /// re-inserted as its own region.
    ///
    /// Arguments:
    /// - page_num: Starting page number to remove
    /// - npages: Number of pages to remove
    fn remove_range(&mut self, page_num: u32, npages: u32) -> Result<(), io::Error> {
        if npages == 0 {
            return Err(invalid_input("Number of pages cannot be zero"));
        }
        let end = page_num.saturating_add(npages);

        let doomed = self.overlapping(page_num, end);
        if doomed.is_empty() {
            warn!("vmmap: nothing mapped in pages [{}, {})", page_num, end);
            return Ok(());
        }

        for id in doomed {
            let Some(entry) = self.mapping(id).map(|mapping| mapping.entry.clone()) else {
                continue;
            };
            debug!(
                "vmmap: unmap [{}, {}) from region [{}, {})",
                page_num.max(entry.page_num),
                end.min(entry.end_page()),
                entry.page_num,
                entry.end_page()
            );
            let cut_start = page_num.clamp(entry.page_num, entry.end_page());
            let cut_end = end.clamp(entry.page_num, entry.end_page());
            self.replace_entry(
                id,
                vec![
                    entry.slice(entry.page_num, cut_start),
                    entry.slice(cut_end, entry.end_page()),
                ],
            )?;
        }
        Ok(())
    }

    /// Changes memory protection flags for a range of pages
    ///
    /// Regions already carrying `new_prot` are left whole. Others are split into up to
    /// three parts: before the range (old protection), inside it (new protection) and
    /// after it (old protection).
    fn change_prot(&mut self, page_num: u32, npages: u32, new_prot: i32) -> Result<(), io::Error> {
        if npages == 0 {
            return Ok(());
        }
        let end = page_num.saturating_add(npages);

        for id in self.overlapping(page_num, end) {
            let Some(entry) = self.mapping(id).map(|mapping| mapping.entry.clone()) else {
                continue;
            };
            if entry.prot == new_prot {
                continue;
            }

            let overlap_start = entry.page_num.max(page_num);
            let overlap_end = entry.end_page().min(end);

            let mut inside = entry.slice(overlap_start, overlap_end);
            inside.prot = new_prot;
            self.replace_entry(
                id,
                vec![
                    entry.slice(entry.page_num, overlap_start),
                    inside,
                    entry.slice(overlap_end, entry.end_page()),
                ],
            )?;
            debug!(
                "vmmap: prot {:#x} -> {:#x} on [{}, {})",
                entry.prot, new_prot, overlap_start, overlap_end
            );
        }
        Ok(())
    }

    /// Checks if a continuous mapping exists for the page range and the requested
    /// protection does not exceed any region's maximum protection
    fn check_existing_mapping(&self, page_num: u32, npages: u32, prot: i32) -> bool {
        let region_end_page = page_num.saturating_add(npages);
        let mut current_page = page_num;
        let mut cursor = self.entries.find_first_above(&page_num);

        while let Some(id) = cursor {
            let Some(mapping) = self.mapping(id) else {
                return false;
            };
            let entry = &mapping.entry;

            // Gap between entries
            if current_page < entry.page_num {
                return false;
            }
            if prot & !entry.maxprot != 0 {
                return false;
            }
            current_page = entry.end_page();
            if region_end_page <= current_page {
                return true;
            }
            cursor = mapping.next;
        }

        false
    }

    /// Checks address mapping with caching optimization
    ///
    /// Returns:
    /// - Some(end_page) of the region covering the end of the range if every page is mapped
    ///   with compatible protection
    /// - None if mapping invalid or protection incompatible
    fn check_addr_mapping(&mut self, page_num: u32, npages: u32, prot: i32) -> Option<u32> {
        let region_end_page = page_num.saturating_add(npages);

        // Case 1: Check cached entry first for performance
        if let Some(cached) = self.cached_entry.and_then(|id| self.mapping(id)) {
            let entry = &cached.entry;
            if entry.page_num <= page_num
                && region_end_page <= entry.end_page()
                && prot & !effective_prot(entry.prot) == 0
            {
                return Some(entry.end_page());
            }
        }

        // Case 2: Walk the regions covering the range
        let mut current_page = page_num;
        let mut cursor = self.entries.find_first_above(&page_num);
        while let Some(id) = cursor {
            let mapping = self.mapping(id)?;
            let ent_start = mapping.entry.page_num;
            let ent_end_page = mapping.entry.end_page();
            let flags = effective_prot(mapping.entry.prot);
            cursor = mapping.next;

            if current_page < ent_start || prot & !flags != 0 {
                return None;
            }
            if region_end_page <= ent_end_page {
                self.cached_entry = Some(id);
                return Some(ent_end_page);
            }
            current_page = ent_end_page;
        }

        None
    }

    fn find_page(&self, page_num: u32) -> Option<&VmmapEntry> {
        self.find_vma(page_num)
            .filter(|entry| entry.page_num <= page_num)
    }

    /// Gets the first region whose end lies above `page_num`: the one containing it, or
    /// failing that the next region up
    fn find_vma(&self, page_num: u32) -> Option<&VmmapEntry> {
        self.entries
            .find_first_above(&page_num)
            .and_then(|id| self.mapping(id))
            .map(|mapping| &mapping.entry)
    }

    /// Same as `find_vma`, also returning the region just below it
    ///
    /// Returns (previous, vma)
    fn find_vma_prev(&self, page_num: u32) -> (Option<&VmmapEntry>, Option<&VmmapEntry>) {
        let vma = self
            .entries
            .find_first_above(&page_num)
            .and_then(|id| self.mapping(id));
        let prev = match vma {
            Some(mapping) => mapping.prev,
            None => self.tail,
        };
        (
            prev.and_then(|id| self.mapping(id)).map(|m| &m.entry),
            vma.map(|m| &m.entry),
        )
    }

    fn first_entry(&self) -> Option<&VmmapEntry> {
        self.head
            .and_then(|id| self.mapping(id))
            .map(|mapping| &mapping.entry)
    }

    fn last_entry(&self) -> Option<&VmmapEntry> {
        self.tail
            .and_then(|id| self.mapping(id))
            .map(|mapping| &mapping.entry)
    }

    fn iter(&self) -> VmmapIter<'_> {
        VmmapIter {
            vmmap: self,
            front: self.head,
            back: self.tail,
            remaining: self.entries.len(),
        }
    }

    fn find_space(&self, npages: u32) -> Option<Range<u32>> {
        self.find_space_above_hint(npages, self.start_address)
    }

    /// Finds the lowest free range of `npages` pages at or above `hint`
    fn find_space_above_hint(&self, npages: u32, hint: u32) -> Option<Range<u32>> {
        if npages == 0 {
            return None;
        }
        self.first_fit(hint, |gap| {
            (gap.end - gap.start >= npages).then(|| gap.start..gap.start + npages)
        })
    }

    fn find_map_space(&self, num_pages: u32, pages_per_map: u32) -> Option<Range<u32>> {
        self.find_map_space_with_hint(num_pages, pages_per_map, self.start_address)
    }

    /// Finds aligned space above a hint address
    ///
    /// Arguments:
    /// - num_pages: Number of pages needed, rounded up to a multiple of pages_per_map
    /// - pages_per_map: Alignment requirement in pages, a power of two
    /// - hint: Page to start searching from
    fn find_map_space_with_hint(
        &self,
        num_pages: u32,
        pages_per_map: u32,
        hint: u32,
    ) -> Option<Range<u32>> {
        if num_pages == 0 || !pages_per_map.is_power_of_two() {
            return None;
        }
        let rounded_num_pages = self.round_page_num_up_to_map_multiple(num_pages, pages_per_map);

        self.first_fit(hint, |gap| {
            let aligned_start = self.round_page_num_up_to_map_multiple(gap.start, pages_per_map);
            let aligned_end = aligned_start.checked_add(rounded_num_pages)?;
            debug_assert!(aligned_start % pages_per_map == 0);
            (aligned_end <= gap.end).then(|| aligned_start..aligned_end)
        })
    }
}

/// Double-ended iterator over the regions of a `Vmmap` in address order
pub struct VmmapIter<'a> {
    vmmap: &'a Vmmap,
    front: Option<NodeId>,
    back: Option<NodeId>,
    remaining: usize,
}

impl<'a> Iterator for VmmapIter<'a> {
    type Item = &'a VmmapEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let vmmap = self.vmmap;
        let mapping = vmmap.mapping(self.front?)?;
        self.front = mapping.next;
        self.remaining -= 1;
        Some(&mapping.entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a> DoubleEndedIterator for VmmapIter<'a> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let vmmap = self.vmmap;
        let mapping = vmmap.mapping(self.back?)?;
        self.back = mapping.prev;
        self.remaining -= 1;
        Some(&mapping.entry)
    }
}

// Testing
#[cfg(test)]
mod tests {
    use super::*;

    fn anon(page_num: u32, npages: u32, prot: i32) -> VmmapEntry {
        VmmapEntry::new(
            page_num,
            npages,
            prot,
            PROT_READ | PROT_WRITE | PROT_EXEC,
            (MAP_PRIVATE | MAP_ANONYMOUS) as i32,
            0,
            0,
            MemoryBackingType::Anonymous,
        )
    }

    fn ranges(vmmap: &Vmmap) -> Vec<(u32, u32)> {
        vmmap.iter().map(|e| (e.page_num, e.end_page())).collect()
    }

    /// Test: Change protection on entire continuous region
    /// Expected: Region should remain continuous with updated protection
    #[test]
    fn test_change_prot_entire_region() {
        let mut vmmap = Vmmap::new();
        vmmap.add_entry(anon(100, 10, PROT_READ | PROT_WRITE)).unwrap();

        vmmap.change_prot(100, 10, PROT_READ | PROT_EXEC).unwrap();

        let entry = vmmap.find_page(100).expect("Entry should exist");
        assert_eq!(entry.page_num, 100);
        assert_eq!(entry.npages, 10);
        assert_eq!(entry.prot, PROT_READ | PROT_EXEC);
        assert_eq!(vmmap.len(), 1, "Region should remain as a single entry");
        vmmap.validate().unwrap();
    }

    /// Test: Change protection on middle portion of continuous region
    /// Expected: Region should be split into 3 parts
    #[test]
    fn test_change_prot_middle_of_region() {
        let mut vmmap = Vmmap::new();
        vmmap.add_entry(anon(100, 10, PROT_READ | PROT_WRITE)).unwrap();

        vmmap.change_prot(103, 4, PROT_READ).unwrap();

        assert_eq!(ranges(&vmmap), vec![(100, 103), (103, 107), (107, 110)]);
        assert_eq!(vmmap.find_page(102).unwrap().prot, PROT_READ | PROT_WRITE);
        assert_eq!(vmmap.find_page(105).unwrap().prot, PROT_READ);
        assert_eq!(vmmap.find_page(109).unwrap().prot, PROT_READ | PROT_WRITE);
        vmmap.validate().unwrap();
    }

    /// Test: Change protection to the value a region already has
    /// Expected: No fragmentation
    #[test]
    fn test_change_prot_to_same_value() {
        let mut vmmap = Vmmap::new();
        vmmap.add_entry(anon(100, 10, PROT_READ)).unwrap();
        vmmap.change_prot(102, 3, PROT_READ).unwrap();
        assert_eq!(ranges(&vmmap), vec![(100, 110)]);
    }

    /// Test: Change protection spanning several regions and a hole
    #[test]
    fn test_change_prot_spanning_multiple_regions() {
        let mut vmmap = Vmmap::new();
        vmmap.add_entry(anon(100, 10, PROT_READ | PROT_WRITE)).unwrap();
        vmmap.add_entry(anon(115, 10, PROT_READ | PROT_WRITE)).unwrap();

        vmmap.change_prot(105, 15, PROT_NONE).unwrap();

        assert_eq!(
            ranges(&vmmap),
            vec![(100, 105), (105, 110), (115, 120), (120, 125)]
        );
        assert_eq!(vmmap.find_page(107).unwrap().prot, PROT_NONE);
        assert_eq!(vmmap.find_page(117).unwrap().prot, PROT_NONE);
        assert!(vmmap.find_page(112).is_none());
        vmmap.validate().unwrap();
    }

    /// Test: Split a file backed region
    /// Expected: The right piece maps the file further in
    #[test]
    fn test_remove_range_moves_file_offset() {
        let mut vmmap = Vmmap::new();
        let mut entry = anon(10, 8, PROT_READ);
        entry.backing = MemoryBackingType::FileDescriptor(3);
        entry.file_offset = 0x1000;
        vmmap.add_entry(entry).unwrap();

        vmmap.remove_range(12, 2).unwrap();

        assert_eq!(ranges(&vmmap), vec![(10, 12), (14, 18)]);
        assert_eq!(vmmap.find_page(10).unwrap().file_offset, 0x1000);
        assert_eq!(
            vmmap.find_page(14).unwrap().file_offset,
            0x1000 + (4 << PAGESHIFT)
        );
        vmmap.validate().unwrap();
    }

    #[test]
    fn test_add_entry_strict_no_overlap() {
        let mut vmmap = Vmmap::new();
        vmmap.add_entry(anon(10, 10, PROT_READ)).unwrap();

        for (start, len) in [(5, 6), (15, 2), (19, 5), (0, 40)] {
            let err = vmmap.add_entry(anon(start, len, PROT_READ)).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        }
        // Touching regions do not overlap
        vmmap.add_entry(anon(20, 5, PROT_READ)).unwrap();
        vmmap.add_entry(anon(5, 5, PROT_READ)).unwrap();
        assert_eq!(ranges(&vmmap), vec![(5, 10), (10, 20), (20, 25)]);

        let err = vmmap.add_entry(anon(30, 0, PROT_READ)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        let err = vmmap
            .add_entry(anon(DEFAULT_VMMAP_SIZE - 1, 2, PROT_READ))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        vmmap.validate().unwrap();
    }

    /// Test: Overwrite with a range that swallows several regions and clips two more
    #[test]
    fn test_add_entry_with_overwrite_partial_overlap() {
        let mut vmmap = Vmmap::new();
        for start in [0, 10, 20, 30] {
            vmmap.add_entry(anon(start, 8, PROT_READ)).unwrap();
        }

        vmmap
            .add_entry_with_overwrite(anon(5, 28, PROT_READ | PROT_WRITE))
            .unwrap();

        assert_eq!(ranges(&vmmap), vec![(0, 5), (5, 33), (33, 38)]);
        assert_eq!(vmmap.find_page(20).unwrap().prot, PROT_READ | PROT_WRITE);
        vmmap.validate().unwrap();
    }

    #[test]
    fn test_find_vma_and_prev() {
        let mut vmmap = Vmmap::new();
        vmmap.add_entry(anon(10, 10, PROT_READ)).unwrap();
        vmmap.add_entry(anon(40, 10, PROT_READ)).unwrap();

        assert_eq!(vmmap.find_vma(0).unwrap().page_num, 10);
        assert_eq!(vmmap.find_vma(19).unwrap().page_num, 10);
        assert_eq!(vmmap.find_vma(20).unwrap().page_num, 40);
        assert!(vmmap.find_vma(50).is_none());
        assert!(vmmap.find_page(25).is_none());

        let (prev, vma) = vmmap.find_vma_prev(25);
        assert_eq!(prev.unwrap().page_num, 10);
        assert_eq!(vma.unwrap().page_num, 40);

        let (prev, vma) = vmmap.find_vma_prev(60);
        assert_eq!(prev.unwrap().page_num, 40);
        assert!(vma.is_none());

        let (prev, vma) = vmmap.find_vma_prev(0);
        assert!(prev.is_none());
        assert_eq!(vma.unwrap().page_num, 10);
    }

    #[test]
    fn test_iter_both_directions() {
        let mut vmmap = Vmmap::new();
        for start in [50, 10, 30, 70, 20] {
            vmmap.add_entry(anon(start, 5, PROT_READ)).unwrap();
        }
        let forward: Vec<u32> = vmmap.iter().map(|e| e.page_num).collect();
        assert_eq!(forward, vec![10, 20, 30, 50, 70]);
        let backward: Vec<u32> = vmmap.iter().rev().map(|e| e.page_num).collect();
        assert_eq!(backward, vec![70, 50, 30, 20, 10]);
        assert_eq!(vmmap.first_entry().unwrap().page_num, 10);
        assert_eq!(vmmap.last_entry().unwrap().page_num, 70);
    }

    #[test]
    fn test_check_existing_mapping() {
        let mut vmmap = Vmmap::new();
        vmmap.add_entry(anon(10, 10, PROT_READ)).unwrap();
        vmmap.add_entry(anon(20, 10, PROT_READ)).unwrap();
        let mut limited = anon(40, 10, PROT_READ);
        limited.maxprot = PROT_READ;
        vmmap.add_entry(limited).unwrap();

        assert!(vmmap.check_existing_mapping(10, 20, PROT_READ | PROT_WRITE));
        assert!(vmmap.check_existing_mapping(15, 10, 0));
        assert!(!vmmap.check_existing_mapping(25, 10, 0), "gap at 30..40");
        assert!(!vmmap.check_existing_mapping(40, 5, PROT_WRITE));
        assert!(vmmap.check_existing_mapping(40, 5, PROT_READ));
        assert!(!vmmap.check_existing_mapping(60, 1, 0));
    }

    #[test]
    fn test_check_addr_mapping_uses_current_prot() {
        let mut vmmap = Vmmap::new();
        vmmap.add_entry(anon(10, 10, PROT_WRITE)).unwrap();
        vmmap.add_entry(anon(20, 10, PROT_NONE)).unwrap();

        // PROT_WRITE implies PROT_READ
        assert_eq!(vmmap.check_addr_mapping(12, 2, PROT_READ), Some(20));
        // cached path
        assert_eq!(vmmap.check_addr_mapping(15, 1, PROT_WRITE), Some(20));
        assert_eq!(vmmap.check_addr_mapping(18, 4, PROT_READ), None);
        assert_eq!(vmmap.check_addr_mapping(30, 1, 0), None);

        vmmap.change_prot(20, 10, PROT_READ).unwrap();
        assert_eq!(vmmap.check_addr_mapping(18, 4, PROT_READ), Some(30));
    }

    #[test]
    fn test_find_space_returns_none_when_full() {
        let mut vmmap = Vmmap::new();
        vmmap.end_address = 100;
        vmmap.add_entry(anon(0, 100, PROT_READ)).unwrap();
        assert_eq!(vmmap.find_space(1), None);
    }

    #[test]
    fn test_find_space_picks_first_gap() {
        let mut vmmap = Vmmap::new();
        vmmap.add_entry(anon(0, 10, PROT_READ)).unwrap();
        vmmap.add_entry(anon(12, 10, PROT_READ)).unwrap();
        vmmap.add_entry(anon(30, 10, PROT_READ)).unwrap();

        assert_eq!(vmmap.find_space(2), Some(10..12));
        assert_eq!(vmmap.find_space(5), Some(22..27));
        assert_eq!(vmmap.find_space(9), Some(40..49));
        assert_eq!(vmmap.find_space_above_hint(2, 25), Some(25..27));
        assert_eq!(vmmap.find_space_above_hint(2, 35), Some(40..42));
    }

    #[test]
    fn test_find_map_space_with_hint_alignment_in_pages() {
        let mut vmmap = Vmmap::new();
        vmmap.add_entry(anon(0, 3, PROT_READ)).unwrap();
        vmmap.add_entry(anon(20, 4, PROT_READ)).unwrap();

        // 16-page alignment: first aligned slot after page 3 is 16, but 16..32 hits 20
        assert_eq!(vmmap.find_map_space(5, 16), Some(32..48));
        assert_eq!(vmmap.find_map_space(3, 4), Some(4..8));
        assert_eq!(vmmap.find_map_space_with_hint(3, 4, 9), Some(12..16));
        assert_eq!(vmmap.find_map_space(3, 3), None, "alignment must be a power of two");
    }

    #[test]
    fn test_fork_copies_layout() {
        let mut parent = Vmmap::new();
        parent.add_entry(anon(0, 4, PROT_READ | PROT_WRITE)).unwrap();
        parent.add_entry(anon(100, 4, PROT_READ)).unwrap();
        parent.set_program_break(4);

        let mut child = Vmmap::new();
        child.set_base_address(0x2000_0000);
        child.fork_from(&parent);

        assert_eq!(ranges(&child), ranges(&parent));
        assert_eq!(child.program_break, 4);
        assert_eq!(child.base_address, Some(0x2000_0000));

        // Later changes stay private to each side
        child.remove_range(100, 4).unwrap();
        assert_eq!(parent.len(), 2);
        assert_eq!(child.len(), 1);
        child.validate().unwrap();
        parent.validate().unwrap();
    }

    #[test]
    fn test_address_translation() {
        let mut vmmap = Vmmap::new();
        assert_eq!(vmmap.user_to_sys(0x1000), None);
        vmmap.set_base_address(0x1_0000_0000);
        assert_eq!(vmmap.user_to_sys(0x1000), Some(0x1_0000_1000));
        assert_eq!(vmmap.sys_to_user(0x1_0000_2000), Some(0x2000));
        assert_eq!(vmmap.sys_to_user(0x10), None);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut vmmap = Vmmap::new();
        vmmap.add_entry(anon(0, 4, PROT_READ)).unwrap();
        vmmap.set_program_break(4);
        vmmap.clear();
        assert!(vmmap.is_empty());
        assert!(vmmap.first_entry().is_none());
        assert_eq!(vmmap.program_break, 0);
        vmmap.validate().unwrap();
    }

    /// Test: Zero-length protection change inside a region
    /// Expected: Nothing changes and no pages are lost
    #[test]
    fn test_change_prot_zero_pages_is_noop() {
        let mut vmmap = Vmmap::new();
        vmmap.add_entry(anon(100, 10, PROT_READ | PROT_WRITE)).unwrap();

        vmmap.change_prot(105, 0, PROT_READ).unwrap();

        assert_eq!(ranges(&vmmap), vec![(100, 110)]);
        assert_eq!(vmmap.find_page(107).unwrap().prot, PROT_READ | PROT_WRITE);
        vmmap.validate().unwrap();
    }

    /// Test: Overwrite that runs past the end of the window
    /// Expected: Rejected before anything is unmapped
    #[test]
    fn test_failed_overwrite_leaves_map_unchanged() {
        let top = DEFAULT_VMMAP_SIZE;
        let mut vmmap = Vmmap::new();
        vmmap.add_entry(anon(0, 1, PROT_READ | PROT_WRITE)).unwrap();
        vmmap.add_entry(anon(top - 4, 4, PROT_READ | PROT_WRITE)).unwrap();
        let before = ranges(&vmmap);

        let err = vmmap
            .add_entry_with_overwrite(anon(top - 2, 4, PROT_READ))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let err = vmmap
            .add_entry_with_overwrite(anon(u32::MAX - 1, 4, PROT_READ))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let err = vmmap
            .add_entry_with_overwrite(anon(top - 4, 0, PROT_READ))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        assert_eq!(ranges(&vmmap), before);
        assert_eq!(vmmap.find_page(top - 1).unwrap().prot, PROT_READ | PROT_WRITE);
        vmmap.validate().unwrap();
    }

    /// Test: Ranges reaching past the end of the window are clipped to it
    #[test]
    fn test_change_prot_and_remove_range_at_window_end() {
        let top = DEFAULT_VMMAP_SIZE;
        let mut vmmap = Vmmap::new();
        vmmap.add_entry(anon(top - 4, 4, PROT_READ | PROT_WRITE)).unwrap();

        vmmap.change_prot(top - 2, u32::MAX, PROT_READ).unwrap();
        assert_eq!(ranges(&vmmap), vec![(top - 4, top - 2), (top - 2, top)]);
        assert_eq!(vmmap.find_page(top - 1).unwrap().prot, PROT_READ);

        vmmap.remove_range(top - 1, u32::MAX).unwrap();
        assert_eq!(ranges(&vmmap), vec![(top - 4, top - 2), (top - 2, top - 1)]);

        assert_eq!(
            vmmap.remove_range(top - 4, 0).unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
        assert_eq!(vmmap.len(), 2);
        vmmap.validate().unwrap();
    }

    /// Test: A piece that cannot be linked while replacing a region
    /// Expected: The region is put back as it was
    #[test]
    fn test_replace_entry_restores_region_on_failure() {
        let mut vmmap = Vmmap::new();
        vmmap.add_entry(anon(100, 10, PROT_READ)).unwrap();
        vmmap.add_entry(anon(120, 10, PROT_READ)).unwrap();
        let id = vmmap.entries.find(&110).unwrap();

        // Second piece would be indexed under 130, which is taken
        let err = vmmap
            .replace_entry(id, vec![anon(100, 5, PROT_WRITE), anon(125, 5, PROT_WRITE)])
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        assert_eq!(ranges(&vmmap), vec![(100, 110), (120, 130)]);
        assert_eq!(vmmap.find_page(100).unwrap().prot, PROT_READ);
        vmmap.validate().unwrap();
    }
}

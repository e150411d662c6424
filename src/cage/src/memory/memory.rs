//! Memory calls of a cage, as seen by its vmmap
//!
//! These handlers validate the guest's arguments and keep the cage's `vmmap` in step with
//! what the call asks for. Backing the pages with host memory is left to the runtime that
//! owns the linear memory; every handler here only does the bookkeeping.
use crate::cage::get_cage;
use crate::err_const::{syscall_error, Errno};
use crate::memory::mem_helper::{npages_of, round_up_page};
use crate::memory::vmmap::{MemoryBackingType, VmmapEntry, VmmapOps};
use crate::memory::vmmap_constants::*;
use log::debug;

/// Handles `mmap`, recording the new region in the `vmmap`.
///
/// The handling logic is as follows:
/// 1. Restrict allowed flags to `MAP_FIXED`, `MAP_SHARED`, `MAP_PRIVATE`, and `MAP_ANONYMOUS`.
/// 2. Disallow `PROT_EXEC`; return `EINVAL` if the `prot` argument includes `PROT_EXEC`.
/// 3. If `MAP_FIXED` is not specified, query the `vmmap` structure to locate an available memory
///    region, using `addr` as a hint when it is non-zero. Otherwise, use the address provided.
/// 4. Record the region, replacing whatever was mapped there before.
///
/// # Arguments
/// * `cageid` - Identifier of the cage that initiated the `mmap`.
/// * `addr` - Starting address of the memory region to mmap.
/// * `len` - Length of the memory region to mmap.
/// * `prot` - Memory protection flags (e.g., `PROT_READ`, `PROT_WRITE`).
/// * `flags` - Mapping flags (e.g., `MAP_SHARED`, `MAP_ANONYMOUS`).
/// * `fd` - File descriptor associated with the mapping, if applicable.
/// * `off` - Offset within the file, if applicable.
///
/// # Returns
/// * `u32` - user address of the mapping. See "man mmap" for details
pub fn mmap_handler(
    cageid: u64,
    addr: u64,
    len: u64,
    prot: i32,
    mut flags: i32,
    fd: i32,
    off: i64,
) -> Result<u32, Errno> {
    let cage = get_cage(cageid).ok_or(Errno::ESRCH)?;

    // only these four flags are allowed
    let allowed_flags =
        MAP_FIXED as i32 | MAP_SHARED as i32 | MAP_PRIVATE as i32 | MAP_ANONYMOUS as i32;
    flags &= allowed_flags;

    if prot & PROT_EXEC > 0 {
        return Err(syscall_error(Errno::EINVAL, "mmap", "PROT_EXEC is not allowed"));
    }

    // either MAP_PRIVATE or MAP_SHARED should be set, but not both
    if (flags & MAP_PRIVATE as i32 == 0) == (flags & MAP_SHARED as i32 == 0) {
        return Err(syscall_error(Errno::EINVAL, "mmap", "invalid flags"));
    }

    if len == 0 {
        return Err(syscall_error(Errno::EINVAL, "mmap", "length cannot be zero"));
    }

    // check if the provided address is multiple of pages
    if round_up_page(addr) != Some(addr) {
        return Err(syscall_error(Errno::EINVAL, "mmap", "address is not aligned"));
    }

    // offset should be non-negative and multiple of pages
    if off < 0 {
        return Err(syscall_error(Errno::EINVAL, "mmap", "offset cannot be negative"));
    }
    if round_up_page(off as u64) != Some(off as u64) {
        return Err(syscall_error(Errno::EINVAL, "mmap", "offset is not aligned"));
    }

    let backing = if flags & MAP_ANONYMOUS as i32 > 0 {
        MemoryBackingType::Anonymous
    } else if fd < 0 {
        return Err(syscall_error(Errno::EBADF, "mmap", "file mapping without a file"));
    } else {
        MemoryBackingType::FileDescriptor(fd as u64)
    };

    let npages = npages_of(len)
        .ok_or_else(|| syscall_error(Errno::ENOMEM, "mmap", "length too large"))?;

    let mut vmmap = cage.vmmap.write();

    let page_num = if flags & MAP_FIXED as i32 == 0 {
        // pick an address of appropriate size, anywhere, or above the hint
        let space = if addr == 0 {
            vmmap.find_map_space(npages, 1)
        } else {
            let hint = u32::try_from(addr >> PAGESHIFT).unwrap_or(u32::MAX);
            vmmap.find_map_space_with_hint(npages, 1, hint)
        };
        match space {
            Some(space) => space.start,
            None => return Err(syscall_error(Errno::ENOMEM, "mmap", "no memory")),
        }
    } else {
        u32::try_from(addr >> PAGESHIFT)
            .map_err(|_| syscall_error(Errno::ENOMEM, "mmap", "address out of range"))?
    };

    let entry = VmmapEntry::new(
        page_num,
        npages,
        prot,
        PROT_READ | PROT_WRITE,
        flags | MAP_FIXED as i32,
        off,
        len as i64,
        backing,
    );
    vmmap
        .add_entry_with_overwrite(entry)
        .map_err(|e| syscall_error(Errno::ENOMEM, "mmap", &e.to_string()))?;

    let useraddr = page_num << PAGESHIFT;
    debug!(
        "mmap: cage {} mapped {:#x} pages at {:#x}",
        cageid, npages, useraddr
    );
    Ok(useraddr)
}

/// Handles `munmap`, dropping the page range from the `vmmap`.
///
/// Pages in the range that were never mapped are ignored; regions straddling the range
/// are trimmed.
///
/// # Arguments
/// * `cageid` - Identifier of the cage that calls the `munmap`
/// * `addr` - Starting address of the region to unmap
/// * `len` - Length of the region to unmap
pub fn munmap_handler(cageid: u64, addr: u64, len: u64) -> Result<(), Errno> {
    if len == 0 {
        return Err(syscall_error(Errno::EINVAL, "munmap", "length cannot be zero"));
    }
    let cage = get_cage(cageid).ok_or(Errno::ESRCH)?;

    // check if the provided address is multiple of pages
    if round_up_page(addr) != Some(addr) {
        return Err(syscall_error(Errno::EINVAL, "munmap", "address is not aligned"));
    }

    let page_num = u32::try_from(addr >> PAGESHIFT)
        .map_err(|_| syscall_error(Errno::EINVAL, "munmap", "address out of range"))?;
    // anything past the page range is unmapped already
    let npages = npages_of(len).unwrap_or(u32::MAX);

    let mut vmmap = cage.vmmap.write();
    vmmap
        .remove_range(page_num, npages)
        .map_err(|e| syscall_error(Errno::EINVAL, "munmap", &e.to_string()))
}

/// Handles `mprotect`, changing the protection recorded for a page range.
///
/// Every page in the range must already be mapped, and `prot` must stay within each
/// region's maximum protection.
pub fn mprotect_handler(cageid: u64, addr: u64, len: u64, prot: i32) -> Result<(), Errno> {
    let cage = get_cage(cageid).ok_or(Errno::ESRCH)?;

    if prot & PROT_EXEC > 0 {
        return Err(syscall_error(Errno::EINVAL, "mprotect", "PROT_EXEC is not allowed"));
    }
    if round_up_page(addr) != Some(addr) {
        return Err(syscall_error(Errno::EINVAL, "mprotect", "address is not aligned"));
    }
    if len == 0 {
        return Ok(());
    }

    let page_num = u32::try_from(addr >> PAGESHIFT)
        .map_err(|_| syscall_error(Errno::ENOMEM, "mprotect", "address out of range"))?;
    let npages = npages_of(len)
        .ok_or_else(|| syscall_error(Errno::ENOMEM, "mprotect", "length too large"))?;

    let mut vmmap = cage.vmmap.write();
    if !vmmap.check_existing_mapping(page_num, npages, prot) {
        return Err(syscall_error(
            Errno::ENOMEM,
            "mprotect",
            "range is not fully mapped with a compatible maximum protection",
        ));
    }
    vmmap
        .change_prot(page_num, npages, prot)
        .map_err(|e| syscall_error(Errno::ENOMEM, "mprotect", &e.to_string()))
}

/// Handles `brk`, moving the program break.
///
/// The heap is the region starting at page `HEAP_ENTRY_INDEX`; moving the break resizes it
/// to end at the new break. Growing fails with `ENOMEM` if anything is mapped between the old
/// and the new break.
///
/// # Arguments
/// * `cageid` - Identifier of the cage that initiated the `brk`.
/// * `brk` - The new program break address.
pub fn brk_handler(cageid: u64, brk: u64) -> Result<(), Errno> {
    let cage = get_cage(cageid).ok_or(Errno::ESRCH)?;
    let mut vmmap = cage.vmmap.write();

    // round up the break to multiple of pages
    let brk_page =
        npages_of(brk).ok_or_else(|| syscall_error(Errno::ENOMEM, "brk", "break out of range"))?;
    let old_brk_page = vmmap.program_break;

    let mut heap = match vmmap.find_page(HEAP_ENTRY_INDEX) {
        Some(heap) => heap.clone(),
        None => VmmapEntry::new(
            HEAP_ENTRY_INDEX,
            0,
            PROT_READ | PROT_WRITE,
            PROT_READ | PROT_WRITE,
            (MAP_PRIVATE | MAP_ANONYMOUS) as i32,
            0,
            0,
            MemoryBackingType::Anonymous,
        ),
    };

    // if we are incrementing program break, we need to check if we have enough space
    if brk_page > old_brk_page {
        if brk_page > vmmap.end_address {
            return Err(syscall_error(Errno::ENOMEM, "brk", "no memory"));
        }
        if let Some(next) = vmmap.find_vma(old_brk_page) {
            if next.page_num < brk_page {
                return Err(syscall_error(Errno::ENOMEM, "brk", "no memory"));
            }
        }
    }

    let span = brk_page.max(old_brk_page);
    if span > 0 {
        vmmap
            .remove_range(HEAP_ENTRY_INDEX, span)
            .map_err(|e| syscall_error(Errno::ENOMEM, "brk", &e.to_string()))?;
    }
    if brk_page > 0 {
        heap.npages = brk_page;
        vmmap
            .add_entry(heap)
            .map_err(|e| syscall_error(Errno::ENOMEM, "brk", &e.to_string()))?;
    }

    vmmap.set_program_break(brk_page);
    debug!(
        "brk: cage {} break {:#x} -> {:#x} pages",
        cageid, old_brk_page, brk_page
    );
    Ok(())
}

/// Handles `sbrk`: moves the program break by `increment` bytes, rounded to whole pages.
///
/// # Returns
/// * `u64` - the previous program break address. `sbrk(0)` just reports the current break.
pub fn sbrk_handler(cageid: u64, increment: i32) -> Result<u64, Errno> {
    let cage = get_cage(cageid).ok_or(Errno::ESRCH)?;

    let old_brk_page = cage.vmmap.read().program_break;
    let old_brk = u64::from(PAGESIZE) * u64::from(old_brk_page);

    // pass 0 to sbrk will just return the current brk
    if increment == 0 {
        return Ok(old_brk);
    }

    // brk increment could possibly be negative
    let magnitude = npages_of(u64::from(increment.unsigned_abs()))
        .ok_or_else(|| syscall_error(Errno::ENOMEM, "sbrk", "increment too large"))?;
    let delta_pages = if increment < 0 {
        -i64::from(magnitude)
    } else {
        i64::from(magnitude)
    };
    let new_brk_page = i64::from(old_brk_page) + delta_pages;
    if new_brk_page < 0 {
        return Err(syscall_error(Errno::ENOMEM, "sbrk", "break below heap start"));
    }

    brk_handler(cageid, (new_brk_page as u64) << PAGESHIFT)?;
    Ok(old_brk)
}

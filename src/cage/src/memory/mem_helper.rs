//! VMMAP helper functions
//!
//! This file provides helper functions related to vmmap, including address alignment,
//! initializing vmmap, handling vmmap during a fork, and address translation and
//! validation related to vmmap
use crate::cage::{get_cage, Cage};
use crate::err_const::{syscall_error, Errno};
use crate::memory::vmmap::{MemoryBackingType, VmmapEntry, VmmapOps};
use crate::memory::vmmap_constants::*;

/// Round up the address length to be multiple of pages
///
/// # Arguments
/// * `length` - length of the address
///
/// # Returns
/// * `Some(u64)` - rounded up length
/// * `None` - rounding would overflow
pub fn round_up_page(length: u64) -> Option<u64> {
    length.checked_next_multiple_of(PAGESIZE as u64)
}

/// Number of whole pages needed to hold `length` bytes, None if it does not fit the
/// 32-bit page range
pub fn npages_of(length: u64) -> Option<u32> {
    round_up_page(length).and_then(|rounded| u32::try_from(rounded >> PAGESHIFT).ok())
}

// First page and page count spanned by [arg, arg + length), None when the span
// leaves the 32-bit page range
fn page_span(arg: u64, length: usize) -> Option<(u32, u32)> {
    let end = arg
        .checked_add(length as u64)?
        .checked_add(PAGESIZE as u64 - 1)?
        >> PAGESHIFT;
    let page_num = u32::try_from(arg >> PAGESHIFT).ok()?;
    let end_page = u32::try_from(end).ok()?;
    Some((page_num, end_page - page_num))
}

/// Sets the wasm linear memory base address, and the initial heap if one is given.
///
/// The heap occupies pages `[0, program_break)` and is private anonymous read/write
/// memory.
pub fn init_vmmap_helper(
    cageid: u64,
    base_address: usize,
    program_break: Option<u32>,
) -> Result<(), Errno> {
    let cage = get_cage(cageid).ok_or(Errno::ESRCH)?;
    let mut vmmap = cage.vmmap.write();
    vmmap.set_base_address(base_address);

    if let Some(program_break) = program_break {
        if program_break > 0 {
            let heap = VmmapEntry::new(
                HEAP_ENTRY_INDEX,
                program_break,
                PROT_READ | PROT_WRITE,
                PROT_READ | PROT_WRITE,
                (MAP_PRIVATE | MAP_ANONYMOUS) as i32,
                0,
                0,
                MemoryBackingType::Anonymous,
            );
            vmmap
                .add_entry_with_overwrite(heap)
                .map_err(|_| syscall_error(Errno::ENOMEM, "init_vmmap", "heap does not fit"))?;
        }
        vmmap.set_program_break(program_break);
    }
    Ok(())
}

/// Copies the parent's memory layout into the child, right after a fork.
///
/// The child's `vmmap` becomes an exact copy of the parent's, program break included.
/// Subsequent changes to either `vmmap` do not affect the other.
///
/// # Arguments
/// * `parent_cageid` - cageid of parent
/// * `child_cageid` - cageid of child
pub fn fork_vmmap_helper(parent_cageid: u64, child_cageid: u64) -> Result<(), Errno> {
    if parent_cageid == child_cageid {
        return Err(syscall_error(
            Errno::EINVAL,
            "fork_vmmap",
            "a cage cannot fork into itself",
        ));
    }
    let parent_cage = get_cage(parent_cageid).ok_or(Errno::ESRCH)?;
    let child_cage = get_cage(child_cageid).ok_or(Errno::ESRCH)?;
    let parent_vmmap = parent_cage.vmmap.read();
    let mut child_vmmap = child_cage.vmmap.write();
    child_vmmap.fork_from(&parent_vmmap);
    Ok(())
}

/// Validates and converts a virtual memory address to a system address with protection checks
///
/// # Arguments
/// * `cageid` - cage whose virtual memory map is consulted
/// * `arg` - Virtual memory address to check and convert
/// * `length` - Length of the memory region being accessed
/// * `prot` - Protection flags to validate (read/write/execute)
///
/// # Returns
/// * `Ok(u64)` - System memory address if validation succeeds
/// * `Err(Errno)` - EFAULT if memory access would be invalid
pub fn check_and_convert_addr_ext(
    cageid: u64,
    arg: u64,
    length: usize,
    prot: i32,
) -> Result<u64, Errno> {
    let cage = get_cage(cageid).ok_or(Errno::ESRCH)?;

    // check_addr_mapping updates the lookup cache, hence the write lock
    let mut vmmap = cage.vmmap.write();

    let (page_num, npages) = page_span(arg, length).ok_or(Errno::EFAULT)?;
    if vmmap.check_addr_mapping(page_num, npages, prot).is_none() {
        return Err(Errno::EFAULT);
    }

    let base = vmmap.base_address.ok_or(Errno::EFAULT)?;
    Ok(base as u64 + arg)
}

pub fn check_addr(cageid: u64, arg: u64, length: usize, prot: i32) -> Result<bool, Errno> {
    let cage = get_cage(cageid).ok_or(Errno::ESRCH)?;
    let mut vmmap = cage.vmmap.write();

    let (page_num, npages) = page_span(arg, length).ok_or(Errno::EFAULT)?;
    if vmmap.check_addr_mapping(page_num, npages, prot).is_none() {
        return Err(Errno::EFAULT);
    }
    Ok(true)
}

/// This function translates a virtual memory address to a system address by adding the base
/// address of the vmmap to the argument.
///
/// # Returns
/// * `Ok(u64)` - Translated system memory address
/// * `Err(Errno::EFAULT)` - the base address has not been set yet
pub fn translate_vmmap_addr(cage: &Cage, arg: u64) -> Result<u64, Errno> {
    let vmmap = cage.vmmap.read();
    vmmap
        .base_address
        .map(|base| base as u64 + arg)
        .ok_or(Errno::EFAULT)
}

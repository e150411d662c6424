pub const PROT_READ: i32 = 0x1; /* Page can be read.  */
pub const PROT_WRITE: i32 = 0x2; /* Page can be written.  */
pub const PROT_EXEC: i32 = 0x4; /* Page can be executed.  */
pub const PROT_NONE: i32 = 0x0; /* Page can not be accessed.  */

pub const MAP_SHARED: u32 = 0x01; /* Share changes.  */
pub const MAP_PRIVATE: u32 = 0x02; /* Changes are private.  */
pub const MAP_FIXED: u32 = 0x10; /* Interpret addr exactly.  */
pub const MAP_ANONYMOUS: u32 = 0x20; /* Don't use a file.  */

/* this must be a multiple of the system page size */
pub const PAGESHIFT: u32 = 12;
pub const PAGESIZE: u32 = 1 << PAGESHIFT;

/// Number of pages in a 32-bit address space, i.e. 4 GB with 4 KB pages.
pub const DEFAULT_VMMAP_SIZE: u32 = 1 << (32 - PAGESHIFT);

/// The heap occupies pages [0, program break)
pub const HEAP_ENTRY_INDEX: u32 = 0;

pub const MAX_CAGEID: usize = 1024;

//! This module is VMMAP specific
pub mod mem_helper;
pub mod memory;
pub mod vmmap;
pub mod vmmap_constants;

pub use mem_helper::*;
pub use memory::*;
pub use vmmap::*;
pub use vmmap_constants::*;

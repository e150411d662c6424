//! This file contains the Cage structure and the global table cages are registered in.
//! A cage is an isolated process; here it only carries what the memory calls need:
//! its identity and its vmmap.
use crate::memory::vmmap::Vmmap;
use crate::memory::vmmap_constants::MAX_CAGEID;
use log::debug;
pub use once_cell::sync::Lazy;
/// Uses spinlocks first (for short waits) and parks threads when blocking to reduce kernel
/// interaction and increases efficiency.
pub use parking_lot::RwLock;
pub use std::sync::Arc;

#[derive(Debug)]
pub struct Cage {
    // Identifying ID number for this cage
    pub cageid: u64,
    pub parent: u64,
    pub vmmap: RwLock<Vmmap>,
}

impl Cage {
    pub fn new(cageid: u64, parent: u64) -> Self {
        Cage {
            cageid,
            parent,
            vmmap: RwLock::new(Vmmap::new()),
        }
    }
}

/// We achieve an O(1) complexity for our cage map implementation through the following three approaches:
///
/// Direct Indexing with `cageid`:
///     `cageid` directly as the index to access the `Vec`, allowing O(1) complexity for lookup, insertion,
///     and deletion.
/// `Vec<Option<Arc<Cage>>>` for Efficient Deletion:
///     When deleting an entry, we replace it with `None` instead of restructuring the `Vec`.
/// `RwLock` for Concurrent Access Control:
///     Writes occur only when cages are created or exit, so lookups rarely contend.
///
/// Pre-allocate MAX_CAGEID elements, all initialized to None.
/// Lazy causes `CAGE_MAP` to be initialized when it is first accessed, rather than when the program starts.
pub static CAGE_MAP: Lazy<RwLock<Vec<Option<Arc<Cage>>>>> = Lazy::new(|| {
    let mut vec = Vec::with_capacity(MAX_CAGEID);
    vec.resize_with(MAX_CAGEID, || None);
    RwLock::new(vec)
});

pub fn check_cageid(cageid: u64) {
    if cageid >= MAX_CAGEID as u64 {
        panic!("Cage ID is outside of valid range");
    }
}

/// Add a cage to `CAGE_MAP` and map `cageid` to its index
pub fn add_cage(cageid: u64, cage: Cage) {
    check_cageid(cageid);
    debug!("cage table: add cage {}", cageid);
    let mut list = CAGE_MAP.write();
    list[cageid as usize] = Some(Arc::new(cage));
}

/// Delete the cage from `CAGE_MAP` by `cageid` as index
pub fn remove_cage(cageid: u64) -> Option<Arc<Cage>> {
    check_cageid(cageid);
    debug!("cage table: remove cage {}", cageid);
    let mut list = CAGE_MAP.write();
    list[cageid as usize].take()
}

/// Get the cage's `Arc` reference via `cageid`
/// Error handling (when `Cage` is None) happens when calling
pub fn get_cage(cageid: u64) -> Option<Arc<Cage>> {
    let list = CAGE_MAP.read();
    list.get(cageid as usize).and_then(|cage| cage.clone())
}

// Clear `CAGE_MAP` and exit all existing cages
//
// Return:
//     Will return a list of the cageids that were registered
pub fn cagetable_clear() -> Vec<u64> {
    let mut exitvec = Vec::new();
    let mut list = CAGE_MAP.write();
    for (cageid, cage) in list.iter_mut().enumerate() {
        if cage.take().is_some() {
            exitvec.push(cageid as u64);
        }
    }
    exitvec
}

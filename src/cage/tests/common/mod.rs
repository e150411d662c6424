// ---------- Test helper functions ----------
#![allow(dead_code)]
use ::cage::{add_cage, cagetable_clear, get_cage, init_vmmap_helper, Cage, VmmapOps};

pub const PAGE: u64 = ::cage::PAGESIZE as u64;

/// Route `log` output through the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Clear the cage table so each test starts from a clean state.
pub fn clear_globals() {
    init_logging();
    cagetable_clear();
}

/// Register a cage with its base address set and a heap of `heap_pages` pages.
pub fn new_cage(cageid: u64, heap_pages: u32) {
    add_cage(cageid, Cage::new(cageid, 1));
    init_vmmap_helper(cageid, 0x4000_0000, Some(heap_pages)).expect("cage was just added");
}

/// (start page, end page, prot) of every region of a cage, lowest first.
pub fn regions(cageid: u64) -> Vec<(u32, u32, i32)> {
    let cage = get_cage(cageid).expect("cage is registered");
    let vmmap = cage.vmmap.read();
    vmmap
        .iter()
        .map(|entry| (entry.page_num, entry.end_page(), entry.prot))
        .collect()
}

/// Panics if the cage's vmmap is inconsistent.
pub fn assert_valid(cageid: u64) {
    let cage = get_cage(cageid).expect("cage is registered");
    let vmmap = cage.vmmap.read();
    vmmap.validate().expect("vmmap should stay consistent");
}

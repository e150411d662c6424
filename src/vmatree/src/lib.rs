//! AVL interval index for virtual memory regions
//!
//! `VmaTree` maps a region's key (normally its end page or end address) to the
//! region object that owns it, and answers exact, neighbor and "first region
//! above" lookups in logarithmic time. Regions are assumed to be pairwise
//! non-overlapping, so ordering by end address is the same as ordering by start
//! address. The index never checks for overlap; that policy belongs to the
//! memory map that owns the tree.
//!
//! Nodes never store a parent pointer. Every mutation records the chain of
//! child slots it followed on an explicit stack and the rebalance engine walks
//! that stack back up, restoring the AVL height invariant with at most one
//! single or double rotation per ancestor.
//!
//! The tree is not internally synchronized. Callers serialize mutations, the
//! same way a cage serializes access to its `Vmmap` through an address-space
//! lock.
pub mod check;
pub mod error;
pub mod insert;
pub mod iter;
pub mod node;
pub mod query;
mod rebalance;
pub mod remove;
pub mod tree;

pub use error::*;
pub use insert::Inserted;
pub use iter::Iter;
pub use node::NodeId;
pub use tree::VmaTree;

//! Insert operation
use crate::error::DuplicateKey;
use crate::node::{Node, NodeId, Slot};
use crate::tree::VmaTree;
use std::cmp::Ordering;
use std::fmt::Debug;

/// Result of `insert_with_neighbors`.
///
/// `prev` and `next` are the in-order predecessor and successor of the new key
/// at the moment it was inserted.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Inserted {
    pub id: NodeId,
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
}

impl<K: Ord + Debug, V> VmaTree<K, V> {
    /// Indexes `value` under `key` as a new leaf and rebalances the path that
    /// led to it.
    ///
    /// The tree grows by at most one level. A key that is already present is
    /// refused and the pair is returned untouched.
    pub fn insert(&mut self, key: K, value: V) -> Result<NodeId, DuplicateKey<K, V>> {
        self.insert_with_neighbors(key, value)
            .map(|inserted| inserted.id)
    }

    /// Same as `insert`, also reporting the neighbors met during the descent.
    ///
    /// Every time the walk turns left the current node is the closest
    /// successor seen so far, every time it turns right it is the closest
    /// predecessor. Callers keeping the regions on an ordered list use the pair
    /// to splice the new region in without a second search.
    pub fn insert_with_neighbors(
        &mut self,
        key: K,
        value: V,
    ) -> Result<Inserted, DuplicateKey<K, V>> {
        let mut path = Vec::with_capacity(self.height() as usize + 1);
        let mut prev = None;
        let mut next = None;
        let mut slot = Slot::Root;

        while let Some(id) = self.slot_get(slot) {
            path.push(slot);
            slot = match key.cmp(&self.nodes[id].key) {
                Ordering::Less => {
                    next = Some(id);
                    Slot::Left(id)
                }
                Ordering::Greater => {
                    prev = Some(id);
                    Slot::Right(id)
                }
                Ordering::Equal => return Err(DuplicateKey { key, value }),
            };
        }

        let id = self.nodes.alloc(Node::leaf(key, value));
        self.slot_set(slot, Some(id));
        self.rebalance(&path);

        #[cfg(feature = "debug-checks")]
        self.assert_consistent("insert");

        Ok(Inserted { id, prev, next })
    }
}

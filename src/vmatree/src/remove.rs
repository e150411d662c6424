//! Delete operation
use crate::error::{Result, VmaTreeError};
use crate::node::{NodeId, Slot};
use crate::tree::VmaTree;
use std::cmp::Ordering;
use std::fmt::Debug;

impl<K: Ord + Debug, V> VmaTree<K, V> {
    /// Removes the region indexed under `key` and hands it back to the caller.
    ///
    /// Returns `VmaTreeError::NotFound` when nothing is indexed under `key`.
    /// The tree shrinks by at most one level.
    pub fn remove(&mut self, key: &K) -> Result<(K, V)> {
        let (path, found) = self.path_to(key);
        match found {
            Some(id) => self.unlink(id, path),
            None => Err(VmaTreeError::NotFound),
        }
    }

    /// Removes the node behind a handle obtained from this tree.
    pub fn remove_id(&mut self, id: NodeId) -> Result<(K, V)> {
        let (path, found) = {
            let key = &self.node(id)?.key;
            self.path_to(key)
        };
        match found {
            Some(found) if found == id => self.unlink(id, path),
            _ => Err(VmaTreeError::StaleHandle(id.index())),
        }
    }

    // Slots followed from the root down to the node holding `key`, that node's
    // own slot last.
    fn path_to(&self, key: &K) -> (Vec<Slot>, Option<NodeId>) {
        let mut path = Vec::with_capacity(self.height() as usize + 1);
        let mut slot = Slot::Root;
        while let Some(id) = self.slot_get(slot) {
            path.push(slot);
            slot = match key.cmp(&self.nodes[id].key) {
                Ordering::Less => Slot::Left(id),
                Ordering::Greater => Slot::Right(id),
                Ordering::Equal => return (path, Some(id)),
            };
        }
        (path, None)
    }

    /// Splices `id` out of the tree. `path` ends with the slot holding `id`.
    ///
    /// Without a left child the right child simply takes its place. Otherwise
    /// the in-order predecessor (rightmost node of the left subtree) is cut
    /// from its old position and moved into `id`'s slot, inheriting its
    /// children and height. The detour down to the predecessor is appended to
    /// the path so the rebalance covers every node whose subtree changed.
    fn unlink(&mut self, id: NodeId, mut path: Vec<Slot>) -> Result<(K, V)> {
        let Some(&slot) = path.last() else {
            return Err(VmaTreeError::StaleHandle(id.index()));
        };
        let (left, right) = {
            let node = &self.nodes[id];
            (node.left, node.right)
        };

        match left {
            None => {
                self.slot_set(slot, right);
                path.pop();
            }
            Some(left) => {
                let detour_start = path.len();
                let mut pred_slot = Slot::Left(id);
                let mut pred = left;
                while let Some(next) = self.nodes[pred].right {
                    path.push(pred_slot);
                    pred_slot = Slot::Right(pred);
                    pred = next;
                }

                let pred_left = self.nodes[pred].left;
                self.slot_set(pred_slot, pred_left);

                // Read after the cut: when the predecessor was the direct left
                // child, the deleted node's left link changed just above.
                let (left, right, height) = {
                    let node = &self.nodes[id];
                    (node.left, node.right, node.height)
                };
                let moved = &mut self.nodes[pred];
                moved.left = left;
                moved.right = right;
                moved.height = height;
                self.slot_set(slot, Some(pred));

                if let Some(first_detour) = path.get_mut(detour_start) {
                    *first_detour = Slot::Left(pred);
                }
            }
        }

        self.rebalance(&path);

        #[cfg(feature = "debug-checks")]
        self.assert_consistent("remove");

        self.nodes
            .free(id)
            .map(|node| (node.key, node.value))
            .ok_or(VmaTreeError::StaleHandle(id.index()))
    }
}

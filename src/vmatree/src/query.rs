//! Read-only queries: neighbors, first-above, in-order stepping.
//!
//! None of these mutate the tree.
use crate::error::Result;
use crate::node::NodeId;
use crate::tree::VmaTree;
use std::cmp::Ordering;

impl<K: Ord, V> VmaTree<K, V> {
    /// In-order predecessor and successor of `key`.
    ///
    /// Walking down, a right turn makes the current node the best predecessor
    /// so far and a left turn the best successor. If the walk stops on `key`
    /// itself, the rightmost node of its left subtree and the leftmost node of
    /// its right subtree are closer still. `key` need not be indexed, and is
    /// never reported as its own neighbor.
    pub fn neighbors(&self, key: &K) -> (Option<NodeId>, Option<NodeId>) {
        let mut prev = None;
        let mut next = None;
        let mut link = self.root;

        while let Some(id) = link {
            let node = &self.nodes[id];
            link = match key.cmp(&node.key) {
                Ordering::Less => {
                    next = Some(id);
                    node.left
                }
                Ordering::Greater => {
                    prev = Some(id);
                    node.right
                }
                Ordering::Equal => {
                    if let Some(left) = node.left {
                        prev = Some(self.rightmost(left));
                    }
                    if let Some(right) = node.right {
                        next = Some(self.leftmost(right));
                    }
                    break;
                }
            };
        }
        (prev, next)
    }

    /// The node with the smallest key strictly greater than `key`.
    ///
    /// With regions keyed by their (exclusive) end address this is the first
    /// region ending above an address: the region containing it if there is
    /// one, otherwise the next region up.
    pub fn find_first_above(&self, key: &K) -> Option<NodeId> {
        let mut best = None;
        let mut link = self.root;
        while let Some(id) = link {
            let node = &self.nodes[id];
            if node.key > *key {
                best = Some(id);
                link = node.left;
            } else {
                link = node.right;
            }
        }
        best
    }

    /// The node with the largest key strictly less than `key`.
    pub fn find_last_below(&self, key: &K) -> Option<NodeId> {
        let mut best = None;
        let mut link = self.root;
        while let Some(id) = link {
            let node = &self.nodes[id];
            if node.key < *key {
                best = Some(id);
                link = node.right;
            } else {
                link = node.left;
            }
        }
        best
    }

    /// In-order successor of the node behind `id`.
    pub fn next(&self, id: NodeId) -> Result<Option<NodeId>> {
        let node = self.node(id)?;
        Ok(match node.right {
            Some(right) => Some(self.leftmost(right)),
            None => self.find_first_above(&node.key),
        })
    }

    /// In-order predecessor of the node behind `id`.
    pub fn prev(&self, id: NodeId) -> Result<Option<NodeId>> {
        let node = self.node(id)?;
        Ok(match node.left {
            Some(left) => Some(self.rightmost(left)),
            None => self.find_last_below(&node.key),
        })
    }
}

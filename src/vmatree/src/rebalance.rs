//! Rebalance engine
//!
//! Given the slots followed on the way down to a structural change, restore the
//! AVL height invariant bottom-up. Only the nodes on that one root-to-leaf path
//! can have changed height, so walking the recorded path outward is enough.
use crate::node::{NodeId, Slot};
use crate::tree::VmaTree;
use log::trace;

impl<K, V> VmaTree<K, V> {
    /// Walks `path` from the deepest slot outward.
    ///
    /// A balanced node whose recomputed height equals its cached height ends
    /// the walk: nothing above it can have changed. A node that is out of
    /// balance by two is rotated and the walk continues, since a rotation after
    /// a removal may shorten the subtree.
    pub(crate) fn rebalance(&mut self, path: &[Slot]) {
        for &slot in path.iter().rev() {
            let Some(id) = self.slot_get(slot) else {
                continue;
            };
            let (left, right) = {
                let node = &self.nodes[id];
                (node.left, node.right)
            };
            let left_height = self.height_of(left);
            let right_height = self.height_of(right);

            if right_height + 1 < left_height {
                let new_root = self.fix_left_heavy(id);
                self.slot_set(slot, Some(new_root));
            } else if left_height + 1 < right_height {
                let new_root = self.fix_right_heavy(id);
                self.slot_set(slot, Some(new_root));
            } else {
                let height = 1 + left_height.max(right_height);
                if height == self.nodes[id].height {
                    break;
                }
                self.nodes[id].height = height;
            }
        }
    }

    // Left subtree is two taller than the right one.
    fn fix_left_heavy(&mut self, id: NodeId) -> NodeId {
        let Some(left) = self.nodes[id].left else {
            unreachable!("left-heavy node without a left child");
        };
        let near = self.nodes[left].left;
        let far = self.nodes[left].right;

        if self.height_of(near) >= self.height_of(far) {
            trace!("single right rotation at {:?}", id);
            self.rotate_right(id)
        } else {
            trace!("double left-right rotation at {:?}", id);
            let pivot = self.rotate_left(left);
            self.nodes[id].left = Some(pivot);
            self.rotate_right(id)
        }
    }

    // Right subtree is two taller than the left one.
    fn fix_right_heavy(&mut self, id: NodeId) -> NodeId {
        let Some(right) = self.nodes[id].right else {
            unreachable!("right-heavy node without a right child");
        };
        let near = self.nodes[right].right;
        let far = self.nodes[right].left;

        if self.height_of(near) >= self.height_of(far) {
            trace!("single left rotation at {:?}", id);
            self.rotate_left(id)
        } else {
            trace!("double right-left rotation at {:?}", id);
            let pivot = self.rotate_right(right);
            self.nodes[id].right = Some(pivot);
            self.rotate_left(id)
        }
    }

    /// The left child becomes the subtree root; its right subtree moves under
    /// the old root. Returns the new subtree root.
    fn rotate_right(&mut self, id: NodeId) -> NodeId {
        let Some(pivot) = self.nodes[id].left else {
            unreachable!("right rotation without a left child");
        };
        self.nodes[id].left = self.nodes[pivot].right;
        self.nodes[pivot].right = Some(id);
        self.update_height(id);
        self.update_height(pivot);
        pivot
    }

    /// Mirror of `rotate_right`.
    fn rotate_left(&mut self, id: NodeId) -> NodeId {
        let Some(pivot) = self.nodes[id].right else {
            unreachable!("left rotation without a right child");
        };
        self.nodes[id].right = self.nodes[pivot].left;
        self.nodes[pivot].left = Some(id);
        self.update_height(id);
        self.update_height(pivot);
        pivot
    }

    // Children must already carry correct heights.
    fn update_height(&mut self, id: NodeId) {
        let node = &self.nodes[id];
        let height = 1 + self.height_of(node.left).max(self.height_of(node.right));
        self.nodes[id].height = height;
    }
}

#[cfg(test)]
mod tests {
    use crate::node::Slot;
    use crate::VmaTree;

    fn shape(tree: &VmaTree<u32, ()>) -> Option<(u32, Option<u32>, Option<u32>)> {
        let root = tree.root()?;
        let key = |id| tree.key(id).copied();
        Some((
            *tree.key(root)?,
            tree.left(root).and_then(key),
            tree.right(root).and_then(key),
        ))
    }

    #[test]
    fn right_rotation_on_left_left_chain() {
        let mut tree = VmaTree::new();
        for key in [30u32, 20, 10] {
            tree.insert(key, ()).unwrap();
        }
        assert_eq!(shape(&tree), Some((20, Some(10), Some(30))));
        assert_eq!(tree.height(), 2);
    }

    #[test]
    fn right_left_double_rotation() {
        let mut tree = VmaTree::new();
        for key in [10u32, 30, 20] {
            tree.insert(key, ()).unwrap();
        }
        assert_eq!(shape(&tree), Some((20, Some(10), Some(30))));
        tree.validate().unwrap();
    }

    #[test]
    fn balanced_path_stops_without_touching_ancestors() {
        let mut tree = VmaTree::new();
        for key in [20u32, 10, 30] {
            tree.insert(key, ()).unwrap();
        }
        let root = tree.root().unwrap();
        // Corrupt the root's cached height; a rebalance that stops early at the
        // unchanged child must leave it alone.
        tree.nodes[root].height = 9;
        let left = tree.left(root).unwrap();
        tree.rebalance(&[Slot::Root, Slot::Left(root)]);
        assert_eq!(tree.node_height(left), Some(1));
        assert_eq!(tree.node_height(root), Some(9));
    }
}

//! Consistency checking
//!
//! `validate` recomputes the whole tree and compares it against the cached
//! state: every stored height, the AVL balance bound and strict in-order key
//! ordering. It is O(n) and meant for tests and the `debug-checks` feature,
//! never for the lookup path.
use crate::error::{Result, VmaTreeError};
use crate::node::NodeId;
use crate::tree::VmaTree;
use std::fmt::Debug;

impl<K: Ord + Debug, V> VmaTree<K, V> {
    pub fn validate(&self) -> Result<()> {
        let mut count = 0;
        self.check_heights(self.root, 1, &mut count)?;
        self.check_order()?;
        if count != self.len() {
            return Err(VmaTreeError::InvariantViolated {
                key: "<root>".to_string(),
                reason: format!("{} nodes reachable, {} allocated", count, self.len()),
            });
        }
        Ok(())
    }

    // Returns the recomputed height of the subtree at `link`. No path in a tree of
    // `len` nodes is longer than `len`, so a deeper walk means the links loop.
    fn check_heights(
        &self,
        link: Option<NodeId>,
        depth: usize,
        count: &mut usize,
    ) -> Result<u32> {
        let Some(id) = link else {
            return Ok(0);
        };
        if depth > self.len() {
            return Err(self.violation(id, format!("link cycle below depth {}", self.len())));
        }
        *count += 1;
        let node = &self.nodes[id];
        let left = self.check_heights(node.left, depth + 1, count)?;
        let right = self.check_heights(node.right, depth + 1, count)?;

        if left.abs_diff(right) > 1 {
            return Err(self.violation(id, format!("unbalanced: left {} right {}", left, right)));
        }
        let height = 1 + left.max(right);
        if height != node.height {
            return Err(self.violation(
                id,
                format!("cached height {} but subtree height {}", node.height, height),
            ));
        }
        Ok(height)
    }

    fn check_order(&self) -> Result<()> {
        let mut iter = self.iter().map(|(key, _)| key);
        let Some(mut prev) = iter.next() else {
            return Ok(());
        };
        for key in iter {
            if prev >= key {
                return Err(VmaTreeError::InvariantViolated {
                    key: format!("{:?}", key),
                    reason: format!("out of order after {:?}", prev),
                });
            }
            prev = key;
        }
        Ok(())
    }

    fn violation(&self, id: NodeId, reason: String) -> VmaTreeError {
        VmaTreeError::InvariantViolated {
            key: format!("{:?}", self.nodes[id].key),
            reason,
        }
    }

    #[cfg(feature = "debug-checks")]
    pub(crate) fn assert_consistent(&self, op: &str) {
        if let Err(err) = self.validate() {
            log::error!("vmatree corrupted after {}: {}", op, err);
            panic!("vmatree corrupted after {}: {}", op, err);
        }
    }
}

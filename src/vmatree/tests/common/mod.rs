// ---------- Test helper functions ----------
#![allow(dead_code)]
use vmatree::{NodeId, VmaTree};

/// Route `log` output through the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Insert `keys` in order, each mapped to its own value.
pub fn build(keys: &[u64]) -> VmaTree<u64, u64> {
    let mut tree = VmaTree::new();
    for &key in keys {
        tree.insert(key, key).expect("keys in a fixture are unique");
    }
    tree
}

/// Keys in in-order traversal order.
pub fn in_order(tree: &VmaTree<u64, u64>) -> Vec<u64> {
    tree.keys().copied().collect()
}

/// Pre-order dump of (key, height), enough to compare two tree shapes.
pub fn snapshot(tree: &VmaTree<u64, u64>) -> Vec<(u64, u32)> {
    fn walk(tree: &VmaTree<u64, u64>, link: Option<NodeId>, out: &mut Vec<(u64, u32)>) {
        if let Some(id) = link {
            out.push((*tree.key(id).unwrap(), tree.node_height(id).unwrap()));
            walk(tree, tree.left(id), out);
            walk(tree, tree.right(id), out);
        }
    }
    let mut out = Vec::new();
    walk(tree, tree.root(), &mut out);
    out
}

pub fn key_of(tree: &VmaTree<u64, u64>, link: Option<NodeId>) -> Option<u64> {
    link.and_then(|id| tree.key(id).copied())
}

/// Proven upper bound on the height of an AVL tree with `n` nodes.
pub fn avl_height_bound(n: usize) -> f64 {
    1.4405 * ((n + 2) as f64).log2() - 0.3277
}

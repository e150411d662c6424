//! In-order iteration
use crate::node::NodeId;
use crate::tree::VmaTree;

/// Double-ended in-order iterator over `(key, value)` pairs.
///
/// Keeps one explicit stack per direction instead of parent links; `remaining`
/// stops the two ends from crossing.
pub struct Iter<'a, K, V> {
    tree: &'a VmaTree<K, V>,
    front: Vec<NodeId>,
    back: Vec<NodeId>,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn push_left(&mut self, mut link: Option<NodeId>) {
        while let Some(id) = link {
            self.front.push(id);
            link = self.tree.nodes[id].left;
        }
    }

    fn push_right(&mut self, mut link: Option<NodeId>) {
        while let Some(id) = link {
            self.back.push(id);
            link = self.tree.nodes[id].right;
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.front.pop()?;
        let tree = self.tree;
        let node = &tree.nodes[id];
        self.push_left(node.right);
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K, V> DoubleEndedIterator for Iter<'a, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.back.pop()?;
        let tree = self.tree;
        let node = &tree.nodes[id];
        self.push_right(node.left);
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }
}

impl<'a, K, V> ExactSizeIterator for Iter<'a, K, V> {}

impl<K, V> VmaTree<K, V> {
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut iter = Iter {
            tree: self,
            front: Vec::new(),
            back: Vec::new(),
            remaining: self.len(),
        };
        iter.push_left(self.root);
        iter.push_right(self.root);
        iter
    }

    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &K> + '_ {
        self.iter().map(|(key, _)| key)
    }
}

impl<'a, K, V> IntoIterator for &'a VmaTree<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

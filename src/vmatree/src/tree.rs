//! `VmaTree` structure and structure-related accessors
//!
//! The tree itself is just an optional root plus the node arena. Empty and
//! non-empty are the only two shapes and every operation is defined on both.
use crate::error::{Result, VmaTreeError};
use crate::node::{Arena, Node, NodeId, Slot};
use std::cmp::Ordering;

/// Self-balancing index of non-overlapping regions keyed by one boundary.
#[derive(Clone, Debug)]
pub struct VmaTree<K, V> {
    pub(crate) root: Option<NodeId>,
    pub(crate) nodes: Arena<K, V>,
}

impl<K, V> Default for VmaTree<K, V> {
    fn default() -> Self {
        VmaTree {
            root: None,
            nodes: Arena::new(),
        }
    }
}

impl<K, V> VmaTree<K, V> {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Height of the whole tree, 0 when empty.
    pub fn height(&self) -> u32 {
        self.height_of(self.root)
    }

    /// Drops every indexed region and resets the arena.
    pub fn clear(&mut self) {
        self.root = None;
        self.nodes.clear();
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn key(&self, id: NodeId) -> Option<&K> {
        self.nodes.get(id).map(|node| &node.key)
    }

    pub fn value(&self, id: NodeId) -> Option<&V> {
        self.nodes.get(id).map(|node| &node.value)
    }

    /// Mutable access to the region object. The key stays out of reach.
    pub fn value_mut(&mut self, id: NodeId) -> Option<&mut V> {
        self.nodes.get_mut(id).map(|node| &mut node.value)
    }

    pub fn entry(&self, id: NodeId) -> Option<(&K, &V)> {
        self.nodes.get(id).map(|node| (&node.key, &node.value))
    }

    pub fn left(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|node| node.left)
    }

    pub fn right(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|node| node.right)
    }

    /// Cached height of the subtree rooted at `id`.
    pub fn node_height(&self, id: NodeId) -> Option<u32> {
        self.nodes.get(id).map(|node| node.height)
    }

    /// Leftmost (lowest keyed) node.
    pub fn first(&self) -> Option<NodeId> {
        self.root.map(|root| self.leftmost(root))
    }

    /// Rightmost (highest keyed) node.
    pub fn last(&self) -> Option<NodeId> {
        self.root.map(|root| self.rightmost(root))
    }

    pub(crate) fn height_of(&self, link: Option<NodeId>) -> u32 {
        link.map_or(0, |id| self.nodes[id].height)
    }

    pub(crate) fn leftmost(&self, mut id: NodeId) -> NodeId {
        while let Some(left) = self.nodes[id].left {
            id = left;
        }
        id
    }

    pub(crate) fn rightmost(&self, mut id: NodeId) -> NodeId {
        while let Some(right) = self.nodes[id].right {
            id = right;
        }
        id
    }

    pub(crate) fn slot_get(&self, slot: Slot) -> Option<NodeId> {
        match slot {
            Slot::Root => self.root,
            Slot::Left(parent) => self.nodes[parent].left,
            Slot::Right(parent) => self.nodes[parent].right,
        }
    }

    pub(crate) fn slot_set(&mut self, slot: Slot, link: Option<NodeId>) {
        match slot {
            Slot::Root => self.root = link,
            Slot::Left(parent) => self.nodes[parent].left = link,
            Slot::Right(parent) => self.nodes[parent].right = link,
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node<K, V>> {
        self.nodes.get(id).ok_or(VmaTreeError::StaleHandle(id.0))
    }
}

impl<K: Ord, V> VmaTree<K, V> {
    /// Exact-match search.
    pub fn find(&self, key: &K) -> Option<NodeId> {
        let mut link = self.root;
        while let Some(id) = link {
            let node = &self.nodes[id];
            link = match key.cmp(&node.key) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return Some(id),
            };
        }
        None
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|id| &self.nodes[id].value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let id = self.find(key)?;
        Some(&mut self.nodes[id].value)
    }
}

//! Node store
//!
//! Nodes live in an arena and refer to their children by `NodeId`. A vacated
//! arena slot is chained onto a free list and reused by the next insert, so a
//! `NodeId` stays valid exactly as long as its node is indexed.

/// Handle to a node owned by a `VmaTree`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One indexed region.
#[derive(Clone, Debug)]
pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) left: Option<NodeId>,
    pub(crate) right: Option<NodeId>,
    pub(crate) height: u32,
}

impl<K, V> Node<K, V> {
    pub(crate) fn leaf(key: K, value: V) -> Self {
        Node {
            key,
            value,
            left: None,
            right: None,
            height: 1,
        }
    }
}

/// The child pointer that was followed on the way down, i.e. where a
/// replacement subtree has to be written back.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Slot {
    Root,
    Left(NodeId),
    Right(NodeId),
}

#[derive(Clone, Debug)]
enum Entry<K, V> {
    Occupied(Node<K, V>),
    Vacant { next_free: Option<usize> },
}

/// Backing storage for tree nodes.
#[derive(Clone, Debug)]
pub(crate) struct Arena<K, V> {
    entries: Vec<Entry<K, V>>,
    free_head: Option<usize>,
    len: usize,
}

impl<K, V> Arena<K, V> {
    pub(crate) fn new() -> Self {
        Arena {
            entries: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn alloc(&mut self, node: Node<K, V>) -> NodeId {
        self.len += 1;
        match self.free_head {
            Some(index) => {
                if let Entry::Vacant { next_free } = self.entries[index] {
                    self.free_head = next_free;
                }
                self.entries[index] = Entry::Occupied(node);
                NodeId(index)
            }
            None => {
                self.entries.push(Entry::Occupied(node));
                NodeId(self.entries.len() - 1)
            }
        }
    }

    /// Returns the node to the caller and puts its slot on the free list.
    pub(crate) fn free(&mut self, id: NodeId) -> Option<Node<K, V>> {
        let entry = self.entries.get_mut(id.0)?;
        if matches!(entry, Entry::Vacant { .. }) {
            return None;
        }
        let old = std::mem::replace(
            entry,
            Entry::Vacant {
                next_free: self.free_head,
            },
        );
        self.free_head = Some(id.0);
        self.len -= 1;
        match old {
            Entry::Occupied(node) => Some(node),
            Entry::Vacant { .. } => None,
        }
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node<K, V>> {
        match self.entries.get(id.0) {
            Some(Entry::Occupied(node)) => Some(node),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node<K, V>> {
        match self.entries.get_mut(id.0) {
            Some(Entry::Occupied(node)) => Some(node),
            _ => None,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.free_head = None;
        self.len = 0;
    }
}

// Links inside the tree always point at occupied entries; a miss here means the
// node graph itself is corrupt, not that the caller passed a bad handle.
impl<K, V> std::ops::Index<NodeId> for Arena<K, V> {
    type Output = Node<K, V>;

    fn index(&self, id: NodeId) -> &Node<K, V> {
        match self.get(id) {
            Some(node) => node,
            None => panic!("dangling node link {:?}", id),
        }
    }
}

impl<K, V> std::ops::IndexMut<NodeId> for Arena<K, V> {
    fn index_mut(&mut self, id: NodeId) -> &mut Node<K, V> {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("dangling node link {:?}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freed_slots_are_reused() {
        let mut arena: Arena<u32, ()> = Arena::new();
        let a = arena.alloc(Node::leaf(1, ()));
        let b = arena.alloc(Node::leaf(2, ()));
        assert_eq!(arena.len(), 2);

        let node = arena.free(a).expect("a was allocated");
        assert_eq!(node.key, 1);
        assert!(arena.get(a).is_none());
        assert!(arena.free(a).is_none(), "double free must be refused");

        let c = arena.alloc(Node::leaf(3, ()));
        assert_eq!(c, a);
        assert_eq!(arena[c].key, 3);
        assert_eq!(arena[b].key, 2);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn fresh_leaf_has_height_one() {
        let node = Node::leaf(5u64, "x");
        assert_eq!(node.height, 1);
        assert!(node.left.is_none() && node.right.is_none());
    }
}

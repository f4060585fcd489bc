use std::collections::VecDeque;
use std::fmt;
use std::ops::{Index, IndexMut};

use thiserror::Error;

// ---------------------------------------------------------------------------
// NodeId: typed arena index
// ---------------------------------------------------------------------------

/// Stable handle to a node in a [`Tree`].
///
/// Handles stay valid until the tree is cleared or re-rooted.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(u32);

impl NodeId {
    /// Position of the node in insertion order.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors from structural tree operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Slot<T> {
    item: T,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    depth: usize,
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Rooted tree of `T` stored in an arena.
///
/// Slot 0 is always the root. Children keep their insertion order.
#[derive(Clone, Debug)]
pub struct Tree<T> {
    slots: Vec<Slot<T>>,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Tree<T> {
    /// Create an empty tree.
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Replace the whole tree with a single root holding `item`.
    pub fn add_root(&mut self, item: T) -> NodeId {
        self.slots.clear();
        self.slots.push(Slot {
            item,
            parent: None,
            children: Vec::new(),
            depth: 0,
        });
        NodeId(0)
    }

    /// Append `item` as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, item: T) -> Result<NodeId, TreeError> {
        let depth = self.slot(parent)?.depth + 1;
        let id = NodeId(u32::try_from(self.slots.len()).unwrap_or(u32::MAX));
        self.slots.push(Slot {
            item,
            parent: Some(parent),
            children: Vec::new(),
            depth,
        });
        self.slots[parent.index()].children.push(id);
        Ok(id)
    }

    /// The root, if one has been added.
    pub fn root(&self) -> Option<NodeId> {
        (!self.slots.is_empty()).then_some(NodeId(0))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.slots.len()
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.slots.get(id.index()).map(|s| &s.item)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots.get_mut(id.index()).map(|s| &mut s.item)
    }

    /// Parent of `id`, `None` for the root or an unknown handle.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.index()).and_then(|s| s.parent)
    }

    /// Children of `id` in insertion order (empty for unknown handles).
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.slots.get(id.index()) {
            Some(slot) => &slot.children,
            None => &[],
        }
    }

    /// Number of edges between `id` and the root.
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.slots.get(id.index()).map(|s| s.depth)
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.children(id).is_empty()
    }

    /// All childless nodes, in insertion order.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.ids().filter(|&id| self.is_leaf(id)).collect()
    }

    /// All handles in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.slots.len()).map(|i| NodeId(u32::try_from(i).unwrap_or(u32::MAX)))
    }

    /// Breadth-first order from the root. Parents always precede children.
    pub fn breadth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.slots.len());
        let mut queue: VecDeque<NodeId> = self.root().into_iter().collect();
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.children(id).iter().copied());
        }
        order
    }

    /// Handles from the root down to `id`, inclusive.
    pub fn path_to(&self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        self.slot(id)?;
        let mut path = vec![id];
        let mut cur = id;
        while let Some(parent) = self.parent(cur) {
            path.push(parent);
            cur = parent;
        }
        path.reverse();
        Ok(path)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    fn slot(&self, id: NodeId) -> Result<&Slot<T>, TreeError> {
        self.slots.get(id.index()).ok_or(TreeError::UnknownNode(id))
    }
}

impl<T> Index<NodeId> for Tree<T> {
    type Output = T;
    fn index(&self, id: NodeId) -> &Self::Output {
        &self.slots[id.index()].item
    }
}

impl<T> IndexMut<NodeId> for Tree<T> {
    fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
        &mut self.slots[id.index()].item
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

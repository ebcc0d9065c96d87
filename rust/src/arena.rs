//! Append-only node arena and the node codec.
//!
//! Every node lives in a pre-reserved slot addressed by a [`NodeId`]. Slots
//! are handed out by an atomic bump counter and never freed or reused; nodes
//! that fall out of the tree stay behind as garbage until the arena is
//! dropped.
//!
//! Reads and writes copy the whole fixed-size record and check key order on
//! both sides of the copy.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::types::{Node, NodeId};

/// Statistics for a node arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Slots reserved up front.
    pub capacity: usize,
    /// Slots handed out so far, reachable or not.
    pub allocated: usize,
}

/// Fixed-capacity, bump-allocated node store.
#[derive(Debug)]
pub struct NodeArena {
    slots: Box<[RwLock<Node>]>,
    next: AtomicUsize,
}

impl NodeArena {
    /// Reserve `capacity` zero-initialized node slots.
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity).map(|_| RwLock::new(Node::default())).collect();
        Self {
            slots,
            next: AtomicUsize::new(0),
        }
    }

    /// Hand out the next unused slot. Exhaustion is fatal.
    pub fn allocate(&self) -> NodeId {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        ensure_invariant!(
            index < self.slots.len(),
            "node arena exhausted: all {} slots are in use",
            self.slots.len()
        );
        NodeId::from_index(index)
    }

    /// Number of slots handed out.
    pub fn allocated(&self) -> usize {
        self.next.load(Ordering::Relaxed).min(self.slots.len())
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            capacity: self.capacity(),
            allocated: self.allocated(),
        }
    }

    /// Returns true if `id` addresses a slot that has been handed out.
    pub fn contains(&self, id: NodeId) -> bool {
        !id.is_null() && id.index() < self.allocated()
    }

    fn slot(&self, id: NodeId) -> &RwLock<Node> {
        ensure_invariant!(
            self.contains(id),
            "dangling node handle {} ({} slots allocated)",
            id,
            self.allocated()
        );
        &self.slots[id.index()]
    }

    // ============================================================================
    // CODEC
    // ============================================================================

    /// Copy a node out of the arena.
    pub fn read(&self, id: NodeId) -> Node {
        let node = *self.slot(id).read();
        check_order("read", id, &node);
        node
    }

    /// Copy a node into the arena.
    pub fn write(&self, id: NodeId, node: &Node) {
        check_order("write", id, node);
        *self.slot(id).write() = *node;
    }

    /// Copy a node out without the order check. Used by the invariant
    /// checker, which reports problems instead of panicking.
    pub fn snapshot(&self, id: NodeId) -> Option<Node> {
        if self.contains(id) {
            Some(*self.slots[id.index()].read())
        } else {
            None
        }
    }

    /// Point a node at a new owner.
    pub fn set_parent(&self, id: NodeId, parent: NodeId) {
        self.slot(id).write().parent = parent;
    }

    /// Point a node at a new right sibling.
    pub fn set_right(&self, id: NodeId, right: NodeId) {
        self.slot(id).write().right = right;
    }
}

fn check_order(op: &str, id: NodeId, node: &Node) {
    if let Some(i) = node.unsorted_at() {
        fatal!(
            "unordered {} of node {} at slot {}: {} <= {}\n{}",
            op,
            id,
            i,
            node.keys[i],
            node.keys[i - 1],
            node
        );
    }
}

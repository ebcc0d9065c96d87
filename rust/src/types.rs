//! Core types and data structures for BatchTree.
//!
//! This module contains the fundamental data structures, type definitions,
//! and constants used throughout the batch-parallel B+ tree.

use std::fmt;
use std::sync::atomic::AtomicU32;

use crate::arena::NodeArena;
use crate::config::IndexConfig;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Maximum number of entries per node.
pub const CAPACITY: usize = 16;

/// Nodes holding fewer entries than this after a removal are underflowed.
pub const HALF_CAPACITY: usize = CAPACITY >> 1;

/// Minimum representable key. Reserved for the sentinel entry.
pub const KEY_MIN: Key = i64::MIN;

/// Value reported for the sentinel entry, whose stored value is null.
pub const NULL_VALUE: Value = i64::MIN;

// ============================================================================
// TYPE DEFINITIONS
// ============================================================================

/// Key type stored in the index.
pub type Key = i64;

/// Value type stored in the leaves.
pub type Value = i64;

/// Opaque arena handle. A weak reference used for navigation only; the
/// arena owns every node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

/// Reserved out-of-range handle.
pub const NULL_NODE: NodeId = NodeId(u32::MAX);

/// Slot of the very first root.
pub const ROOT_NODE: NodeId = NodeId(0);

impl NodeId {
    /// Build a handle from an arena slot index.
    pub(crate) fn from_index(index: usize) -> Self {
        match u32::try_from(index) {
            Ok(raw) if raw != u32::MAX => NodeId(raw),
            _ => fatal!("arena index {} does not fit in a node handle", index),
        }
    }

    pub(crate) fn from_raw(raw: u32) -> Self {
        NodeId(raw)
    }

    /// Raw handle bits.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Arena slot index.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns true for the null handle.
    pub fn is_null(self) -> bool {
        self == NULL_NODE
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "NodeId(null)")
        } else {
            write!(f, "NodeId({})", self.0)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// A key with its associated value, as returned by predecessor queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyValue {
    pub key: Key,
    pub value: Value,
}

impl KeyValue {
    /// Result of a query with no real predecessor.
    pub const SENTINEL: KeyValue = KeyValue {
        key: KEY_MIN,
        value: NULL_VALUE,
    };

    pub fn new(key: Key, value: Value) -> Self {
        Self { key, value }
    }

    /// Returns true if this is the minimum sentinel.
    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

impl From<(Key, Value)> for KeyValue {
    fn from((key, value): (Key, Value)) -> Self {
        Self { key, value }
    }
}

// ============================================================================
// CORE DATA STRUCTURES
// ============================================================================

/// Batch-parallel, level-synchronous B+ tree over `i64` keys and values.
///
/// Every mutation is a batch: the batch is sorted, each item is routed to
/// its leaf, and then the tree is rewritten one level at a time. Low levels
/// are rewritten by a pool of worker threads that own disjoint node runs;
/// higher levels, which hold exponentially fewer nodes, are rewritten by a
/// single worker. Structural changes (new separators from splits, removed
/// or re-keyed children from merges) are staged for the next level up.
///
/// The leftmost leaf always carries a sentinel entry keyed [`KEY_MIN`], so
/// every predecessor query has a defined answer.
///
/// # Examples
///
/// ```
/// use batchtree::{BatchTree, IndexConfig, KeyValue};
///
/// let mut tree = BatchTree::new(IndexConfig::default().with_workers(2)).unwrap();
/// tree.insert(&[KeyValue::new(10, 1), KeyValue::new(20, 2), KeyValue::new(5, 3)])
///     .unwrap();
///
/// let found = tree.predecessor(&[7, 3, 25]);
/// assert_eq!(found[0], KeyValue::new(5, 3));
/// assert!(found[1].is_sentinel());
/// assert_eq!(found[2], KeyValue::new(20, 2));
/// ```
#[derive(Debug)]
pub struct BatchTree {
    /// Worker pool size, arena size and serial threshold.
    pub(crate) config: IndexConfig,
    /// Append-only node store.
    pub(crate) arena: NodeArena,
    /// Handle of the current root, replaced only when the tree grows.
    pub(crate) root: AtomicU32,
}

/// One node slot payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Entry {
    /// Unused slot, or the sentinel's value.
    #[default]
    Null,
    /// Leaf payload.
    Value(Value),
    /// Inner-node payload.
    Child(NodeId),
}

impl Entry {
    /// Child handle, if this entry references one.
    pub fn child(self) -> Option<NodeId> {
        match self {
            Entry::Child(id) => Some(id),
            _ => None,
        }
    }

    /// Value as reported to callers; null reads as [`NULL_VALUE`].
    pub fn reported_value(self) -> Value {
        match self {
            Entry::Value(value) => value,
            Entry::Null => NULL_VALUE,
            Entry::Child(id) => fatal!("leaf entry holds child handle {}", id),
        }
    }
}

/// Fixed-capacity node record. Leaves and inner nodes share one layout and
/// are told apart by `height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    /// 0 for leaves, increasing toward the root.
    pub(crate) height: u32,
    /// Number of live entries.
    pub(crate) size: usize,
    /// Sorted keys; unused slots hold [`KEY_MIN`].
    pub(crate) keys: [Key; CAPACITY],
    /// Values for leaves, child handles for inner nodes.
    pub(crate) entries: [Entry; CAPACITY],
    /// Current owner one level up.
    pub(crate) parent: NodeId,
    /// Next node at the same height in key order.
    pub(crate) right: NodeId,
}

impl Default for Node {
    fn default() -> Self {
        Node::empty(0, NULL_NODE, NULL_NODE)
    }
}

/// Outcome of descending to a leaf for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    /// Leaf the key routes to.
    pub leaf: NodeId,
    /// Greatest stored key not above the query.
    pub key: Key,
    /// Entry stored under `key`.
    pub entry: Entry,
}

impl SearchHit {
    pub fn key_value(&self) -> KeyValue {
        KeyValue::new(self.key, self.entry.reported_value())
    }
}

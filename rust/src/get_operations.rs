//! GET operations for BatchTree.
//!
//! This module contains the read side of the index: the single-key
//! descent every other operation is built on, and the batched predecessor
//! and exact-match lookups that fan that descent out over the workers.

use tracing::trace;

use crate::orchestrator::map_blocks;
use crate::types::{BatchTree, Entry, Key, KeyValue, NodeId, SearchHit, Value};

impl BatchTree {
    // ============================================================================
    // PUBLIC GET OPERATIONS
    // ============================================================================

    /// Greatest stored key not above each query key, with its value.
    ///
    /// Queries below every stored key answer [`KeyValue::SENTINEL`]. Results
    /// are in query order; the batch is split into one block per worker.
    ///
    /// # Examples
    ///
    /// ```
    /// use batchtree::{BatchTree, IndexConfig, KeyValue};
    ///
    /// let mut tree = BatchTree::new(IndexConfig::default()).unwrap();
    /// tree.insert(&[KeyValue::new(100, 7)]).unwrap();
    ///
    /// let found = tree.predecessor(&[150, 100, 99]);
    /// assert_eq!(found, vec![KeyValue::new(100, 7), KeyValue::new(100, 7), KeyValue::SENTINEL]);
    /// ```
    pub fn predecessor(&self, keys: &[Key]) -> Vec<KeyValue> {
        map_blocks(self.config.workers(), keys, |&key| self.search(key).key_value())
    }

    /// Value stored under exactly each query key.
    ///
    /// # Examples
    ///
    /// ```
    /// use batchtree::{BatchTree, IndexConfig, KeyValue};
    ///
    /// let mut tree = BatchTree::new(IndexConfig::default()).unwrap();
    /// tree.insert(&[KeyValue::new(1, 10), KeyValue::new(3, 30)]).unwrap();
    /// assert_eq!(tree.get(&[1, 2, 3]), vec![Some(10), None, Some(30)]);
    /// ```
    pub fn get(&self, keys: &[Key]) -> Vec<Option<Value>> {
        map_blocks(self.config.workers(), keys, |&key| {
            let hit = self.search(key);
            match hit.entry {
                Entry::Value(value) if hit.key == key => Some(value),
                _ => None,
            }
        })
    }

    /// Check if key exists in the tree.
    pub fn contains_key(&self, key: Key) -> bool {
        self.get(&[key])[0].is_some()
    }

    // ============================================================================
    // DESCENT
    // ============================================================================

    /// Descend from the root to the leaf responsible for `key`.
    ///
    /// At every node the slot holding the greatest key not above `key` is
    /// followed. The sentinel in the leftmost path guarantees such a slot
    /// exists; not finding one means the tree is corrupt.
    pub fn search(&self, key: Key) -> SearchHit {
        let mut id = self.root();
        loop {
            let node = self.arena.read(id);
            let slot = match node.predecessor_slot(key) {
                Some(slot) => slot,
                None => fatal!("no predecessor for key {} in node {}\n{}", key, id, node),
            };
            if node.is_leaf() {
                return SearchHit {
                    leaf: id,
                    key: node.keys[slot],
                    entry: node.entries[slot],
                };
            }
            id = match node.entries[slot].child() {
                Some(child) => child,
                None => fatal!("inner node {} has no child in slot {}\n{}", id, slot, node),
            };
        }
    }

    /// Target leaf for each key of a sorted batch.
    pub(crate) fn locate_leaves(&self, keys: &[Key]) -> Vec<NodeId> {
        let leaves = map_blocks(self.config.workers(), keys, |&key| self.search(key).leaf);
        trace!(keys = keys.len(), "leaves located");
        leaves
    }
}

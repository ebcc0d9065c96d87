//! INSERT operations for BatchTree.
//!
//! This module contains batched insertion: sorting and collapsing the
//! batch, routing every item to its leaf, and the per-level rewrite that
//! merges staged entries into nodes, splits overfull results into fresh
//! right siblings and grows the tree when the root itself splits.

use tracing::trace;

use crate::error::{reject_reserved, ModifyResult};
use crate::node::merge_entries;
use crate::orchestrator::LevelEngine;
use crate::staging::Staged;
use crate::types::{
    BatchTree, Entry, Key, KeyValue, Node, NodeId, CAPACITY, HALF_CAPACITY, KEY_MIN, NULL_NODE,
};

impl BatchTree {
    /// Insert or replace a batch of key-value pairs.
    ///
    /// The batch may be unsorted and may repeat keys; for a repeated key the
    /// pair that comes last in the batch wins. Existing keys have their
    /// value replaced.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::ReservedKey`](crate::IndexError::ReservedKey)
    /// if any pair uses [`KEY_MIN`]. Nothing is inserted in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use batchtree::{BatchTree, IndexConfig, KeyValue};
    ///
    /// let mut tree = BatchTree::new(IndexConfig::default()).unwrap();
    /// tree.insert(&[KeyValue::new(4, 1), KeyValue::new(4, 2)]).unwrap();
    /// assert_eq!(tree.get(&[4]), vec![Some(2)]);
    ///
    /// assert!(tree.insert(&[KeyValue::new(i64::MIN, 0)]).is_err());
    /// ```
    pub fn insert(&mut self, batch: &[KeyValue]) -> ModifyResult<()> {
        reject_reserved("insert", batch.iter().map(|kv| kv.key))?;
        if batch.is_empty() {
            return Ok(());
        }

        let mut sorted = batch.to_vec();
        sorted.sort_by_key(|kv| kv.key);
        sorted.dedup_by(|later, kept| {
            if later.key == kept.key {
                kept.value = later.value;
                true
            } else {
                false
            }
        });

        let keys: Vec<Key> = sorted.iter().map(|kv| kv.key).collect();
        let leaves = self.locate_leaves(&keys);
        let staged = sorted
            .iter()
            .zip(leaves)
            .map(|(kv, leaf)| Staged::insert(kv.key, Entry::Value(kv.value), leaf))
            .collect();

        self.orchestrator().run(&InsertLevels { tree: self }, staged);
        Ok(())
    }
}

/// Per-level insert step.
pub(crate) struct InsertLevels<'a> {
    tree: &'a BatchTree,
}

impl LevelEngine for InsertLevels<'_> {
    fn name(&self) -> &'static str {
        "insert"
    }

    fn level_bound(&self) -> u32 {
        self.tree.height() + 1
    }

    fn execute(&self, items: &[Staged], height: u32) -> Vec<Staged> {
        let mut staged = Vec::new();
        for run in items.chunk_by(|a, b| a.target == b.target) {
            self.rewrite(run, height, &mut staged);
        }
        staged
    }
}

impl InsertLevels<'_> {
    /// Merge one run into its target and write the result back as one or
    /// more nodes. Every node after the first is new and is staged for the
    /// parent as `(first key, child)`.
    fn rewrite(&self, run: &[Staged], height: u32, staged: &mut Vec<Staged>) {
        let target = run[0].target;
        let (id, base) = if target.is_null() {
            self.grow(height)
        } else {
            (target, self.tree.arena.read(target))
        };
        ensure_invariant!(
            base.height() == height,
            "insert run for {} expected height {}, node has height {}",
            id,
            height,
            base.height()
        );

        let merged = merge_entries(base.iter(), run.iter().map(|item| (item.key, item.entry())));
        let total = merged.len();
        let parent = base.parent();
        let tail_right = base.right();

        let mut current = id;
        let mut node = Node::empty(height, parent, tail_right);
        for (i, &(key, entry)) in merged.iter().enumerate() {
            node.push(key, entry);
            if node.len() == 1 && i > 0 {
                staged.push(Staged::insert(key, Entry::Child(current), parent));
            }
            let last = i + 1 == total;
            let full = node.len() == CAPACITY;
            let leave_half = i + HALF_CAPACITY + 1 == total && node.len() > HALF_CAPACITY;
            if !last && (full || leave_half) {
                let next = self.tree.arena.allocate();
                node.right = next;
                self.commit(current, &node);
                current = next;
                node = Node::empty(height, parent, tail_right);
            }
        }
        self.commit(current, &node);
        trace!(node = %id, height, items = run.len(), total, "insert rewrite");
    }

    /// A split reached the root: start a new root one level up whose only
    /// entry points at the old root.
    fn grow(&self, height: u32) -> (NodeId, Node) {
        let old_root = self.tree.root();
        ensure_invariant!(
            self.tree.arena.read(old_root).height() + 1 == height,
            "root growth to height {} above root {} of height {}",
            height,
            old_root,
            self.tree.arena.read(old_root).height()
        );
        let root = self.tree.arena.allocate();
        self.tree.set_root(root);
        let base = Node::filled(height, NULL_NODE, NULL_NODE, &[(KEY_MIN, Entry::Child(old_root))]);
        (root, base)
    }

    fn commit(&self, id: NodeId, node: &Node) {
        self.tree.arena.write(id, node);
        for child in node.children() {
            self.tree.arena.set_parent(child, id);
        }
    }
}

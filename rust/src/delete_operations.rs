//! DELETE operations for BatchTree.
//!
//! This module contains batched removal. Each level runs in two steps:
//! a rewrite of every targeted node (in parallel on low levels) that drops
//! removed keys and re-keys separators, followed by a serial compaction on
//! worker 0 that merges underflowed nodes with their right siblings,
//! splits the merge result when it overflows and cuts the sibling chain
//! when the tail of a level empties out. The root never shrinks.

use tracing::trace;

use crate::error::{reject_reserved, ModifyResult};
use crate::orchestrator::LevelEngine;
use crate::staging::{ModKind, Staged};
use crate::types::{BatchTree, Entry, Key, Node, NodeId, CAPACITY, HALF_CAPACITY, NULL_NODE};

impl BatchTree {
    /// Remove a batch of keys. Keys that are not present are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::ReservedKey`](crate::IndexError::ReservedKey)
    /// if the batch contains [`KEY_MIN`](crate::KEY_MIN).
    ///
    /// # Examples
    ///
    /// ```
    /// use batchtree::{BatchTree, IndexConfig, KeyValue};
    ///
    /// let mut tree = BatchTree::new(IndexConfig::default()).unwrap();
    /// tree.insert(&[KeyValue::new(1, 10), KeyValue::new(2, 20)]).unwrap();
    /// tree.remove(&[1, 99]).unwrap();
    /// assert_eq!(tree.get(&[1, 2]), vec![None, Some(20)]);
    /// ```
    pub fn remove(&mut self, keys: &[Key]) -> ModifyResult<()> {
        reject_reserved("remove", keys.iter().copied())?;
        if keys.is_empty() {
            return Ok(());
        }

        let mut sorted = keys.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let leaves = self.locate_leaves(&sorted);
        let staged = sorted
            .iter()
            .zip(leaves)
            .map(|(&key, leaf)| Staged::remove(key, leaf))
            .collect();

        self.orchestrator().run(&RemoveLevels { tree: self }, staged);
        Ok(())
    }
}

/// Per-level remove step.
pub(crate) struct RemoveLevels<'a> {
    tree: &'a BatchTree,
}

impl LevelEngine for RemoveLevels<'_> {
    fn name(&self) -> &'static str {
        "remove"
    }

    fn level_bound(&self) -> u32 {
        self.tree.height()
    }

    fn execute(&self, items: &[Staged], height: u32) -> Vec<Staged> {
        let mut flagged = Vec::new();
        for run in items.chunk_by(|a, b| a.target == b.target) {
            self.rewrite(run, height, &mut flagged);
        }
        flagged
    }

    fn compact(&self, items: Vec<Staged>, height: u32) -> Vec<Staged> {
        let mut compaction = Compaction {
            tree: self.tree,
            items: &items,
            height,
            out: Vec::with_capacity(items.len()),
            last_kept: None,
        };
        compaction.run();
        compaction.out
    }
}

impl RemoveLevels<'_> {
    /// Apply one run of removals and re-keys to its target node. A node
    /// that underflowed or whose first key moved is flagged for compaction.
    fn rewrite(&self, run: &[Staged], height: u32, flagged: &mut Vec<Staged>) {
        let id = run[0].target;
        let base = self.tree.arena.read(id);
        ensure_invariant!(
            base.height() == height,
            "remove run for {} expected height {}, node has height {}",
            id,
            height,
            base.height()
        );

        let mut node = Node::empty(height, base.parent(), base.right());
        let mut pending = run.iter().peekable();
        for (key, entry) in base.iter() {
            while let Some(item) = pending.next_if(|item| item.key < key) {
                self.unmatched(item, id, height);
            }
            match pending.next_if(|item| item.key == key) {
                None => node.push(key, entry),
                Some(item) if item.kind.is_remove() => {}
                Some(item) => node.push(item.new_key(), entry),
            }
        }
        for item in pending {
            self.unmatched(item, id, height);
        }
        self.tree.arena.write(id, &node);

        if id == self.tree.root() {
            return;
        }
        let mut kind = ModKind::default();
        if node.is_underfull() {
            kind |= ModKind::UNDERFLOW;
        }
        if node.is_empty() || node.first_key() != base.first_key() {
            kind |= ModKind::CHANGE_KEY;
        }
        trace!(node = %id, height, before = base.len(), after = node.len(), ?kind, "remove rewrite");
        if !kind.is_empty() {
            flagged.push(Staged::flagged(base.first_key(), node.first_key(), id, kind));
        }
    }

    /// Leaves ignore removals of absent keys; inner nodes must hold every
    /// separator they are asked to change.
    fn unmatched(&self, item: &Staged, id: NodeId, height: u32) {
        ensure_invariant!(
            height == 0,
            "separator {} ({:?}) missing from node {} at height {}\n{}",
            item.key,
            item.kind,
            id,
            height,
            self.tree.arena.read(id)
        );
    }
}

/// Serial pass over the nodes flagged at one height.
struct Compaction<'a> {
    tree: &'a BatchTree,
    items: &'a [Staged],
    height: u32,
    /// Items for the parents at `height + 1`, in key order.
    out: Vec<Staged>,
    /// Rightmost node at `height` known to survive this pass.
    last_kept: Option<NodeId>,
}

/// Nodes visited while gathering entries for one underflowed node.
struct Group {
    /// One past the last item whose node was absorbed into the group.
    end: usize,
    entries: Vec<(Key, Entry)>,
    /// Last node visited.
    tail: NodeId,
    tail_node: Node,
    /// Whether the last node visited had an item of its own.
    tail_covered: bool,
}

impl Compaction<'_> {
    fn run(&mut self) {
        let mut l = 0;
        while l < self.items.len() {
            let item = self.items[l];
            if item.kind.is_underflow() {
                l = self.merge_from(l);
            } else {
                ensure_invariant!(
                    item.kind == ModKind::CHANGE_KEY,
                    "unexpected {:?} for node {} in compaction",
                    item.kind,
                    item.target
                );
                let parent = self.parent_of(item.target);
                self.out.push(Staged::change_key(item.key, item.new_key(), parent));
                self.last_kept = Some(item.target);
                l += 1;
            }
        }
    }

    fn parent_of(&self, id: NodeId) -> NodeId {
        self.tree.arena.read(id).parent()
    }

    /// Walk right from the underflowed node at `items[l]` until at least
    /// half a node's worth of entries has been gathered or the level ends.
    fn gather(&self, l: usize) -> Group {
        let arena = &self.tree.arena;
        let mut end = l;
        let mut entries = Vec::with_capacity(CAPACITY + HALF_CAPACITY);
        let mut addr = self.items[l].target;
        loop {
            let node = arena.read(addr);
            entries.extend(node.iter());
            let covered = end < self.items.len() && self.items[end].target == addr;
            if covered {
                end += 1;
            } else {
                ensure_invariant!(
                    !node.is_underfull() || node.right().is_null(),
                    "unflagged underfull node {} at height {}\n{}",
                    addr,
                    self.height,
                    node
                );
            }
            if entries.len() < HALF_CAPACITY && !node.right().is_null() {
                addr = node.right();
            } else {
                return Group {
                    end,
                    entries,
                    tail: addr,
                    tail_node: node,
                    tail_covered: covered,
                };
            }
        }
    }

    /// Compact the group starting at `items[l]` and return the index of
    /// the first item it did not absorb.
    fn merge_from(&mut self, l: usize) -> usize {
        let group = self.gather(l);
        let left_id = self.items[l].target;
        let left_key = self.items[l].key;
        let left = self.tree.arena.read(left_id);

        if group.entries.is_empty() {
            self.drop_tail(l, &group);
            return group.end;
        }

        let first = group.entries[0].0;
        if first != left_key {
            self.out.push(Staged::change_key(left_key, first, left.parent()));
        }
        let right_out = group.tail_node.right();

        if group.entries.len() <= CAPACITY {
            self.commit(left_id, &Node::filled(self.height, left.parent(), right_out, &group.entries));
            for item in &self.items[l + 1..group.end] {
                let parent = self.parent_of(item.target);
                self.out.push(Staged::remove(item.key, parent));
            }
            if !group.tail_covered {
                self.out
                    .push(Staged::remove(group.tail_node.first_key(), group.tail_node.parent()));
            }
            self.last_kept = Some(left_id);
        } else {
            self.split(l, left_id, &left, &group);
        }
        trace!(node = %left_id, height = self.height, gathered = group.entries.len(), "compacted");
        group.end
    }

    /// Gathered more than one node holds: keep the lower half in the left
    /// node and move the upper half into the rightmost visited node whose
    /// separator does not exceed the midpoint key.
    fn split(&mut self, l: usize, left_id: NodeId, left: &Node, group: &Group) {
        let mid = group.entries.len() / 2;
        let mid_key = group.entries[mid].0;

        let mut reuse_at = l;
        for i in l..group.end {
            if self.items[i].key <= mid_key {
                reuse_at = i;
            }
        }
        let reuse_tail = !group.tail_covered && group.tail_node.first_key() <= mid_key;
        let reuse = if reuse_tail {
            group.tail
        } else {
            ensure_invariant!(
                reuse_at != l,
                "no node to reuse for upper half at height {} (mid key {})",
                self.height,
                mid_key
            );
            self.items[reuse_at].target
        };

        let right_out = group.tail_node.right();
        let reuse_parent = self.parent_of(reuse);
        self.commit(
            left_id,
            &Node::filled(self.height, left.parent(), reuse, &group.entries[..mid]),
        );
        self.commit(
            reuse,
            &Node::filled(self.height, reuse_parent, right_out, &group.entries[mid..]),
        );

        for i in l + 1..group.end {
            let item = self.items[i];
            let parent = self.parent_of(item.target);
            if !reuse_tail && i == reuse_at {
                self.out.push(Staged::change_key(item.key, mid_key, parent));
            } else {
                self.out.push(Staged::remove(item.key, parent));
            }
        }
        if !group.tail_covered {
            let key = group.tail_node.first_key();
            let parent = group.tail_node.parent();
            if reuse_tail {
                self.out.push(Staged::change_key(key, mid_key, parent));
            } else {
                self.out.push(Staged::remove(key, parent));
            }
        }
        self.last_kept = Some(reuse);
    }

    /// Everything from `items[l]` to the end of the level is empty: remove
    /// every such node from its parent and end the sibling chain at the
    /// nearest surviving node to the left.
    fn drop_tail(&mut self, l: usize, group: &Group) {
        ensure_invariant!(
            group.tail_covered && group.tail_node.right().is_null(),
            "empty group at height {} ends at {} before the end of the level",
            self.height,
            group.tail
        );
        for item in &self.items[l..group.end] {
            let parent = self.parent_of(item.target);
            self.out.push(Staged::remove(item.key, parent));
        }

        let first_dropped = self.items[l].target;
        let arena = &self.tree.arena;
        let mut cursor = self
            .last_kept
            .unwrap_or_else(|| self.tree.leftmost_at(self.height));
        loop {
            let right = arena.read(cursor).right();
            if right == first_dropped {
                arena.set_right(cursor, NULL_NODE);
                break;
            }
            ensure_invariant!(
                !right.is_null(),
                "node {} is not on the sibling chain of height {}",
                first_dropped,
                self.height
            );
            cursor = right;
        }
        trace!(height = self.height, dropped = group.end - l, new_tail = %cursor, "level tail emptied");
    }

    fn commit(&self, id: NodeId, node: &Node) {
        self.tree.arena.write(id, node);
        for child in node.children() {
            self.tree.arena.set_parent(child, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::types::{KeyValue, KEY_MIN, ROOT_NODE};

    fn tree_with(keys: impl Iterator<Item = Key>, workers: usize) -> BatchTree {
        let mut tree = BatchTree::new(
            IndexConfig::default()
                .with_workers(workers)
                .with_arena_capacity(1 << 13),
        )
        .unwrap();
        let batch: Vec<KeyValue> = keys.map(|k| KeyValue::new(k, -k)).collect();
        tree.insert(&batch).unwrap();
        tree
    }

    #[test]
    fn test_remove_from_single_leaf() {
        let mut tree = tree_with(1..=10, 2);
        tree.remove(&[3, 7, 42]).unwrap();
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.get(&[3, 4, 7]), vec![None, Some(-4), None]);
        assert_eq!(tree.len(), 8);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_everything_leaves_sentinel() {
        let mut tree = tree_with(1..=2000, 4);
        let height = tree.height();
        let keys: Vec<Key> = (1..=2000).collect();
        tree.remove(&keys).unwrap();

        assert_eq!(tree.len(), 0);
        assert_eq!(tree.height(), height);
        assert!(tree.predecessor(&[1, 1000, i64::MAX]).iter().all(KeyValue::is_sentinel));
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_evens_keeps_occupancy() {
        let mut tree = tree_with(1..=1000, 4);
        let evens: Vec<Key> = (2..=1000).step_by(2).collect();
        tree.remove(&evens).unwrap();

        tree.check_invariants().unwrap();
        assert!(tree.occupancy_violations().is_empty());
        assert_eq!(tree.len(), 500);
        assert_eq!(tree.predecessor(&[3, 4])[0], KeyValue::new(3, -3));
        assert_eq!(tree.predecessor(&[4])[0], KeyValue::new(3, -3));
    }

    #[test]
    fn test_remove_left_half_rekeys_parents() {
        let mut tree = tree_with(1..=400, 3);
        let left: Vec<Key> = (1..=200).collect();
        tree.remove(&left).unwrap();

        tree.check_invariants().unwrap();
        assert_eq!(tree.predecessor(&[150])[0], KeyValue::SENTINEL);
        assert_eq!(tree.predecessor(&[201])[0], KeyValue::new(201, -201));
        assert_eq!(tree.len(), 200);
    }

    #[test]
    fn test_remove_right_tail_cuts_chain() {
        let mut tree = tree_with(1..=400, 2);
        let tail: Vec<Key> = (101..=400).collect();
        tree.remove(&tail).unwrap();

        tree.check_invariants().unwrap();
        assert_eq!(tree.predecessor(&[1000])[0], KeyValue::new(100, -100));
        let items = tree.items();
        assert_eq!(items.len(), 100);
        assert_eq!(items.last(), Some(&KeyValue::new(100, -100)));
    }

    #[test]
    fn test_emptied_level_tail_is_unlinked() {
        let mut tree = tree_with(1..=400, 4);
        let tail: Vec<Key> = (112..=400).collect();
        tree.remove(&tail).unwrap();

        tree.check_invariants().unwrap();
        assert_eq!(tree.items().last(), Some(&KeyValue::new(111, -111)));
        let mut leaf = tree.leftmost_at(0);
        loop {
            let node = tree.arena.read(leaf);
            assert!(!node.is_empty());
            if node.right().is_null() {
                break;
            }
            leaf = node.right();
        }
        assert_eq!(tree.arena.read(leaf).last_key(), Some(111));
    }

    #[test]
    fn test_remove_absent_keys_is_a_no_op() {
        let mut tree = tree_with((0..300).map(|k| k * 2), 2);
        let before = tree.items();
        let odds: Vec<Key> = (0..300).map(|k| k * 2 + 1).collect();
        tree.remove(&odds).unwrap();
        assert_eq!(tree.items(), before);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_reserved_key_rejected() {
        let mut tree = tree_with(1..=3, 1);
        assert!(tree.remove(&[2, KEY_MIN]).is_err());
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_root_stays_after_emptying_single_leaf() {
        let mut tree = tree_with(1..=5, 1);
        tree.remove(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(tree.root(), ROOT_NODE);
        assert_eq!(tree.arena.read(ROOT_NODE).keys(), &[KEY_MIN]);
    }
}

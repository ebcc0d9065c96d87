//! Tree structure management operations for BatchTree.
//!
//! This module contains tree-level queries over the whole structure:
//! element counts, in-order listing along the leaf chain, per-level
//! statistics and a human-readable dump.

use std::fmt::Write as _;

use crate::arena::ArenaStats;
use crate::types::{BatchTree, KeyValue, NodeId};

/// Shape of a tree at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeStats {
    /// Height of the root.
    pub height: u32,
    /// Number of nodes on each level, leaves first.
    pub level_sizes: Vec<usize>,
    /// Nodes reachable from the root.
    pub reachable_nodes: usize,
    /// Arena usage, including orphaned nodes.
    pub arena: ArenaStats,
}

impl TreeStats {
    /// Allocated nodes that are no longer part of the tree.
    pub fn orphaned_nodes(&self) -> usize {
        self.arena.allocated - self.reachable_nodes
    }
}

// ============================================================================
// TREE STRUCTURE OPERATIONS
// ============================================================================

impl BatchTree {
    /// Leftmost node at `height`, reached by following first children down
    /// from the root.
    pub fn leftmost_at(&self, height: u32) -> NodeId {
        let mut id = self.root();
        loop {
            let node = self.arena.read(id);
            if node.height() <= height {
                ensure_invariant!(
                    node.height() == height,
                    "no level {} below root of height {}",
                    height,
                    self.height()
                );
                return id;
            }
            id = match node.entries().first().and_then(|entry| entry.child()) {
                Some(child) => child,
                None => fatal!("inner node {} has no first child\n{}", id, node),
            };
        }
    }

    /// Handles of every node at `height`, in key order along the sibling chain.
    pub fn level(&self, height: u32) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        let mut id = self.leftmost_at(height);
        while !id.is_null() {
            nodes.push(id);
            id = self.arena.read(id).right();
        }
        nodes
    }

    /// Returns the number of stored pairs, not counting the sentinel.
    pub fn len(&self) -> usize {
        self.level(0)
            .into_iter()
            .map(|id| self.arena.read(id).len())
            .sum::<usize>()
            - 1
    }

    /// Returns true if only the sentinel is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored pair in key order, without the sentinel.
    pub fn items(&self) -> Vec<KeyValue> {
        self.level(0)
            .into_iter()
            .flat_map(|id| {
                self.arena
                    .read(id)
                    .iter()
                    .map(|(key, entry)| KeyValue::new(key, entry.reported_value()))
                    .collect::<Vec<_>>()
            })
            .filter(|kv| !kv.is_sentinel())
            .collect()
    }

    /// Collect tree statistics.
    pub fn stats(&self) -> TreeStats {
        let height = self.height();
        let level_sizes: Vec<usize> = (0..=height).map(|h| self.level(h).len()).collect();
        TreeStats {
            height,
            reachable_nodes: level_sizes.iter().sum(),
            level_sizes,
            arena: self.arena.stats(),
        }
    }

    /// Render every level, root first, one node per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for height in (0..=self.height()).rev() {
            let _ = writeln!(out, "level {}:", height);
            for id in self.level(height) {
                let node = self.arena.read(id);
                let _ = writeln!(
                    out,
                    "  {} parent={} right={} keys={:?}",
                    id,
                    node.parent(),
                    node.right(),
                    node.keys()
                );
            }
        }
        out
    }
}

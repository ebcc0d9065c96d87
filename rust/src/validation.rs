//! Validation and debugging utilities for BatchTree.
//!
//! This module contains the structural invariant checker used by tests and
//! diagnostics. Unlike the engine, which treats a broken invariant as
//! fatal, the checker reads nodes without the codec's order check and
//! reports the first violation it finds as an [`IndexError`].

use crate::error::{IndexError, IndexResultExt, TreeResult};
use crate::types::{BatchTree, Entry, Key, Node, NodeId, CAPACITY, HALF_CAPACITY, KEY_MIN};

// ============================================================================
// VALIDATION METHODS
// ============================================================================

impl BatchTree {
    /// Check every structural invariant of the tree.
    ///
    /// Verified: strictly increasing keys in every node; each separator
    /// equals its child's first key and bounds its child's last key; child
    /// heights and parent handles; and that each level's sibling chain
    /// visits exactly the nodes of that level in key order, ending in null.
    pub fn check_invariants(&self) -> Result<(), IndexError> {
        self.check_from_root()
            .with_context("BatchTree::check_invariants")
    }

    fn check_from_root(&self) -> TreeResult<()> {
        let root = self.root();
        let node = self.load(root)?;
        if !node.parent().is_null() {
            return Err(corrupt("Root", &format!("root {} has parent {}", root, node.parent())));
        }
        let mut levels = vec![Vec::new(); node.height() as usize + 1];
        self.check_node(root, &node, None, &mut levels)?;
        self.check_sibling_chains(&levels)
    }

    /// Nodes whose size falls outside `[HALF_CAPACITY, CAPACITY]`, other than
    /// the root and the rightmost node of each level.
    pub fn occupancy_violations(&self) -> Vec<NodeId> {
        let root = self.root();
        (0..=self.height())
            .flat_map(|height| {
                let level = self.level(height);
                let rightmost = level.last().copied();
                level
                    .into_iter()
                    .filter(move |&id| id != root && Some(id) != rightmost)
            })
            .filter(|&id| {
                let size = self.arena.read(id).len();
                !(HALF_CAPACITY..=CAPACITY).contains(&size)
            })
            .collect()
    }

    fn load(&self, id: NodeId) -> TreeResult<Node> {
        self.arena
            .snapshot(id)
            .ok_or_else(|| corrupt("Handle", &format!("{} is not an allocated node", id)))
    }

    /// Recursively check `node` and its subtree. `upper` is the separator
    /// following this node in its parent, if any.
    fn check_node(
        &self,
        id: NodeId,
        node: &Node,
        upper: Option<Key>,
        levels: &mut [Vec<NodeId>],
    ) -> TreeResult<()> {
        if node.is_empty() {
            return Err(corrupt("Node", &format!("{} at height {} is empty", id, node.height())));
        }
        if let Some(i) = node.unsorted_at() {
            return Err(corrupt(
                "Order",
                &format!("{} keys not increasing at slot {}: {:?}", id, i, node.keys()),
            ));
        }
        if let (Some(upper), Some(last)) = (upper, node.last_key()) {
            if last >= upper {
                return Err(corrupt(
                    "Separator",
                    &format!("{} holds key {} at or above next separator {}", id, last, upper),
                ));
            }
        }
        levels[node.height() as usize].push(id);

        if node.is_leaf() {
            return self.check_leaf(id, node);
        }
        for (slot, (key, entry)) in node.iter().enumerate() {
            let child_id = match entry {
                Entry::Child(child) => child,
                other => {
                    return Err(corrupt(
                        "Entry",
                        &format!("{} slot {} holds {:?} instead of a child", id, slot, other),
                    ))
                }
            };
            let child = self.load(child_id)?;
            if child.height() + 1 != node.height() {
                return Err(corrupt(
                    "Height",
                    &format!(
                        "child {} of {} has height {}, expected {}",
                        child_id,
                        id,
                        child.height(),
                        node.height() - 1
                    ),
                ));
            }
            if child.parent() != id {
                return Err(corrupt(
                    "Parent",
                    &format!("child {} of {} points at parent {}", child_id, id, child.parent()),
                ));
            }
            if !child.is_empty() && child.first_key() != key {
                return Err(corrupt(
                    "Separator",
                    &format!(
                        "{} slot {} has separator {} but child {} starts at {}",
                        id,
                        slot,
                        key,
                        child_id,
                        child.first_key()
                    ),
                ));
            }
            let next = node.keys().get(slot + 1).copied().or(upper);
            self.check_node(child_id, &child, next, levels)?;
        }
        Ok(())
    }

    fn check_leaf(&self, id: NodeId, node: &Node) -> TreeResult<()> {
        for (slot, (key, entry)) in node.iter().enumerate() {
            let valid = match entry {
                Entry::Value(_) => key != KEY_MIN,
                Entry::Null => key == KEY_MIN,
                Entry::Child(_) => false,
            };
            if !valid {
                return Err(corrupt(
                    "Leaf",
                    &format!("{} slot {} holds {:?} under key {}", id, slot, entry, key),
                ));
            }
        }
        Ok(())
    }

    /// Each level's `right` chain must visit the nodes found by the
    /// descent, in the same order, and end in null.
    fn check_sibling_chains(&self, levels: &[Vec<NodeId>]) -> TreeResult<()> {
        for (height, expected) in levels.iter().enumerate() {
            for (i, &id) in expected.iter().enumerate() {
                let right = self.load(id)?.right();
                let want = expected.get(i + 1).copied();
                match want {
                    Some(next) if right != next => {
                        return Err(corrupt(
                            "Sibling chain",
                            &format!(
                                "{} at height {} points right at {}, expected {}",
                                id, height, right, next
                            ),
                        ))
                    }
                    None if !right.is_null() => {
                        return Err(corrupt(
                            "Sibling chain",
                            &format!(
                                "rightmost node {} at height {} points right at {}",
                                id, height, right
                            ),
                        ))
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

fn corrupt(component: &str, details: &str) -> IndexError {
    IndexError::corrupted_tree(component, details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::types::KeyValue;

    fn tree_with(n: i64) -> BatchTree {
        let mut tree = BatchTree::new(IndexConfig::default().with_workers(2).with_arena_capacity(512)).unwrap();
        let batch: Vec<KeyValue> = (1..=n).map(|k| KeyValue::new(k, k)).collect();
        tree.insert(&batch).unwrap();
        tree
    }

    #[test]
    fn test_fresh_tree_is_valid() {
        let tree = tree_with(0);
        tree.check_invariants().unwrap();
        assert!(tree.occupancy_violations().is_empty());
    }

    #[test]
    fn test_multi_level_tree_is_valid() {
        let tree = tree_with(1000);
        assert!(tree.height() >= 2);
        tree.check_invariants().unwrap();
        assert!(tree.occupancy_violations().is_empty());
    }

    #[test]
    fn test_detects_bad_parent_handle() {
        let tree = tree_with(100);
        let leaf = tree.leftmost_at(0);
        tree.arena.set_parent(leaf, leaf);
        let err = tree.check_invariants().unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("Parent"));
    }

    #[test]
    fn test_detects_broken_sibling_chain() {
        let tree = tree_with(100);
        let leaf = tree.leftmost_at(0);
        tree.arena.set_right(leaf, crate::types::NULL_NODE);
        let err = tree.check_invariants().unwrap_err();
        assert!(err.to_string().contains("Sibling chain"));
        assert!(err.to_string().contains("check_invariants"));
    }

    #[test]
    fn test_detects_separator_mismatch() {
        let tree = tree_with(100);
        let root_id = tree.root();
        let mut root = tree.arena.read(root_id);
        root.keys[1] += 1;
        tree.arena.write(root_id, &root);
        let err = tree.check_invariants().unwrap_err();
        assert!(err.to_string().contains("Separator"));
    }
}

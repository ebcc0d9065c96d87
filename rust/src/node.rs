//! Node implementation for BatchTree.
//!
//! A node is a fixed-size record of up to `CAPACITY` sorted keys with their
//! entries, plus height, parent and right-sibling handles. The batch engines
//! never edit a node in place: they read a copy, build a fresh record and
//! write it back whole.

use std::fmt;

use crate::types::{Entry, Key, Node, NodeId, CAPACITY, HALF_CAPACITY, KEY_MIN};

impl Node {
    // ============================================================================
    // CONSTRUCTION
    // ============================================================================

    /// Node with no entries: keys at the minimum sentinel, entries null.
    pub fn empty(height: u32, parent: NodeId, right: NodeId) -> Self {
        Self {
            height,
            size: 0,
            keys: [KEY_MIN; CAPACITY],
            entries: [Entry::Null; CAPACITY],
            parent,
            right,
        }
    }

    /// Node holding exactly the given sorted entries.
    pub(crate) fn filled(height: u32, parent: NodeId, right: NodeId, entries: &[(Key, Entry)]) -> Self {
        let mut node = Self::empty(height, parent, right);
        for &(key, entry) in entries {
            node.push(key, entry);
        }
        node
    }

    // ============================================================================
    // ACCESSORS
    // ============================================================================

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_leaf(&self) -> bool {
        self.height == 0
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    pub fn right(&self) -> NodeId {
        self.right
    }

    /// Live keys.
    pub fn keys(&self) -> &[Key] {
        &self.keys[..self.size]
    }

    /// Live entries.
    pub fn entries(&self) -> &[Entry] {
        &self.entries[..self.size]
    }

    /// First key, or the sentinel when empty.
    pub fn first_key(&self) -> Key {
        self.keys[0]
    }

    /// Last live key.
    pub fn last_key(&self) -> Option<Key> {
        self.keys().last().copied()
    }

    /// Live (key, entry) pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (Key, Entry)> + '_ {
        self.keys().iter().copied().zip(self.entries().iter().copied())
    }

    /// Child handles of an inner node.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries().iter().filter_map(|entry| entry.child())
    }

    /// Returns true if this node holds fewer than half its capacity.
    pub fn is_underfull(&self) -> bool {
        self.size < HALF_CAPACITY
    }

    // ============================================================================
    // SEARCH
    // ============================================================================

    /// Slot of the greatest key not above `key`.
    pub fn predecessor_slot(&self, key: Key) -> Option<usize> {
        self.keys().partition_point(|&k| k <= key).checked_sub(1)
    }

    // ============================================================================
    // MUTATION
    // ============================================================================

    /// Append an entry. Callers feed keys in increasing order.
    pub(crate) fn push(&mut self, key: Key, entry: Entry) {
        ensure_invariant!(
            self.size < CAPACITY,
            "push of key {} into a full node at height {}",
            key,
            self.height
        );
        self.keys[self.size] = key;
        self.entries[self.size] = entry;
        self.size += 1;
    }

    // ============================================================================
    // CONSISTENCY
    // ============================================================================

    /// Index of the first key that is not strictly greater than its predecessor.
    pub fn unsorted_at(&self) -> Option<usize> {
        (1..self.size).find(|&i| self.keys[i] <= self.keys[i - 1])
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "height={} size={} parent={} right={}",
            self.height, self.size, self.parent, self.right
        )?;
        for (i, (key, entry)) in self.iter().enumerate() {
            match entry {
                Entry::Child(id) => writeln!(f, "  [{}] key={} child={}", i, key, id)?,
                Entry::Value(value) => writeln!(f, "  [{}] key={} value={}", i, key, value)?,
                Entry::Null => writeln!(f, "  [{}] key={} null", i, key)?,
            }
        }
        Ok(())
    }
}

/// Two-way merge of a node's sorted entries with a sorted run of
/// replacements. On equal keys the replacement wins.
pub(crate) fn merge_entries(
    existing: impl Iterator<Item = (Key, Entry)>,
    incoming: impl Iterator<Item = (Key, Entry)>,
) -> Vec<(Key, Entry)> {
    let mut merged = Vec::with_capacity(CAPACITY * 2);
    let mut existing = existing.peekable();
    let mut incoming = incoming.peekable();
    loop {
        let next = match (existing.peek(), incoming.peek()) {
            (Some(&(old_key, _)), Some(&(new_key, _))) => {
                if old_key < new_key {
                    existing.next()
                } else {
                    if old_key == new_key {
                        existing.next();
                    }
                    incoming.next()
                }
            }
            (Some(_), None) => existing.next(),
            (None, Some(_)) => incoming.next(),
            (None, None) => break,
        };
        if let Some(pair) = next {
            merged.push(pair);
        }
    }
    merged
}

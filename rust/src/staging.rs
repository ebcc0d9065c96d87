//! Staged modifications carried between levels of a batch.
//!
//! A staged item names a target node, the key it concerns and what should
//! happen to that key. Items are produced by one level and consumed by the
//! next; they never outlive the batch that created them.

use parking_lot::{Mutex, RwLock};

use crate::types::{Entry, Key, NodeId};

mod_kinds! {
    REMOVE = 1,
    CHANGE_KEY = 2,
    UNDERFLOW = 4,
}

/// What a staged item carries besides its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Payload {
    /// Entry to merge into the target (insert).
    Entry(Entry),
    /// Replacement key for the slot holding `key` (remove).
    Key(Key),
    /// Nothing beyond the key itself.
    Empty,
}

/// One pending modification of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Staged {
    pub(crate) key: Key,
    pub(crate) payload: Payload,
    pub(crate) target: NodeId,
    pub(crate) kind: ModKind,
}

impl Staged {
    /// Merge `entry` under `key` into `target`.
    pub(crate) fn insert(key: Key, entry: Entry, target: NodeId) -> Self {
        Self {
            key,
            payload: Payload::Entry(entry),
            target,
            kind: ModKind::default(),
        }
    }

    /// Drop `key` from `target`.
    pub(crate) fn remove(key: Key, target: NodeId) -> Self {
        Self {
            key,
            payload: Payload::Empty,
            target,
            kind: ModKind::REMOVE,
        }
    }

    /// Re-key the slot holding `key` in `target` to `new_key`.
    pub(crate) fn change_key(key: Key, new_key: Key, target: NodeId) -> Self {
        Self {
            key,
            payload: Payload::Key(new_key),
            target,
            kind: ModKind::CHANGE_KEY,
        }
    }

    /// A node that was rewritten and needs attention from compaction.
    pub(crate) fn flagged(old_first: Key, new_first: Key, node: NodeId, kind: ModKind) -> Self {
        Self {
            key: old_first,
            payload: Payload::Key(new_first),
            target: node,
            kind,
        }
    }

    pub(crate) fn entry(&self) -> Entry {
        match self.payload {
            Payload::Entry(entry) => entry,
            other => fatal!("staged item for key {} carries {:?}, not an entry", self.key, other),
        }
    }

    pub(crate) fn new_key(&self) -> Key {
        match self.payload {
            Payload::Key(key) => key,
            other => fatal!("staged item for key {} carries {:?}, not a key", self.key, other),
        }
    }
}

/// End of the run of items sharing `items[start].target`.
///
/// Items for one node are contiguous because keys are sorted and nodes at
/// one height own disjoint key ranges, so the run end can be found by
/// binary search.
pub(crate) fn run_end(items: &[Staged], start: usize) -> usize {
    let target = items[start].target;
    start + items[start..].partition_point(|item| item.target == target)
}

/// The slice of `items` owned by worker `tid` of `workers`: an even split
/// widened so that no node run straddles two workers.
pub(crate) fn partition(items: &[Staged], workers: usize, tid: usize) -> std::ops::Range<usize> {
    let n = items.len();
    let mut lft = n * tid / workers;
    let mut rt = n * (tid + 1) / workers;
    if rt > lft {
        if lft != 0 {
            lft = run_end(items, lft - 1);
        }
        rt = run_end(items, rt - 1);
    }
    lft..rt.max(lft)
}

/// Double-buffered staging area for one batch.
///
/// `current` holds the items every worker reads during a level; each worker
/// writes what it produces into its own `next` buffer. Between levels the
/// aggregator concatenates the `next` buffers in worker order, which keeps
/// the result sorted, and swaps it in as the new `current`.
#[derive(Debug)]
pub(crate) struct LevelBatch {
    pub(crate) current: RwLock<Vec<Staged>>,
    pub(crate) next: Vec<Mutex<Vec<Staged>>>,
}

impl LevelBatch {
    pub(crate) fn new(items: Vec<Staged>, workers: usize) -> Self {
        Self {
            current: RwLock::new(items),
            next: (0..workers).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    /// Concatenate and drain every worker's `next` buffer.
    pub(crate) fn gather(&self) -> Vec<Staged> {
        let mut gathered = Vec::new();
        for buffer in &self.next {
            gathered.append(&mut buffer.lock());
        }
        gathered
    }

    /// Replace `current` with the items for the next level.
    pub(crate) fn publish(&self, items: Vec<Staged>) {
        *self.current.write() = items;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(targets: &[u32]) -> Vec<Staged> {
        targets
            .iter()
            .enumerate()
            .map(|(i, &t)| Staged::remove(i as Key, NodeId::from_raw(t)))
            .collect()
    }

    #[test]
    fn test_mod_kind_flags_combine() {
        let mut kind = ModKind::UNDERFLOW;
        assert!(!kind.is_change_key());
        kind |= ModKind::CHANGE_KEY;
        assert!(kind.is_underflow());
        assert!(kind.is_change_key());
        assert!(!kind.is_remove());
        assert_ne!(kind, ModKind::CHANGE_KEY);
        assert!(ModKind::default().is_empty());
        assert_eq!(format!("{:?}", kind), "ModKind(CHANGE_KEY|UNDERFLOW)");
    }

    #[test]
    fn test_run_end() {
        let staged = items(&[1, 1, 1, 2, 3, 3]);
        assert_eq!(run_end(&staged, 0), 3);
        assert_eq!(run_end(&staged, 1), 3);
        assert_eq!(run_end(&staged, 3), 4);
        assert_eq!(run_end(&staged, 4), 6);
    }

    #[test]
    fn test_partition_never_splits_a_run() {
        let staged = items(&[1, 1, 1, 1, 2, 2, 3, 4, 4, 4, 4, 4]);
        for workers in 1..=6 {
            let ranges: Vec<_> = (0..workers).map(|tid| partition(&staged, workers, tid)).collect();
            let mut covered = 0;
            for range in ranges.iter().filter(|r| !r.is_empty()) {
                assert_eq!(range.start, covered, "workers={} ranges={:?}", workers, ranges);
                if range.start > 0 && range.start < staged.len() {
                    assert_ne!(staged[range.start - 1].target, staged[range.start].target);
                }
                covered = range.end;
            }
            assert_eq!(covered, staged.len());
        }
    }

    #[test]
    fn test_partition_with_more_workers_than_items() {
        let staged = items(&[7, 7]);
        let ranges: Vec<_> = (0..4).map(|tid| partition(&staged, 4, tid)).collect();
        let total: usize = ranges.iter().map(|r| r.len()).sum();
        assert_eq!(total, 2);
        assert_eq!(ranges.iter().filter(|r| !r.is_empty()).count(), 1);
    }

    #[test]
    fn test_gather_preserves_worker_order() {
        let batch = LevelBatch::new(Vec::new(), 3);
        batch.next[2].lock().push(Staged::remove(30, NodeId::from_raw(3)));
        batch.next[0].lock().push(Staged::remove(10, NodeId::from_raw(1)));
        batch.next[1].lock().push(Staged::remove(20, NodeId::from_raw(2)));
        let keys: Vec<Key> = batch.gather().iter().map(|s| s.key).collect();
        assert_eq!(keys, vec![10, 20, 30]);
        assert!(batch.gather().is_empty());
    }
}

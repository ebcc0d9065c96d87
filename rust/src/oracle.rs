//! Sorted-array reference model.
//!
//! [`SortedArrayOracle`] answers the same batched operations as
//! [`BatchTree`](crate::BatchTree) from a single sorted vector with binary
//! search. It is slow for large batches but obviously correct, and tests
//! and benches replay identical workloads through both and compare.

use crate::types::{Key, KeyValue, Value, KEY_MIN};

/// Brute-force model of the index. Always holds the sentinel first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedArrayOracle {
    entries: Vec<KeyValue>,
}

impl Default for SortedArrayOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl SortedArrayOracle {
    pub fn new() -> Self {
        Self {
            entries: vec![KeyValue::SENTINEL],
        }
    }

    /// Greatest stored pair whose key is not above `key`.
    pub fn predecessor(&self, key: Key) -> KeyValue {
        let slot = self.entries.partition_point(|kv| kv.key <= key);
        // The sentinel sits at slot 0 and is below every key.
        self.entries[slot.saturating_sub(1)]
    }

    pub fn predecessor_batch(&self, keys: &[Key]) -> Vec<KeyValue> {
        keys.iter().map(|&key| self.predecessor(key)).collect()
    }

    pub fn get_batch(&self, keys: &[Key]) -> Vec<Option<Value>> {
        keys.iter()
            .map(|&key| {
                let found = self.predecessor(key);
                (found.key == key && key != KEY_MIN).then_some(found.value)
            })
            .collect()
    }

    /// Insert or replace; for a key repeated in `batch` the last pair wins.
    pub fn insert_batch(&mut self, batch: &[KeyValue]) {
        for kv in batch {
            debug_assert_ne!(kv.key, KEY_MIN);
            match self.entries.binary_search_by_key(&kv.key, |e| e.key) {
                Ok(slot) => self.entries[slot].value = kv.value,
                Err(slot) => self.entries.insert(slot, *kv),
            }
        }
    }

    pub fn remove_batch(&mut self, keys: &[Key]) {
        let mut doomed = keys.to_vec();
        doomed.sort_unstable();
        doomed.dedup();
        self.entries
            .retain(|kv| kv.key == KEY_MIN || doomed.binary_search(&kv.key).is_err());
    }

    /// Number of stored pairs, not counting the sentinel.
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored pairs in key order, without the sentinel.
    pub fn items(&self) -> &[KeyValue] {
        &self.entries[1..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predecessor_scenario() {
        let mut oracle = SortedArrayOracle::new();
        oracle.insert_batch(&[KeyValue::new(10, 1), KeyValue::new(20, 2), KeyValue::new(5, 3)]);
        assert_eq!(
            oracle.predecessor_batch(&[7, 3, 25]),
            vec![KeyValue::new(5, 3), KeyValue::SENTINEL, KeyValue::new(20, 2)]
        );
        assert_eq!(oracle.len(), 3);
    }

    #[test]
    fn test_last_write_wins() {
        let mut oracle = SortedArrayOracle::new();
        oracle.insert_batch(&[KeyValue::new(1, 1), KeyValue::new(1, 2)]);
        assert_eq!(oracle.get_batch(&[1, 2]), vec![Some(2), None]);
    }

    #[test]
    fn test_remove_keeps_sentinel() {
        let mut oracle = SortedArrayOracle::new();
        oracle.insert_batch(&[KeyValue::new(1, 1), KeyValue::new(2, 2)]);
        oracle.remove_batch(&[2, 2, 3, KEY_MIN]);
        assert_eq!(oracle.items(), &[KeyValue::new(1, 1)]);
        assert_eq!(oracle.predecessor(KEY_MIN), KeyValue::SENTINEL);
        assert_eq!(oracle.get_batch(&[KEY_MIN]), vec![None]);
    }
}

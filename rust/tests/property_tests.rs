//! Property tests: any sequence of batches leaves the index equivalent to
//! the oracle and structurally valid.

mod common;

use batchtree::{KeyValue, SortedArrayOracle};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Batch {
    Insert(Vec<(i64, i64)>),
    Remove(Vec<i64>),
}

fn batch_strategy() -> impl Strategy<Value = Batch> {
    let key = -500i64..500;
    prop_oneof![
        prop::collection::vec((key.clone(), any::<i64>()), 0..300).prop_map(Batch::Insert),
        prop::collection::vec(key, 0..300).prop_map(Batch::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_matches_oracle(
        batches in prop::collection::vec(batch_strategy(), 1..12),
        workers in 1usize..5,
    ) {
        let mut tree = common::tree(workers);
        let mut oracle = SortedArrayOracle::new();

        for batch in &batches {
            match batch {
                Batch::Insert(pairs) => {
                    let pairs: Vec<KeyValue> = pairs.iter().map(|&p| p.into()).collect();
                    tree.insert(&pairs).unwrap();
                    oracle.insert_batch(&pairs);
                }
                Batch::Remove(keys) => {
                    tree.remove(keys).unwrap();
                    oracle.remove_batch(keys);
                }
            }
            prop_assert!(tree.check_invariants().is_ok(), "{}", tree.dump());
        }

        prop_assert_eq!(tree.items(), oracle.items().to_vec());
        let probes: Vec<i64> = (-510..510).step_by(3).collect();
        prop_assert_eq!(tree.predecessor(&probes), oracle.predecessor_batch(&probes));
    }

    #[test]
    fn prop_insert_then_remove_all_is_empty(keys in prop::collection::hash_set(-10_000i64..10_000, 0..800)) {
        let mut tree = common::tree(3);
        let keys: Vec<i64> = keys.into_iter().collect();
        tree.insert(&common::pairs(keys.iter().copied())).unwrap();
        prop_assert_eq!(tree.len(), keys.len());
        tree.remove(&keys).unwrap();
        prop_assert!(tree.is_empty());
        prop_assert!(tree.check_invariants().is_ok());
    }
}

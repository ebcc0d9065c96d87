//! Randomized workloads replayed through the index and the sorted-array
//! oracle, for several worker counts.

mod common;

use batchtree::{BatchTree, SortedArrayOracle};
use common::{config, random_keys, random_pairs, rng, roomy_tree};
use rand::Rng;

/// Run `rounds` mixed batches and compare every observable result.
fn replay(tree: &mut BatchTree, seed: u64, rounds: usize, span: i64) {
    let mut oracle = SortedArrayOracle::new();
    let mut rng = rng(seed);

    for round in 0..rounds {
        let size = rng.gen_range(1..2000);
        match rng.gen_range(0..4) {
            0 | 1 => {
                let batch = random_pairs(&mut rng, size, span);
                tree.insert(&batch).unwrap();
                oracle.insert_batch(&batch);
            }
            2 => {
                let keys = random_keys(&mut rng, size, span);
                tree.remove(&keys).unwrap();
                oracle.remove_batch(&keys);
            }
            _ => {
                // Remove mostly present keys to force merges.
                let present: Vec<i64> = oracle
                    .items()
                    .iter()
                    .filter(|_| rng.gen_bool(0.6))
                    .map(|kv| kv.key)
                    .collect();
                tree.remove(&present).unwrap();
                oracle.remove_batch(&present);
            }
        }

        if let Err(err) = tree.check_invariants() {
            panic!("round {} (seed {}): {}\n{}", round, seed, err, tree.dump());
        }
        let queries = random_keys(&mut rng, 500, span + 10);
        assert_eq!(
            tree.predecessor(&queries),
            oracle.predecessor_batch(&queries),
            "predecessors diverged in round {} (seed {})",
            round,
            seed
        );
        assert_eq!(tree.get(&queries), oracle.get_batch(&queries));
        assert_eq!(tree.len(), oracle.len());
    }
    assert_eq!(tree.items(), oracle.items());
}

macro_rules! crosscheck_workers {
    ($($workers:literal),+) => {
        paste::paste! {
            $(
                #[test]
                fn [<test_dense_keys_ $workers _workers>]() {
                    let mut tree = roomy_tree($workers);
                    replay(&mut tree, 0xB7EE + $workers, 40, 3_000);
                }

                #[test]
                fn [<test_sparse_keys_ $workers _workers>]() {
                    let mut tree = roomy_tree($workers);
                    replay(&mut tree, 0x5EED + $workers, 25, i64::MAX / 2);
                }
            )+
        }
    };
}

crosscheck_workers!(1, 2, 4, 8);

fn tree_with_serial_height(workers: usize, serial_height: u32) -> BatchTree {
    BatchTree::new(
        config(workers)
            .with_arena_capacity(1 << 16)
            .with_serial_height(serial_height),
    )
    .unwrap()
}

#[test]
fn test_every_level_serial() {
    let mut tree = tree_with_serial_height(4, 0);
    replay(&mut tree, 0x5E41, 30, 3_000);
}

#[test]
fn test_every_level_parallel() {
    let mut tree = tree_with_serial_height(4, 64);
    replay(&mut tree, 0xA11, 30, 3_000);
}

#[test]
fn test_serial_height_does_not_change_shape() {
    let mut trees: Vec<BatchTree> = [0, 1, 2, 64]
        .iter()
        .map(|&h| tree_with_serial_height(4, h))
        .collect();
    let mut rng = rng(91);
    for _ in 0..10 {
        let inserts = random_pairs(&mut rng, 1500, 20_000);
        let removes = random_keys(&mut rng, 1200, 20_000);
        for tree in &mut trees {
            tree.insert(&inserts).unwrap();
            tree.remove(&removes).unwrap();
            tree.check_invariants().unwrap();
        }
        let reference = trees[0].stats();
        let items = trees[0].items();
        for tree in &trees[1..] {
            assert_eq!(tree.stats().level_sizes, reference.level_sizes);
            assert_eq!(tree.items(), items);
        }
    }
}

#[test]
fn test_worker_count_does_not_change_shape() {
    let mut trees: Vec<BatchTree> = [1, 2, 4, 8].iter().map(|&w| roomy_tree(w)).collect();
    let mut rng = rng(77);
    for _ in 0..15 {
        let inserts = random_pairs(&mut rng, 1500, 20_000);
        let removes = random_keys(&mut rng, 1200, 20_000);
        for tree in &mut trees {
            tree.insert(&inserts).unwrap();
            tree.remove(&removes).unwrap();
        }
        let reference = trees[0].stats();
        let items = trees[0].items();
        for tree in &trees[1..] {
            assert_eq!(tree.stats().level_sizes, reference.level_sizes);
            assert_eq!(tree.items(), items);
        }
    }
}

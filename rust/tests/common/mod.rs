//! Shared helpers for integration tests.

#![allow(dead_code)]

use batchtree::{BatchTree, IndexConfig, KeyValue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn config(workers: usize) -> IndexConfig {
    IndexConfig::default()
        .with_workers(workers)
        .with_arena_capacity(1 << 14)
}

pub fn tree(workers: usize) -> BatchTree {
    BatchTree::new(config(workers)).unwrap()
}

/// Tree with room for long randomized workloads, which leave many orphaned
/// nodes behind.
pub fn roomy_tree(workers: usize) -> BatchTree {
    BatchTree::new(config(workers).with_arena_capacity(1 << 16)).unwrap()
}

pub fn pairs(keys: impl IntoIterator<Item = i64>) -> Vec<KeyValue> {
    keys.into_iter().map(|k| KeyValue::new(k, value_for(k))).collect()
}

pub fn value_for(key: i64) -> i64 {
    key.wrapping_mul(31).wrapping_add(7)
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Random keys in `[-span, span]`, excluding the reserved minimum.
pub fn random_keys(rng: &mut StdRng, count: usize, span: i64) -> Vec<i64> {
    (0..count).map(|_| rng.gen_range(-span..=span)).collect()
}

pub fn random_pairs(rng: &mut StdRng, count: usize, span: i64) -> Vec<KeyValue> {
    (0..count)
        .map(|_| KeyValue::new(rng.gen_range(-span..=span), rng.gen()))
        .collect()
}

//! Batch-parallel B+ tree index over `i64` keys and values.
//!
//! This crate provides [`BatchTree`], an ordered index whose mutations are
//! whole batches. A batch is sorted, routed to its leaves and then applied
//! one tree level at a time: the lower levels by a fixed pool of worker
//! threads that each own a disjoint run of nodes, the upper levels by a
//! single worker. Nodes hold at most 16 entries, split on overflow and are
//! merged with their right siblings when they fall below half.
//!
//! Queries come in batches too: [`BatchTree::predecessor`] returns the
//! greatest stored key not above each query, and [`BatchTree::get`] the
//! exact matches. Every tree carries a sentinel pair keyed [`KEY_MIN`], so
//! a predecessor query always has an answer.
//!
//! [`SortedArrayOracle`] is a brute-force model with the same batch
//! semantics, meant for cross-checking.
//!
//! ```
//! use batchtree::{BatchTree, IndexConfig, KeyValue};
//!
//! let mut tree = BatchTree::new(IndexConfig::default().with_workers(4)).unwrap();
//! let batch: Vec<KeyValue> = (1..=1000).map(|k| KeyValue::new(k, k * 10)).collect();
//! tree.insert(&batch).unwrap();
//!
//! let evens: Vec<i64> = (2..=1000).step_by(2).collect();
//! tree.remove(&evens).unwrap();
//!
//! assert_eq!(tree.predecessor(&[4])[0], KeyValue::new(3, 30));
//! assert!(tree.check_invariants().is_ok());
//! ```

#[macro_use]
mod macros;

mod arena;
mod config;
mod construction;
mod delete_operations;
mod error;
mod get_operations;
mod insert_operations;
mod node;
mod operation;
mod oracle;
mod orchestrator;
mod staging;
mod tree_structure;
mod types;
mod validation;

pub use arena::ArenaStats;
pub use config::{IndexConfig, DEFAULT_ARENA_CAPACITY, DEFAULT_SERIAL_HEIGHT, MAX_WORKERS};
pub use error::{IndexError, IndexResultExt, InitResult, ModifyResult};
pub use operation::{BatchOutcome, Operation, OperationKind};
pub use oracle::SortedArrayOracle;
pub use tree_structure::TreeStats;
pub use types::{
    BatchTree, Entry, Key, KeyValue, Node, NodeId, SearchHit, Value, CAPACITY, HALF_CAPACITY,
    KEY_MIN, NULL_NODE, NULL_VALUE, ROOT_NODE,
};

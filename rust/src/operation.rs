//! Tagged operations and batch dispatch.
//!
//! Callers that receive work as a stream of mixed requests can group it by
//! kind and hand each homogeneous batch to [`BatchTree::apply`].

use std::fmt;

use crate::error::{IndexError, ModifyResult};
use crate::types::{BatchTree, Key, KeyValue, Value};

/// One request against the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Exact-match lookup.
    Get(Key),
    /// Set the value of a key, inserting it when absent.
    Update(KeyValue),
    /// Greatest stored key not above the given key.
    Predecessor(Key),
    /// Insert or replace a pair.
    Insert(KeyValue),
    /// Remove a key if present.
    Remove(Key),
}

/// Discriminant of an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Get,
    Update,
    Predecessor,
    Insert,
    Remove,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Get => "get",
            OperationKind::Update => "update",
            OperationKind::Predecessor => "predecessor",
            OperationKind::Insert => "insert",
            OperationKind::Remove => "remove",
        };
        f.write_str(name)
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Get(_) => OperationKind::Get,
            Operation::Update(_) => OperationKind::Update,
            Operation::Predecessor(_) => OperationKind::Predecessor,
            Operation::Insert(_) => OperationKind::Insert,
            Operation::Remove(_) => OperationKind::Remove,
        }
    }

    fn key(&self) -> Key {
        match *self {
            Operation::Get(key) | Operation::Predecessor(key) | Operation::Remove(key) => key,
            Operation::Update(kv) | Operation::Insert(kv) => kv.key,
        }
    }

    fn pair(&self) -> Option<KeyValue> {
        match *self {
            Operation::Update(kv) | Operation::Insert(kv) => Some(kv),
            _ => None,
        }
    }
}

/// Result of applying one homogeneous batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// One entry per `Get`, in batch order.
    Values(Vec<Option<Value>>),
    /// One entry per `Predecessor`, in batch order.
    Predecessors(Vec<KeyValue>),
    /// The batch was a mutation and has been applied.
    Applied,
}

impl BatchTree {
    /// Run a batch of operations that all share one kind.
    ///
    /// An empty batch does nothing and reports [`BatchOutcome::Applied`].
    ///
    /// # Errors
    ///
    /// [`IndexError::MixedBatch`] if the batch mixes kinds, and whatever
    /// the underlying mutation returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use batchtree::{BatchOutcome, BatchTree, IndexConfig, KeyValue, Operation};
    ///
    /// let mut tree = BatchTree::new(IndexConfig::default()).unwrap();
    /// tree.apply(&[Operation::Insert(KeyValue::new(3, 30))]).unwrap();
    /// let outcome = tree.apply(&[Operation::Get(3), Operation::Get(4)]).unwrap();
    /// assert_eq!(outcome, BatchOutcome::Values(vec![Some(30), None]));
    ///
    /// assert!(tree.apply(&[Operation::Get(3), Operation::Remove(3)]).is_err());
    /// ```
    pub fn apply(&mut self, ops: &[Operation]) -> ModifyResult<BatchOutcome> {
        let kind = match ops.first() {
            Some(op) => op.kind(),
            None => return Ok(BatchOutcome::Applied),
        };
        if let Some(position) = ops.iter().position(|op| op.kind() != kind) {
            return Err(IndexError::mixed_batch(
                &kind.to_string(),
                &ops[position].kind().to_string(),
                position,
            ));
        }

        let keys = || ops.iter().map(Operation::key).collect::<Vec<_>>();
        match kind {
            OperationKind::Get => Ok(BatchOutcome::Values(self.get(&keys()))),
            OperationKind::Predecessor => Ok(BatchOutcome::Predecessors(self.predecessor(&keys()))),
            OperationKind::Update | OperationKind::Insert => {
                let pairs: Vec<KeyValue> = ops.iter().filter_map(Operation::pair).collect();
                self.insert(&pairs)?;
                Ok(BatchOutcome::Applied)
            }
            OperationKind::Remove => {
                self.remove(&keys())?;
                Ok(BatchOutcome::Applied)
            }
        }
    }
}

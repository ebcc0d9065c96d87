//! Error handling and result types for BatchTree operations.
//!
//! Only misuse of the public API is reported through these types. Structural
//! invariant violations inside the engine are fatal and panic via `fatal!`.

use thiserror::Error;

use crate::types::{Key, KEY_MIN};

/// Error type for BatchTree operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// Invalid configuration supplied at construction.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// A batch used the key reserved for the sentinel entry.
    #[error("Reserved key: {0}")]
    ReservedKey(String),
    /// An operation batch mixed several operation kinds.
    #[error("Mixed batch: {0}")]
    MixedBatch(String),
    /// Tree corruption detected by the invariant checker.
    #[error("Corrupted tree: {0}")]
    CorruptedTree(String),
}

impl IndexError {
    /// Create an InvalidConfig error with context
    pub fn invalid_config(field: &str, details: &str) -> Self {
        Self::InvalidConfig(format!("{}: {}", field, details))
    }

    /// Create a ReservedKey error with context
    pub fn reserved_key(operation: &str, key: Key) -> Self {
        Self::ReservedKey(format!(
            "{} batch contains key {}, which is reserved for the sentinel",
            operation, key
        ))
    }

    /// Create a MixedBatch error with context
    pub fn mixed_batch(expected: &str, found: &str, position: usize) -> Self {
        Self::MixedBatch(format!(
            "expected only {} operations, found {} at position {}",
            expected, found, position
        ))
    }

    /// Create a CorruptedTree error with context
    pub fn corrupted_tree(component: &str, details: &str) -> Self {
        Self::CorruptedTree(format!("{} corruption: {}", component, details))
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }

    /// Check if this error reports a corrupted tree
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::CorruptedTree(_))
    }
}

/// Internal result type for tree operations
pub(crate) type TreeResult<T> = Result<T, IndexError>;

/// Result type for tree construction and validation
pub type InitResult<T> = Result<T, IndexError>;

/// Result type for batch mutations
pub type ModifyResult<T> = Result<T, IndexError>;

/// Reject a batch that uses the sentinel key.
pub(crate) fn reject_reserved(operation: &str, mut keys: impl Iterator<Item = Key>) -> ModifyResult<()> {
    match keys.find(|&key| key == KEY_MIN) {
        Some(key) => Err(IndexError::reserved_key(operation, key)),
        None => Ok(()),
    }
}

/// Result extension trait for improved error handling
pub trait IndexResultExt<T> {
    /// Prefix the error message with additional context
    fn with_context(self, context: &str) -> Result<T, IndexError>;
}

impl<T> IndexResultExt<T> for Result<T, IndexError> {
    fn with_context(self, context: &str) -> Result<T, IndexError> {
        self.map_err(|e| match e {
            IndexError::InvalidConfig(msg) => {
                IndexError::InvalidConfig(format!("{}: {}", context, msg))
            }
            IndexError::ReservedKey(msg) => IndexError::ReservedKey(format!("{}: {}", context, msg)),
            IndexError::MixedBatch(msg) => IndexError::MixedBatch(format!("{}: {}", context, msg)),
            IndexError::CorruptedTree(msg) => IndexError::CorruptedTree(format!("{}: {}", context, msg)),
        })
    }
}

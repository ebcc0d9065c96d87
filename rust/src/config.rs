//! Runtime configuration for BatchTree.

use std::num::NonZeroUsize;
use std::thread;

use crate::error::{IndexError, IndexResultExt, InitResult};

/// Default number of node slots reserved by the arena.
pub const DEFAULT_ARENA_CAPACITY: usize = 1 << 16;

/// Levels below this height are rewritten by every worker in parallel.
pub const DEFAULT_SERIAL_HEIGHT: u32 = 2;

/// Upper bound on the worker pool.
pub const MAX_WORKERS: usize = 256;

/// Worker pool size, arena size and serial threshold for one tree.
///
/// # Examples
///
/// ```
/// use batchtree::IndexConfig;
///
/// let config = IndexConfig::default()
///     .with_workers(4)
///     .with_arena_capacity(1 << 12);
/// assert_eq!(config.workers(), 4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub(crate) workers: usize,
    pub(crate) arena_capacity: usize,
    pub(crate) serial_height: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let workers = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
            .min(MAX_WORKERS);
        Self {
            workers,
            arena_capacity: DEFAULT_ARENA_CAPACITY,
            serial_height: DEFAULT_SERIAL_HEIGHT,
        }
    }
}

impl IndexConfig {
    /// Set the number of worker threads used per batch.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the number of node slots the arena reserves up front.
    pub fn with_arena_capacity(mut self, arena_capacity: usize) -> Self {
        self.arena_capacity = arena_capacity;
        self
    }

    /// Set the first level that is rewritten by a single worker.
    pub fn with_serial_height(mut self, serial_height: u32) -> Self {
        self.serial_height = serial_height;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn arena_capacity(&self) -> usize {
        self.arena_capacity
    }

    pub fn serial_height(&self) -> u32 {
        self.serial_height
    }

    /// Check that every field is usable.
    pub fn validate(&self) -> InitResult<()> {
        self.check_fields().with_context("IndexConfig::validate")
    }

    fn check_fields(&self) -> InitResult<()> {
        if self.workers == 0 {
            return Err(IndexError::invalid_config("workers", "must be at least 1"));
        }
        if self.workers > MAX_WORKERS {
            return Err(IndexError::invalid_config(
                "workers",
                &format!("{} exceeds the maximum of {}", self.workers, MAX_WORKERS),
            ));
        }
        if self.arena_capacity == 0 {
            return Err(IndexError::invalid_config(
                "arena_capacity",
                "must hold at least the root node",
            ));
        }
        if self.arena_capacity >= u32::MAX as usize {
            return Err(IndexError::invalid_config(
                "arena_capacity",
                &format!("{} slots cannot be addressed by 32-bit handles", self.arena_capacity),
            ));
        }
        Ok(())
    }
}

//! Construction and initialization logic for BatchTree.
//!
//! This module contains tree construction, the root handle accessors and
//! the small amount of setup the arena needs before the first batch: one
//! root leaf at slot 0 holding the minimum sentinel.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, info};

use crate::arena::NodeArena;
use crate::config::IndexConfig;
use crate::error::InitResult;
use crate::orchestrator::Orchestrator;
use crate::types::{BatchTree, Entry, Node, NodeId, KEY_MIN, NULL_NODE, ROOT_NODE};

impl BatchTree {
    /// Create an index with the given configuration.
    ///
    /// The arena reserves `config.arena_capacity()` node slots up front and
    /// the root leaf is written into slot 0 with the sentinel entry.
    ///
    /// # Examples
    ///
    /// ```
    /// use batchtree::{BatchTree, IndexConfig};
    ///
    /// let tree = BatchTree::new(IndexConfig::default().with_workers(4)).unwrap();
    /// assert_eq!(tree.height(), 0);
    /// assert_eq!(tree.len(), 0);
    ///
    /// assert!(BatchTree::new(IndexConfig::default().with_workers(0)).is_err());
    /// ```
    pub fn new(config: IndexConfig) -> InitResult<Self> {
        config.validate()?;

        let arena = NodeArena::with_capacity(config.arena_capacity());
        let root = arena.allocate();
        ensure_invariant!(root == ROOT_NODE, "first allocation landed in {}", root);
        arena.write(
            root,
            &Node::filled(0, NULL_NODE, NULL_NODE, &[(KEY_MIN, Entry::Null)]),
        );

        debug!(
            workers = config.workers(),
            arena_capacity = config.arena_capacity(),
            serial_height = config.serial_height(),
            "index created"
        );

        Ok(Self {
            config,
            arena,
            root: AtomicU32::new(root.raw()),
        })
    }

    /// Create an index with [`IndexConfig::default`].
    pub fn with_default_config() -> InitResult<Self> {
        Self::new(IndexConfig::default())
    }

    /// Configuration this index was built with.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Handle of the current root.
    pub fn root(&self) -> NodeId {
        NodeId::from_raw(self.root.load(Ordering::Acquire))
    }

    /// Height of the root; 0 while the root is a leaf.
    pub fn height(&self) -> u32 {
        self.arena.read(self.root()).height()
    }

    /// Install a freshly allocated root one level above the old one.
    pub(crate) fn set_root(&self, root: NodeId) {
        let old = NodeId::from_raw(self.root.swap(root.raw(), Ordering::AcqRel));
        info!(old = %old, new = %root, "root grew");
    }

    pub(crate) fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.config.workers(), self.config.serial_height())
    }
}

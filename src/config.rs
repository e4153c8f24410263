//! Configuration for hashkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Default bucket capacity of the first hash table (1 << 17).
pub const DEFAULT_FIRST_TABLE_MAX_COUNT: u64 = 1 << 17;

/// Default maximum mean collision-chain length before a new table is
/// appended to the chain.
pub const DEFAULT_MAX_MEAN_COLLISION: u64 = 3;

/// Main configuration for a hashkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the database file (created if missing)
    pub path: PathBuf,

    // -------------------------------------------------------------------------
    // Layout Configuration
    // -------------------------------------------------------------------------
    /// Bucket capacity of the first hash table. Only consulted when the file
    /// is created; existing files keep the capacity recorded in their header.
    pub first_table_max_count: u64,

    /// Storage/compression type tag persisted in the header. Opaque to the
    /// engine: callers encode/decode value bytes themselves and use the tag
    /// to know how. 0 means raw bytes.
    pub storage_type: u8,

    // -------------------------------------------------------------------------
    // Growth Configuration
    // -------------------------------------------------------------------------
    /// A table is considered full when `count >= max_count * max_mean_collision`;
    /// the next insert then appends a new table with doubled capacity.
    pub max_mean_collision: u64,

    // -------------------------------------------------------------------------
    // Transaction Configuration
    // -------------------------------------------------------------------------
    /// How implicit transactions are batched when the caller has not begun
    /// an explicit one.
    pub txn_batch_policy: TxnBatchPolicy,
}

/// Implicit-transaction batching policy
#[derive(Debug, Clone, Copy)]
pub enum TxnBatchPolicy {
    /// Commit after every mutating call (safest, slowest)
    EveryOp,

    /// Commit after N mutating calls (amortizes the header write + fsync)
    EveryNOps { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./hashkv.db"),
            first_table_max_count: DEFAULT_FIRST_TABLE_MAX_COUNT,
            storage_type: 0,
            max_mean_collision: DEFAULT_MAX_MEAN_COLLISION,
            txn_batch_policy: TxnBatchPolicy::EveryNOps { count: 100 },
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the database file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the first table's bucket capacity (used at file creation)
    pub fn first_table_max_count(mut self, count: u64) -> Self {
        self.config.first_table_max_count = count;
        self
    }

    /// Set the storage/compression type tag (opaque to the engine)
    pub fn storage_type(mut self, tag: u8) -> Self {
        self.config.storage_type = tag;
        self
    }

    /// Set the mean collision-chain length that triggers table growth
    pub fn max_mean_collision(mut self, mean: u64) -> Self {
        self.config.max_mean_collision = mean;
        self
    }

    /// Set the implicit-transaction batching policy
    pub fn txn_batch_policy(mut self, policy: TxnBatchPolicy) -> Self {
        self.config.txn_batch_policy = policy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

//! Error types for hashkv
//!
//! Provides a unified error type for all operations.
//!
//! Key absence is deliberately *not* an error: `get` reports it through
//! `Option` and `delete` through `bool`.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for hashkv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // File Format Errors
    // -------------------------------------------------------------------------
    /// Bad magic, unsupported version, or a truncated header/table.
    /// The file is rejected as foreign or incompatible; no auto-repair.
    #[error("format error: {0}")]
    Format(String),

    /// A block or table decoded to an inconsistent length or offset.
    /// Surfaced as-is; the engine does not attempt self-healing.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    // -------------------------------------------------------------------------
    // Allocation Errors
    // -------------------------------------------------------------------------
    /// The allocator cannot grow the file any further. No partial write is
    /// left referenced by live structures.
    #[error("out of space: {0}")]
    OutOfSpace(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Transaction Errors
    // -------------------------------------------------------------------------
    /// begin while a transaction is active, or commit/rollback while idle.
    /// Programmer error, surfaced immediately.
    #[error("transaction state error: {0}")]
    TransactionState(String),
}

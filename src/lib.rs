//! # hashkv
//!
//! An embedded key-value storage engine. A single file on disk holds:
//! - a fixed header (magic, version, free-list heads, file size)
//! - a chain of extensible hash tables, each guarded by a bloom filter
//! - a heap of variable-length key/value blocks recycled through 64
//!   size-classed free lists
//!
//! There is no server, no network layer, and no query language: values are
//! opaque byte sequences reached through get/put/delete, and a transaction
//! layer stages mutations in memory before fusing them into the file.
//!
//! ## File Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header                                                      │
//! │  magic ─ version ─ first capacity ─ storage type ─          │
//! │  file size ─ 64 free-list heads                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Table 0 (first)                                             │
//! │  next table ─ count ─ bloom size ─ capacity                 │
//! │  bloom filter bits                                          │
//! │  bucket head offsets ──────────────┐                        │
//! ├────────────────────────────────────┼────────────────────────┤
//! │ Block heap                         ▼                        │
//! │  ┌───────┐  next   ┌───────┐  next                          │
//! │  │ block │ ───────▶│ block │ ───────▶ 0                     │
//! │  └───────┘         └───────┘                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Table 1 (appended when table 0 overflows) ...               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lookups scan tables newest → oldest; each table's bloom filter
//! short-circuits most negative probes before any chain is walked. Inserts
//! always land in the newest table. When a table's mean collision-chain
//! length crosses the configured maximum, a new table with doubled capacity
//! is appended; nothing is ever rehashed in place.
//!
//! Mutations are staged by a transaction (explicit, or an implicit batch
//! the engine opens on its own) and applied in one deterministic step at
//! commit, with the header written last so an interrupted commit leaves the
//! previously committed state reachable.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod block;
pub mod bloom;
pub mod freelist;
pub mod header;
pub mod table;
pub mod transaction;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, TxnBatchPolicy};
pub use engine::Engine;
pub use error::{KvError, Result};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of hashkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

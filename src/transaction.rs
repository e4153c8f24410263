//! Transaction Layer
//!
//! In-memory staging for mutations. While a transaction is active every
//! table/bucket/free-list change is recorded here instead of the file; the
//! engine fuses the staged state into the file in one deterministic apply
//! step at commit, or drops it wholesale on rollback.
//!
//! ## Staging structures
//! - **Shadow tables**: one record per table in the chain (count, capacity,
//!   bloom size, offset) plus a sparse map of touched bloom-filter bytes.
//!   Tables appended during the transaction are shadow-only until commit.
//! - **Items**: per-logical-key final intent: the offset of the block now
//!   holding the key, or a tombstone. Multiple operations on one key within
//!   a transaction coalesce here (last write wins).
//! - **Buckets**: the ordered block-offset chain now forming each modified
//!   bucket, keyed by (table index, cell index).
//! - **Blocks**: encoded images of blocks written during the transaction,
//!   keyed by their allocated offset. Images reach the file only at commit,
//!   so rollback performs no file mutation at all.
//! - **Free lists**: staged per-class heads plus the blocks freed within
//!   the transaction.
//! - **File size**: grows monotonically as fresh blocks and tables are
//!   appended past the committed end of file.
//!
//! Reads inside the transaction consult these overlays before falling back
//! to committed on-disk state (read-your-writes). Only one transaction is
//! open at a time; the engine owns it exclusively.

use std::collections::HashMap;

use crate::bloom;
use crate::error::{KvError, Result};
use crate::freelist::{FreeLists, StagedFreeLists};
use crate::table::Table;

/// Shadow record of one hash table
#[derive(Debug)]
pub(crate) struct TxTable {
    /// File offset of the table (staged offset for tables appended here)
    pub offset: u64,

    /// Staged live-block count
    pub count: u64,

    /// Bucket slot capacity
    pub max_count: u64,

    /// Bloom filter size in bytes
    pub bloom_size: u64,

    /// Touched bloom-filter bytes: byte index → staged value
    pub bloom_patches: HashMap<u64, u8>,

    /// True if the table was appended during this transaction and has no
    /// on-disk region yet
    pub is_new: bool,
}

/// Final staged intent for one logical key. The owning bucket is tracked by
/// the chain overlay, not per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemState {
    /// The key's value now lives in the staged block at this offset
    Written { offset: u64 },

    /// The key was deleted
    Deleted,
}

/// An open transaction's staging state
#[derive(Debug)]
pub struct Transaction {
    /// Staged logical file size (monotonically growing)
    pub(crate) file_size: u64,

    /// Shadow of the full table chain, oldest first
    pub(crate) tables: Vec<TxTable>,

    /// Per-key coalesced intents
    pub(crate) items: HashMap<Vec<u8>, ItemState>,

    /// Staged bucket chains keyed by (table index, cell index)
    pub(crate) buckets: HashMap<(usize, u64), Vec<u64>>,

    /// Staged block images keyed by offset
    pub(crate) blocks: HashMap<u64, Vec<u8>>,

    /// Staged free-list view
    pub(crate) free: StagedFreeLists,

    /// True for engine-opened implicit transactions
    pub(crate) implicit: bool,

    /// Mutating operations performed so far (implicit batching)
    pub(crate) ops: usize,
}

impl Transaction {
    /// Open a transaction over the engine's committed state
    pub(crate) fn new(
        file_size: u64,
        free_lists: &FreeLists,
        tables: &[Table],
        implicit: bool,
    ) -> Self {
        let shadows = tables
            .iter()
            .map(|t| TxTable {
                offset: t.offset,
                count: t.count,
                max_count: t.max_count,
                bloom_size: t.bloom_size,
                bloom_patches: HashMap::new(),
                is_new: false,
            })
            .collect();

        Self {
            file_size,
            tables: shadows,
            items: HashMap::new(),
            buckets: HashMap::new(),
            blocks: HashMap::new(),
            free: StagedFreeLists::from_committed(free_lists),
            implicit,
            ops: 0,
        }
    }

    /// Staged chain for a bucket, if that bucket was modified
    pub(crate) fn staged_bucket(&self, table_index: usize, cell: u64) -> Option<&[u64]> {
        self.buckets
            .get(&(table_index, cell))
            .map(|chain| chain.as_slice())
    }

    /// Replace a bucket's staged chain
    pub(crate) fn set_bucket(&mut self, table_index: usize, cell: u64, chain: Vec<u64>) {
        self.buckets.insert((table_index, cell), chain);
    }

    /// Staged image of a block, if one was written in this transaction
    pub(crate) fn block_image(&self, offset: u64) -> Option<&[u8]> {
        self.blocks.get(&offset).map(|b| b.as_slice())
    }

    /// Stage a block image at its allocated offset
    pub(crate) fn stage_block(&mut self, offset: u64, image: Vec<u8>) {
        self.blocks.insert(offset, image);
    }

    /// Drop a staged image (the block was freed before commit)
    pub(crate) fn drop_block(&mut self, offset: u64) {
        self.blocks.remove(&offset);
    }

    /// Staged bloom-filter byte, if touched
    pub(crate) fn bloom_patch(&self, table_index: usize, byte: u64) -> Option<u8> {
        self.tables[table_index].bloom_patches.get(&byte).copied()
    }

    /// Append a new shadow-only table to the chain, reserving its region at
    /// the staged end of file. Returns the new table's index.
    pub(crate) fn append_table(&mut self, max_count: u64) -> Result<usize> {
        let size = Table::size_on_disk(max_count);
        let offset = self.file_size;
        self.file_size = self.file_size.checked_add(size).ok_or_else(|| {
            KvError::OutOfSpace("file size overflow appending a table".to_string())
        })?;

        self.tables.push(TxTable {
            offset,
            count: 0,
            max_count,
            bloom_size: bloom::filter_size(max_count),
            bloom_patches: HashMap::new(),
            is_new: true,
        });
        Ok(self.tables.len() - 1)
    }
}

//! Hash Table
//!
//! One table per level of the hash chain. A table is a fixed-capacity array
//! of bucket slots (each holding the head offset of a block chain), guarded
//! by a bloom filter. Tables never rehash in place: when the mean collision
//! chain length crosses the configured maximum, a new table with doubled
//! capacity is appended and becomes the target for inserts, while older
//! tables remain searchable. Lookups scan newest to oldest.
//!
//! ## Layout (little-endian)
//! ```text
//! ┌─────────┬──────────┬───────────────┬──────────────┬────────────────┬───────────────────┐
//! │ next(8) │ count(8) │ bloom_size(8) │ max_count(8) │ bloom bits(var)│ buckets(max_count×8)│
//! └─────────┴──────────┴───────────────┴──────────────┴────────────────┴───────────────────┘
//! ```
//! `next` is the file offset of the next table in the chain (0 at the end).
//! The chain is acyclic by construction: tables are only ever appended.

use bytes::{Buf, BufMut};

use crate::bloom;
use crate::error::{KvError, Result};

/// Fixed table header: next offset + count + bloom size + max count
pub const TABLE_HEADER_SIZE: u64 = 8 * 4;

/// Longest table chain accepted on open. Capacities double per level, so
/// any real chain is far shorter; the cap bounds traversal of corrupt files.
pub const MAX_CHAIN_LEN: usize = 64;

/// In-memory descriptor of one on-disk table
#[derive(Debug, Clone)]
pub struct Table {
    /// File offset of this table's header
    pub offset: u64,

    /// Offset of the next table in the chain (0 if this is the newest)
    pub next_table_offset: u64,

    /// Live blocks inserted through this table
    pub count: u64,

    /// Bloom filter size in bytes
    pub bloom_size: u64,

    /// Bucket slot capacity
    pub max_count: u64,
}

impl Table {
    /// Descriptor for a brand new table at `offset`
    pub fn new_at(offset: u64, max_count: u64) -> Self {
        Self {
            offset,
            next_table_offset: 0,
            count: 0,
            bloom_size: bloom::filter_size(max_count),
            max_count,
        }
    }

    /// Total on-disk size of a table with the given capacity
    pub fn size_on_disk(max_count: u64) -> u64 {
        TABLE_HEADER_SIZE + bloom::filter_size(max_count) + max_count * 8
    }

    /// Decode a table header read at `offset`
    pub fn decode_header(offset: u64, mut buf: &[u8]) -> Result<Self> {
        if (buf.len() as u64) < TABLE_HEADER_SIZE {
            return Err(KvError::Format(format!(
                "truncated table header at offset {}",
                offset
            )));
        }
        let next_table_offset = buf.get_u64_le();
        let count = buf.get_u64_le();
        let bloom_size = buf.get_u64_le();
        let max_count = buf.get_u64_le();

        if max_count == 0 {
            return Err(KvError::Corrupt(format!(
                "table at offset {} has zero capacity",
                offset
            )));
        }
        if bloom_size != bloom::filter_size(max_count) {
            return Err(KvError::Corrupt(format!(
                "table at offset {} has bloom size {} for capacity {}",
                offset, bloom_size, max_count
            )));
        }
        Ok(Self {
            offset,
            next_table_offset,
            count,
            bloom_size,
            max_count,
        })
    }

    /// Encode the 32-byte table header
    pub fn encode_header(&self) -> [u8; TABLE_HEADER_SIZE as usize] {
        let mut out = [0u8; TABLE_HEADER_SIZE as usize];
        let mut buf = &mut out[..];
        buf.put_u64_le(self.next_table_offset);
        buf.put_u64_le(self.count);
        buf.put_u64_le(self.bloom_size);
        buf.put_u64_le(self.max_count);
        out
    }

    /// File offset of the bloom filter bitmap
    pub fn bloom_offset(&self) -> u64 {
        self.offset + TABLE_HEADER_SIZE
    }

    /// File offset of a bucket's head slot
    pub fn bucket_slot_offset(&self, cell: u64) -> u64 {
        self.offset + TABLE_HEADER_SIZE + self.bloom_size + cell * 8
    }

    /// Bucket index of a key hash in this table
    pub fn bucket_index(&self, hash: u32) -> u64 {
        hash as u64 % self.max_count
    }

    /// Whether the mean collision-chain length has crossed the growth
    /// threshold, i.e. the next insert should append a new table
    pub fn is_full(&self, max_mean_collision: u64) -> bool {
        self.count >= self.max_count.saturating_mul(max_mean_collision)
    }

    /// First byte past the end of this table's region
    pub fn end_offset(&self) -> u64 {
        self.offset + Self::size_on_disk(self.max_count)
    }
}

//! File header codec
//!
//! The header is the first 537 bytes of the file and is the source of truth
//! for the free-list heads and the logical file size. It is always written
//! last during a commit, after every block and table it references already
//! exists on disk.
//!
//! ## Layout (little-endian)
//! ```text
//! ┌──────────┬───────────┬─────────────────┬────────────┬───────────┬──────────────────┐
//! │ magic(4) │ version(4)│ first_maxcount(8)│ storage(1) │ filesize(8)│ free heads(64×8) │
//! └──────────┴───────────┴─────────────────┴────────────┴───────────┴──────────────────┘
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{KvError, Result};
use crate::freelist::{FreeLists, SIZE_CLASSES};

/// Magic marker identifying a hashkv file
pub const MAGIC: [u8; 4] = *b"HKVF";

/// Current file format version
pub const VERSION: u32 = 1;

/// Fixed header size: magic + version + first_maxcount + storage type +
/// file size + 64 free-list heads
pub const HEADER_SIZE: u64 = (4 + 4 + 8 + 1 + 8 + SIZE_CLASSES * 8) as u64;

/// Decoded file header
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Bucket capacity of the first table (fixed at creation)
    pub first_table_max_count: u64,

    /// Opaque storage/compression type tag chosen at creation
    pub storage_type: u8,

    /// Logical size of the file; the writable boundary for fresh blocks
    pub file_size: u64,

    /// Per-size-class free-list head offsets
    pub free_lists: FreeLists,
}

impl FileHeader {
    /// Header for a freshly created file
    pub fn new(first_table_max_count: u64, storage_type: u8, file_size: u64) -> Self {
        Self {
            first_table_max_count,
            storage_type,
            file_size,
            free_lists: FreeLists::new(),
        }
    }

    /// Encode to the exact on-disk byte layout
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE as usize);
        buf.put_slice(&MAGIC);
        buf.put_u32_le(VERSION);
        buf.put_u64_le(self.first_table_max_count);
        buf.put_u8(self.storage_type);
        buf.put_u64_le(self.file_size);
        for &head in self.free_lists.heads() {
            buf.put_u64_le(head);
        }
        debug_assert_eq!(buf.len() as u64, HEADER_SIZE);
        buf
    }

    /// Decode and validate a header read from disk.
    ///
    /// A short buffer, wrong magic, or unsupported version rejects the file
    /// as foreign/incompatible.
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if (buf.len() as u64) < HEADER_SIZE {
            return Err(KvError::Format(format!(
                "truncated header: {} bytes, expected {}",
                buf.len(),
                HEADER_SIZE
            )));
        }

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(KvError::Format(format!(
                "invalid magic: expected {:?}, got {:?}",
                MAGIC, magic
            )));
        }

        let version = buf.get_u32_le();
        if version != VERSION {
            return Err(KvError::Format(format!(
                "unsupported format version: {}",
                version
            )));
        }

        let first_table_max_count = buf.get_u64_le();
        let storage_type = buf.get_u8();
        let file_size = buf.get_u64_le();

        if first_table_max_count == 0 {
            return Err(KvError::Format(
                "first table capacity is zero".to_string(),
            ));
        }
        if file_size < HEADER_SIZE {
            return Err(KvError::Format(format!(
                "recorded file size {} smaller than the header",
                file_size
            )));
        }

        let mut heads = [0u64; SIZE_CLASSES];
        for head in heads.iter_mut() {
            *head = buf.get_u64_le();
        }

        Ok(Self {
            first_table_max_count,
            storage_type,
            file_size,
            free_lists: FreeLists::from_heads(heads),
        })
    }
}

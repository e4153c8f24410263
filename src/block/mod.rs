//! Block Layer
//!
//! Encodes and decodes a single key-value record at a byte offset in the
//! file. Blocks chain intrusively: the leading next-offset links to the
//! next block in the same bucket (or is 0 at chain end), and the same field
//! is repurposed as the free-list link while the block is free.
//!
//! ## Layout (little-endian)
//! ```text
//! ┌─────────┬─────────┬─────────┬────────────┬─────┬──────────────┬───────┐
//! │ next(8) │ hash(4) │ log2(1) │ key_len(8) │ key │ value_len(8) │ value │
//! └─────────┴─────────┴─────────┴────────────┴─────┴──────────────┴───────┘
//! ```
//! The 21-byte fixed prefix is read on its own during chain walks; the
//! cached 32-bit key hash lets a walk skip most non-matching blocks without
//! reading their key bytes.
//!
//! A block's physical size is always a power of two (2^log2) and at least
//! large enough for the full record, so the free-list allocator can reclaim
//! it under the recorded class.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{KvError, Result};
use crate::freelist;

/// Fixed prefix before the key bytes: next + hash + log2 size + key length
pub const BLOCK_PREFIX_SIZE: u64 = 8 + 4 + 1 + 8;

/// Total per-record overhead: prefix + the value length field
pub const BLOCK_OVERHEAD: u64 = BLOCK_PREFIX_SIZE + 8;

/// Decoded fixed prefix of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Offset of the next block in the bucket chain (0 terminates)
    pub next_offset: u64,

    /// Cached 32-bit hash of the key
    pub hash: u32,

    /// log2 of the block's allocated physical size
    pub size_class: u8,

    /// Length of the key bytes that follow the prefix
    pub key_len: u64,
}

impl BlockHeader {
    /// Decode the 21-byte prefix
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if (buf.len() as u64) < BLOCK_PREFIX_SIZE {
            return Err(KvError::Corrupt(format!(
                "truncated block prefix: {} bytes",
                buf.len()
            )));
        }
        let next_offset = buf.get_u64_le();
        let hash = buf.get_u32_le();
        let size_class = buf.get_u8();
        let key_len = buf.get_u64_le();

        if size_class as usize >= freelist::SIZE_CLASSES {
            return Err(KvError::Corrupt(format!(
                "block size class {} out of range",
                size_class
            )));
        }
        if BLOCK_OVERHEAD + key_len > freelist::class_size(size_class) {
            return Err(KvError::Corrupt(format!(
                "key of {} bytes does not fit a class-{} block",
                key_len, size_class
            )));
        }
        Ok(Self {
            next_offset,
            hash,
            size_class,
            key_len,
        })
    }

    /// Encode the 21-byte prefix
    pub fn encode(&self) -> [u8; BLOCK_PREFIX_SIZE as usize] {
        let mut out = [0u8; BLOCK_PREFIX_SIZE as usize];
        let mut buf = &mut out[..];
        buf.put_u64_le(self.next_offset);
        buf.put_u32_le(self.hash);
        buf.put_u8(self.size_class);
        buf.put_u64_le(self.key_len);
        out
    }
}

/// A fully decoded block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub next_offset: u64,
    pub hash: u32,
    pub size_class: u8,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Bytes needed to store a record before rounding up to a power of two
pub fn encoded_len(key_len: u64, value_len: u64) -> u64 {
    BLOCK_OVERHEAD + key_len + value_len
}

/// Smallest size class whose block holds the record.
///
/// Fails with OutOfSpace if the combined record length overflows.
pub fn size_class_for(key_len: u64, value_len: u64) -> Result<u8> {
    let len = key_len
        .checked_add(value_len)
        .and_then(|n| n.checked_add(BLOCK_OVERHEAD))
        .ok_or_else(|| {
            KvError::OutOfSpace("record length overflows the size classes".to_string())
        })?;
    freelist::class_for_size(len)
}

/// Encode a complete block image (header + key + value length + value).
///
/// The image is the record only, not padded out to the physical block size;
/// the slack bytes of the power-of-two block are never read.
pub fn encode_block(next_offset: u64, hash: u32, size_class: u8, key: &[u8], value: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(encoded_len(key.len() as u64, value.len() as u64) as usize);
    buf.put_u64_le(next_offset);
    buf.put_u32_le(hash);
    buf.put_u8(size_class);
    buf.put_u64_le(key.len() as u64);
    buf.put_slice(key);
    buf.put_u64_le(value.len() as u64);
    buf.put_slice(value);
    buf
}

/// Decode a complete block image, validating every length field
pub fn decode_block(bytes: &[u8]) -> Result<Block> {
    let header = BlockHeader::decode(bytes)?;
    let key_end = BLOCK_PREFIX_SIZE + header.key_len;
    if (bytes.len() as u64) < key_end + 8 {
        return Err(KvError::Corrupt(
            "block image truncated inside the key".to_string(),
        ));
    }
    let key = bytes[BLOCK_PREFIX_SIZE as usize..key_end as usize].to_vec();

    let mut rest = &bytes[key_end as usize..];
    let value_len = rest.get_u64_le();
    if (rest.len() as u64) < value_len {
        return Err(KvError::Corrupt(
            "block image truncated inside the value".to_string(),
        ));
    }
    if encoded_len(header.key_len, value_len) > freelist::class_size(header.size_class) {
        return Err(KvError::Corrupt(format!(
            "record does not fit its class-{} block",
            header.size_class
        )));
    }
    let value = rest[..value_len as usize].to_vec();

    Ok(Block {
        next_offset: header.next_offset,
        hash: header.hash,
        size_class: header.size_class,
        key,
        value,
    })
}

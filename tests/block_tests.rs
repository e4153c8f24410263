//! Tests for the block codec
//!
//! These tests verify:
//! - Prefix and full-image encode/decode
//! - Size class selection
//! - Corruption detection on truncated or inconsistent images

use hashkv::block::{
    decode_block, encode_block, encoded_len, size_class_for, BlockHeader, BLOCK_OVERHEAD,
    BLOCK_PREFIX_SIZE,
};
use hashkv::KvError;

// =============================================================================
// Prefix Codec Tests
// =============================================================================

#[test]
fn test_prefix_roundtrip() {
    let header = BlockHeader {
        next_offset: 0xdead_beef,
        hash: 0x1234_5678,
        size_class: 7,
        key_len: 11,
    };

    let encoded = header.encode();
    assert_eq!(encoded.len() as u64, BLOCK_PREFIX_SIZE);

    let decoded = BlockHeader::decode(&encoded).unwrap();
    assert_eq!(decoded, header);
}

#[test]
fn test_prefix_rejects_truncation() {
    let header = BlockHeader {
        next_offset: 1,
        hash: 2,
        size_class: 6,
        key_len: 3,
    };
    let encoded = header.encode();

    let err = BlockHeader::decode(&encoded[..10]).unwrap_err();
    assert!(matches!(err, KvError::Corrupt(_)));
}

#[test]
fn test_prefix_rejects_oversized_key() {
    // A class-5 block (32 bytes) cannot hold a 100-byte key.
    let header = BlockHeader {
        next_offset: 0,
        hash: 0,
        size_class: 5,
        key_len: 100,
    };
    let err = BlockHeader::decode(&header.encode()).unwrap_err();
    assert!(matches!(err, KvError::Corrupt(_)));
}

#[test]
fn test_prefix_rejects_bad_class() {
    let mut encoded = BlockHeader {
        next_offset: 0,
        hash: 0,
        size_class: 5,
        key_len: 0,
    }
    .encode();
    encoded[12] = 200; // size class byte

    let err = BlockHeader::decode(&encoded).unwrap_err();
    assert!(matches!(err, KvError::Corrupt(_)));
}

// =============================================================================
// Size Class Tests
// =============================================================================

#[test]
fn test_size_class_smallest_fit() {
    // 29 bytes of overhead + 1 + 1 = 31 -> class 5 (32 bytes)
    assert_eq!(size_class_for(1, 1).unwrap(), 5);

    // Exactly a power of two stays in its class.
    let class = size_class_for(3, 64 - BLOCK_OVERHEAD - 3).unwrap();
    assert_eq!(class, 6);

    // One byte over rounds up.
    let class = size_class_for(3, 64 - BLOCK_OVERHEAD - 2).unwrap();
    assert_eq!(class, 7);
}

#[test]
fn test_size_class_overflow() {
    let err = size_class_for(u64::MAX, 1).unwrap_err();
    assert!(matches!(err, KvError::OutOfSpace(_)));
}

// =============================================================================
// Full Image Tests
// =============================================================================

#[test]
fn test_image_roundtrip() {
    let class = size_class_for(5, 7).unwrap();
    let image = encode_block(42, 0xabcd, class, b"hello", b"world!!");
    assert_eq!(image.len() as u64, encoded_len(5, 7));

    let block = decode_block(&image).unwrap();
    assert_eq!(block.next_offset, 42);
    assert_eq!(block.hash, 0xabcd);
    assert_eq!(block.size_class, class);
    assert_eq!(block.key, b"hello");
    assert_eq!(block.value, b"world!!");
}

#[test]
fn test_image_empty_key_and_value() {
    let class = size_class_for(0, 0).unwrap();
    let image = encode_block(0, 0, class, b"", b"");
    let block = decode_block(&image).unwrap();
    assert!(block.key.is_empty());
    assert!(block.value.is_empty());
}

#[test]
fn test_image_rejects_truncated_value() {
    let class = size_class_for(3, 10).unwrap();
    let image = encode_block(0, 1, class, b"abc", b"0123456789");

    let err = decode_block(&image[..image.len() - 4]).unwrap_err();
    assert!(matches!(err, KvError::Corrupt(_)));
}

#[test]
fn test_image_rejects_class_mismatch() {
    // Claim a class-5 block (32 bytes) around a record that needs more.
    let image = encode_block(0, 1, 5, b"key", b"a value that is too long for class 5");
    let err = decode_block(&image).unwrap_err();
    assert!(matches!(err, KvError::Corrupt(_)));
}

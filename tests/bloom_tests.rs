//! Tests for the bloom filter
//!
//! These tests verify:
//! - Prime-based sizing rounded to whole bytes
//! - Probe positions staying inside the filter
//! - No false negatives, ever

use hashkv::bloom::{filter_size, insert, probe_positions, test, BITS_PER_ENTRY, HASH_COUNT};

// =============================================================================
// Sizing Tests
// =============================================================================

#[test]
fn test_filter_size_at_least_five_bits_per_slot() {
    for max_count in [1u64, 4, 16, 128, 1 << 10, 1 << 17] {
        let bytes = filter_size(max_count);
        assert!(
            bytes * 8 >= max_count * BITS_PER_ENTRY,
            "filter of {} bytes too small for {} slots",
            bytes,
            max_count
        );
    }
}

#[test]
fn test_filter_size_monotonic() {
    let mut prev = 0;
    for max_count in [1u64, 2, 8, 64, 512, 4096] {
        let bytes = filter_size(max_count);
        assert!(bytes >= prev);
        prev = bytes;
    }
}

// =============================================================================
// Probe Tests
// =============================================================================

#[test]
fn test_probe_positions_in_range() {
    let filter_bytes = filter_size(64);
    for key in [b"a".as_slice(), b"hello", b"", b"\x00\xff\x00"] {
        let positions = probe_positions(key, filter_bytes);
        assert_eq!(positions.len(), HASH_COUNT);
        for pos in positions {
            assert!(pos.byte < filter_bytes);
            assert_eq!(pos.mask.count_ones(), 1);
        }
    }
}

#[test]
fn test_probe_positions_deterministic() {
    let filter_bytes = filter_size(64);
    assert_eq!(
        probe_positions(b"stable", filter_bytes),
        probe_positions(b"stable", filter_bytes)
    );
}

// =============================================================================
// Membership Tests
// =============================================================================

#[test]
fn test_no_false_negatives() {
    let mut filter = vec![0u8; filter_size(256) as usize];
    let keys: Vec<String> = (0..200).map(|i| format!("key{:04}", i)).collect();

    for key in &keys {
        insert(&mut filter, key.as_bytes());
    }
    for key in &keys {
        assert!(test(&filter, key.as_bytes()), "false negative for {}", key);
    }
}

#[test]
fn test_empty_filter_rejects_everything() {
    let filter = vec![0u8; filter_size(64) as usize];
    for key in [b"a".as_slice(), b"b", b"anything"] {
        assert!(!test(&filter, key));
    }
}

#[test]
fn test_mostly_rejects_unknown_keys() {
    // 5 bits/entry with 3 probes gives a small but nonzero false-positive
    // rate; over 1000 unknown keys the vast majority must be rejected.
    let mut filter = vec![0u8; filter_size(256) as usize];
    for i in 0..200 {
        insert(&mut filter, format!("member{}", i).as_bytes());
    }

    let hits = (0..1000)
        .filter(|i| test(&filter, format!("stranger{}", i).as_bytes()))
        .count();
    assert!(hits < 500, "false positive rate implausibly high: {}/1000", hits);
}

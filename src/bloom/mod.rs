//! Bloom Filter
//!
//! Per-table probabilistic membership test over stored keys.
//!
//! - If any probed bit is 0 → the key is DEFINITELY NOT in the table
//! - If all probed bits are 1 → the key is PROBABLY in the table
//!
//! Each table carries 5 bits per bucket slot, sized up to the next prime
//! bit count (a prime modulus avoids clustering when the hash stride is not
//! coprime with the table size) and rounded to a whole byte. Lookups test
//! the filter before walking a bucket's block chain, so most negative
//! lookups never touch the chain at all.
//!
//! Deletions never clear bits: a bloom filter cannot support removal, so
//! stale positives linger after deletes. That is bounded and harmless
//! because the block-chain walk is the ground truth.
//!
//! Hash trick: the 3 probe positions do not need 3 independent hash
//! functions. A single 128-bit xxh3 is split into two 64-bit halves and
//! combined by double hashing: `position_i = h1 + i * h2 (mod bits)`.

use xxhash_rust::xxh3::xxh3_128;

/// Bits reserved per bucket slot
pub const BITS_PER_ENTRY: u64 = 5;

/// Number of probe positions per key
pub const HASH_COUNT: usize = 3;

/// A single probe position, pre-split into byte index and bit mask so the
/// engine (reading filter bytes from the file) and the transaction layer
/// (patching staged bytes) share one addressing scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitPosition {
    pub byte: u64,
    pub mask: u8,
}

/// Filter size in bytes for a table with `max_count` bucket slots.
///
/// `next_prime(max_count * 5)` bits, rounded up to a byte boundary.
pub fn filter_size(max_count: u64) -> u64 {
    let bits = next_prime(max_count * BITS_PER_ENTRY);
    (bits + 7) / 8
}

/// The 3 probe positions for a key in a filter of `filter_bytes` bytes.
///
/// Positions are taken modulo the byte-rounded bit count; the prime enters
/// through sizing.
pub fn probe_positions(key: &[u8], filter_bytes: u64) -> [BitPosition; HASH_COUNT] {
    let nbits = filter_bytes * 8;
    let wide = xxh3_128(key);
    let h1 = wide as u64;
    let h2 = (wide >> 64) as u64;

    let mut positions = [BitPosition { byte: 0, mask: 0 }; HASH_COUNT];
    for (i, pos) in positions.iter_mut().enumerate() {
        let bit = h1.wrapping_add((i as u64).wrapping_mul(h2)) % nbits;
        *pos = BitPosition {
            byte: bit / 8,
            mask: 1 << (bit % 8),
        };
    }
    positions
}

/// Set all probe bits for a key in an in-memory filter
pub fn insert(filter: &mut [u8], key: &[u8]) {
    for pos in probe_positions(key, filter.len() as u64) {
        filter[pos.byte as usize] |= pos.mask;
    }
}

/// Test a key against an in-memory filter: false means certainly absent
pub fn test(filter: &[u8], key: &[u8]) -> bool {
    probe_positions(key, filter.len() as u64)
        .iter()
        .all(|pos| filter[pos.byte as usize] & pos.mask != 0)
}

/// Smallest prime >= n
fn next_prime(n: u64) -> u64 {
    let mut candidate = n.max(2);
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_prime_basics() {
        assert_eq!(next_prime(0), 2);
        assert_eq!(next_prime(2), 2);
        assert_eq!(next_prime(8), 11);
        assert_eq!(next_prime(640), 641);
    }

    #[test]
    fn filter_size_rounds_to_bytes() {
        // 128 slots -> 640 bits -> prime 641 -> 81 bytes
        assert_eq!(filter_size(128), 81);
    }
}

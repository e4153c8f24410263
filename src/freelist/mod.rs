//! Free-List Allocator
//!
//! 64 size-classed singly-linked lists of reclaimed block offsets. Blocks
//! are segregated by power-of-two size (indexed by log2): a freed block of
//! class K is only ever reused for another allocation of class K. No
//! splitting or coalescing, so push and pop are O(1).
//!
//! The committed list heads live in the file header. While free, a block's
//! own next-offset field is repurposed as the list link, so the lists cost
//! no storage beyond the 64 header slots. 0 is the empty sentinel (offset 0
//! is the header and can never be a block).
//!
//! All mutation flows through a transaction: [`StagedFreeLists`] is the
//! per-transaction view, seeded from the committed heads at begin and fused
//! back into them at commit.

use crate::error::{KvError, Result};

/// Number of size classes (block sizes are 2^class bytes, class < 64)
pub const SIZE_CLASSES: usize = 64;

// =============================================================================
// Committed Free Lists
// =============================================================================

/// The committed per-class list heads, as persisted in the file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeLists {
    heads: [u64; SIZE_CLASSES],
}

impl FreeLists {
    /// All lists empty
    pub fn new() -> Self {
        Self {
            heads: [0; SIZE_CLASSES],
        }
    }

    /// Build from the raw header slots
    pub fn from_heads(heads: [u64; SIZE_CLASSES]) -> Self {
        Self { heads }
    }

    /// Head offset of a class's list (0 if empty)
    pub fn head(&self, class: u8) -> u64 {
        self.heads[class as usize]
    }

    /// Replace a class's head offset
    pub fn set_head(&mut self, class: u8, offset: u64) {
        self.heads[class as usize] = offset;
    }

    /// The raw slot array, in header order
    pub fn heads(&self) -> &[u64; SIZE_CLASSES] {
        &self.heads
    }
}

impl Default for FreeLists {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Staged Free Lists (transaction view)
// =============================================================================

/// Per-transaction overlay over the committed free lists.
///
/// `heads` starts as a copy of the committed heads and shrinks as the
/// transaction pops committed free blocks. `freed` accumulates blocks freed
/// *within* the transaction; they are handed back LIFO to later allocations
/// of the same class, and whatever remains is linked onto the committed
/// lists at commit.
#[derive(Debug)]
pub struct StagedFreeLists {
    heads: [u64; SIZE_CLASSES],
    freed: Vec<Vec<u64>>,
}

impl StagedFreeLists {
    /// Seed the staged view from the committed heads
    pub fn from_committed(committed: &FreeLists) -> Self {
        Self {
            heads: *committed.heads(),
            freed: vec![Vec::new(); SIZE_CLASSES],
        }
    }

    /// Pop the most recently freed block of this class, if any (LIFO reuse
    /// favors blocks whose pages are still warm)
    pub fn take_freed(&mut self, class: u8) -> Option<u64> {
        self.freed[class as usize].pop()
    }

    /// Head of the staged committed list for this class (0 if empty)
    pub fn committed_head(&self, class: u8) -> u64 {
        self.heads[class as usize]
    }

    /// Consume the staged committed head, replacing it with the link the
    /// caller read out of the popped block
    pub fn pop_committed(&mut self, class: u8, next: u64) -> u64 {
        let head = self.heads[class as usize];
        self.heads[class as usize] = next;
        head
    }

    /// Record a block freed within the transaction
    pub fn free(&mut self, class: u8, offset: u64) {
        self.freed[class as usize].push(offset);
    }

    /// Blocks freed in this transaction for a class, oldest first
    pub fn freed(&self, class: u8) -> &[u64] {
        &self.freed[class as usize]
    }

    /// Staged head for a class, ignoring in-transaction frees
    pub fn staged_head(&self, class: u8) -> u64 {
        self.heads[class as usize]
    }
}

// =============================================================================
// Size Class Helpers
// =============================================================================

/// Smallest power-of-two exponent such that `2^class >= size`.
///
/// Fails with OutOfSpace when the size cannot be represented in a 64-bit
/// class (practically unreachable).
pub fn class_for_size(size: u64) -> Result<u8> {
    if size == 0 {
        return Ok(0);
    }
    let class = 64 - (size - 1).leading_zeros();
    if class >= SIZE_CLASSES as u32 {
        return Err(KvError::OutOfSpace(format!(
            "block of {} bytes exceeds the largest size class",
            size
        )));
    }
    Ok(class as u8)
}

/// Physical size in bytes of a block of the given class
pub fn class_size(class: u8) -> u64 {
    1u64 << class
}

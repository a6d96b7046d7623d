// Copyright © 2026 The ladle developers
// SPDX-License-Identifier: BSD-3-Clause

use crate::block::{BlockPtr, MIN_BLOCK};
use core::ptr::NonNull;

/// Number of size classes in the free list index.
pub(crate) const BIN_COUNT: usize = 12;

/// Maps a block size to its bin index.
///
/// Bin 0 holds exactly minimum-size blocks; each following bin covers a
/// doubling size range; the last bin is the catch-all for everything larger.
/// Monotonic: a larger size never maps to a smaller index.
#[inline]
#[must_use]
pub(crate) fn index_of(size: usize) -> usize {
    debug_assert!(size >= MIN_BLOCK, "no bin for sub-minimum sizes");
    let mut index = 0;
    let mut limit = MIN_BLOCK;
    while index < BIN_COUNT - 1 && size > limit {
        index += 1;
        limit <<= 1;
    }
    index
}

/// Back link of a free block: either the previous free block in its bin, or
/// a reference to the bin itself when the block is at the head of the list.
///
/// Encoded in a single payload word. Block addresses are 8-aligned, so bit 0
/// of a real address is never set; a set bit 0 therefore marks a bin
/// reference, with the bin index stored in the bits above it. The two
/// encodings cannot collide.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum PrevLink {
    Head(usize),
    Block(BlockPtr),
}

impl PrevLink {
    #[inline]
    #[must_use]
    pub(crate) fn decode(word: usize) -> Self {
        if word & 1 != 0 {
            Self::Head(word >> 1)
        } else {
            debug_assert!(word != 0, "back link slot never holds a null address");
            // SAFETY: even words in this slot are written by `encode` from a
            // `BlockPtr`, which is never null.
            Self::Block(BlockPtr::new(unsafe { NonNull::new_unchecked(word as *mut u8) }))
        }
    }

    #[inline]
    #[must_use]
    pub(crate) fn encode(self) -> usize {
        match self {
            Self::Head(bin) => (bin << 1) | 1,
            Self::Block(block) => block.addr(),
        }
    }
}

/// The segregated free list index: one LIFO doubly linked list per size
/// class, with the links stored inside the free blocks' own payload space.
#[derive(Debug)]
pub(crate) struct Bins {
    heads: [Option<BlockPtr>; BIN_COUNT],
}

impl Bins {
    #[inline]
    #[must_use]
    pub(crate) const fn new() -> Self {
        Self {
            heads: [None; BIN_COUNT],
        }
    }

    #[inline]
    #[must_use]
    pub(crate) fn head(&self, index: usize) -> Option<BlockPtr> {
        self.heads[index]
    }

    /// Pushes `block` at the head of the bin selected by its size.
    ///
    /// # Safety
    ///
    /// `block` must be a free block whose header already carries its final
    /// size, and must not currently be a member of any bin.
    pub(crate) unsafe fn insert(&mut self, block: BlockPtr) {
        let bin = index_of(block.header().size());
        let old_head = self.heads[bin];
        block.set_next_free(old_head);
        block.set_prev_free_word(PrevLink::Head(bin).encode());
        if let Some(old_head) = old_head {
            old_head.set_prev_free_word(PrevLink::Block(block).encode());
        }
        self.heads[bin] = Some(block);
    }

    /// Unlinks `block` from its bin in O(1), using its own two link slots.
    ///
    /// # Safety
    ///
    /// `block` must currently be a member of a bin.
    pub(crate) unsafe fn remove(&mut self, block: BlockPtr) {
        let next = block.next_free();
        let prev_word = block.prev_free_word();
        match PrevLink::decode(prev_word) {
            PrevLink::Head(bin) => {
                debug_assert_eq!(self.heads[bin], Some(block), "bin head out of sync");
                self.heads[bin] = next;
            }
            PrevLink::Block(prev) => prev.set_next_free(next),
        }
        // The follower inherits this block's back link: a bin reference when
        // the head was removed, the predecessor's address otherwise.
        if let Some(next) = next {
            next.set_prev_free_word(prev_word);
        }
    }

    /// Bucket-ascending first fit: scans the bin `min_size` maps to, then
    /// each larger bin in order, returning the first block that is large
    /// enough.
    ///
    /// # Safety
    ///
    /// The bin lists must be structurally intact.
    #[must_use]
    pub(crate) unsafe fn find(&self, min_size: usize) -> Option<BlockPtr> {
        for bin in index_of(min_size)..BIN_COUNT {
            let mut cursor = self.heads[bin];
            while let Some(block) = cursor {
                if block.header().size() >= min_size {
                    return Some(block);
                }
                cursor = block.next_free();
            }
        }
        None
    }
}

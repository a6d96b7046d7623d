// Copyright © 2026 The ladle developers
// SPDX-License-Identifier: BSD-3-Clause

use crate::block::BlockPtr;
use crate::tag::Tag;

/// Iterator over the block chain, from the first real block up to (and not
/// including) the epilogue sentinel.
///
/// The chain tiles the arena with no gaps, so each step is a single forward
/// jump by the current block's size.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Blocks {
    cursor: Option<BlockPtr>,
}

impl Blocks {
    /// `first` is the first real block of the chain, or `None` for a heap
    /// whose chain has not been set up yet.
    #[inline]
    #[must_use]
    pub(crate) const fn new(first: Option<BlockPtr>) -> Self {
        Self { cursor: first }
    }
}

impl Iterator for Blocks {
    type Item = (BlockPtr, Tag);

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.cursor?;
        // SAFETY: the cursor only ever holds chain addresses, which stay
        // readable for the life of the heap.
        let tag = unsafe { block.header() };
        if tag.size() == 0 {
            // Epilogue.
            self.cursor = None;
            return None;
        }
        self.cursor = Some(unsafe { block.next() });
        Some((block, tag))
    }
}

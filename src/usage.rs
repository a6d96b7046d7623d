// Copyright © 2026 The ladle developers
// SPDX-License-Identifier: BSD-3-Clause

use crate::arena::Arena;
use crate::block::WORD;
use crate::heap::Heap;
use crate::iter::Blocks;

/// Memory usage information.
///
/// This structure is returned by [`Ladle::usage`](crate::Ladle::usage). See
/// that method's documentation for information and examples.
#[derive(Default, Clone, PartialEq, Eq, Debug)]
pub struct Usage {
    /// Bytes currently under management: the whole arena span, sentinel and
    /// header overhead included. Grows over the allocator's lifetime and
    /// never shrinks.
    pub total: usize,
    /// Payload bytes held by live allocations.
    ///
    /// This is the sum of each allocated block's usable space; it does not
    /// include the header word in front of each of them, so `total` is
    /// always more than `used + free`.
    pub used: usize,
    /// Bytes sitting in free blocks, ready for reuse.
    ///
    /// An allocation of up to roughly this size may still fail when the
    /// free space is fragmented across blocks.
    pub free: usize,
    /// Number of live allocations. Allocating increments this, freeing
    /// decrements it.
    pub objects: usize,
}

impl Usage {
    pub(crate) fn get<A: Arena>(heap: &Heap<A>) -> Self {
        let mut usage = Self {
            total: heap.span(),
            used: 0,
            free: 0,
            objects: 0,
        };

        for (_, tag) in Blocks::new(heap.base()) {
            if tag.is_allocated() {
                usage.used += tag.size() - WORD;
                usage.objects += 1;
            } else {
                usage.free += tag.size();
            }
        }

        usage
    }
}

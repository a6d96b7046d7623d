// Copyright © 2026 The ladle developers
// SPDX-License-Identifier: BSD-3-Clause

use crate::arena::{Arena, OutOfMemory};
use crate::bins::Bins;
use crate::block::{align_up, BlockPtr, ALIGNMENT, MIN_BLOCK, WORD};
use crate::tag::Tag;
use core::fmt;
use core::ptr::NonNull;
use log::debug;

/// Arena extension granule. Growth requests are rounded up to this, so a
/// burst of small allocations costs one `grow` call per chunk instead of one
/// per allocation.
pub(crate) const CHUNK: usize = 4096;

/// Padding in front of the prologue so that payload addresses, one word past
/// their block's start, land on [`ALIGNMENT`] boundaries. Zero when the word
/// width equals the alignment.
pub(crate) const INIT_PAD: usize = (ALIGNMENT - (3 * WORD) % ALIGNMENT) % ALIGNMENT;

/// The initial block chain could not be set up.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct InitError(OutOfMemory);

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "heap initialization failed: {}", self.0)
    }
}

impl From<OutOfMemory> for InitError {
    #[inline]
    fn from(err: OutOfMemory) -> Self {
        Self(err)
    }
}

/// The free-space management engine.
///
/// Owns the arena, the boundary-tagged block chain tiling it, and the
/// segregated free list index. All operations run to completion on the
/// calling thread; the engine is neither reentrant nor thread-safe, and
/// callers that need shared access wrap it in a lock the way
/// [`Ladle`](crate::Ladle) does.
pub(crate) struct Heap<A: Arena> {
    arena: A,
    bins: Bins,
    /// First real block of the chain, right past the prologue sentinel.
    /// `None` until the chain is set up.
    base: Option<BlockPtr>,
}

// SAFETY: Every raw block pointer held by the heap or threaded through its
// bins points into the arena, which moves together with the heap.
unsafe impl<A: Arena + Send> Send for Heap<A> {}

impl<A: Arena + fmt::Debug> fmt::Debug for Heap<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("arena", &self.arena)
            .finish_non_exhaustive()
    }
}

impl<A: Arena> Heap<A> {
    #[inline]
    #[must_use]
    pub(crate) const fn new(arena: A) -> Self {
        Self {
            arena,
            bins: Bins::new(),
            base: None,
        }
    }

    #[inline]
    pub(crate) fn arena(&self) -> &A {
        &self.arena
    }

    #[inline]
    pub(crate) fn base(&self) -> Option<BlockPtr> {
        self.base
    }

    #[inline]
    pub(crate) fn bins(&self) -> &Bins {
        &self.bins
    }

    /// Lays down the sentinel blocks and grows the arena by one chunk.
    ///
    /// Runs on the first allocation if not called explicitly. Calling it
    /// again on a live heap is a no-op. If the sentinels fit but the chunk
    /// extension is refused, the chain is still valid (just empty) and later
    /// allocations will attempt their own extension.
    pub(crate) fn init(&mut self) -> Result<(), InitError> {
        if self.base.is_some() {
            return Ok(());
        }

        let start = self.arena.grow(3 * WORD + INIT_PAD)?;
        debug!("heap chain set up at {:p}", start);

        // SAFETY: the arena just handed us the sentinel words at `start`.
        unsafe {
            // Prologue: an allocated sentinel with both header and footer,
            // so backward traversal can never run past the chain start.
            let prologue = BlockPtr::new(start.byte_add(INIT_PAD));
            let tag = Tag::new(2 * WORD, true, true);
            prologue.set_header(tag);
            prologue.set_footer(tag);

            // Epilogue: size 0, allocated, marks the high bound. It is
            // rewritten one block further out on every extension.
            let epilogue = BlockPtr::new(start.byte_add(INIT_PAD + 2 * WORD));
            epilogue.set_header(Tag::new(0, true, true));

            self.base = Some(epilogue);
        }

        self.extend(CHUNK)?;
        Ok(())
    }

    /// Allocates `size` bytes and returns the payload address, 8-aligned.
    ///
    /// A zero-size request yields `None` without touching the heap; `None`
    /// on a non-zero request means the arena refused to grow.
    pub(crate) fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        if self.base.is_none() {
            self.init().ok()?;
        }

        // Header overhead plus payload, rounded up to the block granularity,
        // never below the minimum block.
        let adjusted = (size.checked_add(WORD + ALIGNMENT - 1)? & !(ALIGNMENT - 1)).max(MIN_BLOCK);

        // SAFETY: the chain and the bins are intact between public calls.
        unsafe {
            let block = match self.bins.find(adjusted) {
                Some(block) => block,
                None => self.extend(adjusted.max(CHUNK)).ok()?,
            };
            let payload = self.place(block, adjusted);
            debug!("alloc {} bytes -> {:p}", size, payload);
            Some(payload)
        }
    }

    /// Returns `payload`'s block to the free list, merging it with any free
    /// chain neighbor.
    ///
    /// # Safety
    ///
    /// `payload` must have been returned by [`allocate`](Self::allocate) (or
    /// [`resize`](Self::resize)) on this heap and not freed since.
    pub(crate) unsafe fn deallocate(&mut self, payload: NonNull<u8>) {
        let block = BlockPtr::from_payload(payload);
        let tag = block.header();
        debug_assert!(tag.is_allocated(), "freeing a block that is not allocated");
        debug!("free {:p} ({} bytes)", payload, tag.size());

        let freed = tag.with_allocated(false);
        block.set_header(freed);
        block.set_footer(freed);
        self.coalesce(block);
    }

    /// Moves `payload`'s data into a block of `new_size` bytes.
    ///
    /// `None` for `payload` allocates afresh; a `new_size` of zero frees and
    /// returns `None`. Otherwise this always allocates, copies the smaller
    /// of the two payload sizes, and frees the old block; there is no
    /// in-place path. The old block is left untouched when the new
    /// allocation fails.
    ///
    /// # Safety
    ///
    /// A `Some` payload must obey the [`deallocate`](Self::deallocate)
    /// contract.
    pub(crate) unsafe fn resize(
        &mut self,
        payload: Option<NonNull<u8>>,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        let old = match payload {
            None => return self.allocate(new_size),
            Some(old) => old,
        };
        if new_size == 0 {
            self.deallocate(old);
            return None;
        }

        let new = self.allocate(new_size)?;
        let old_payload = BlockPtr::from_payload(old).header().size() - WORD;
        core::ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), old_payload.min(new_size));
        self.deallocate(old);
        Some(new)
    }

    /// Allocates `count * size` bytes and zero-fills them.
    ///
    /// The multiplication is deliberately not checked for overflow: a
    /// product that wraps allocates (and zeroes) the wrapped amount, as the
    /// classic contract this mirrors leaves it.
    pub(crate) fn zeroed_allocate(&mut self, count: usize, size: usize) -> Option<NonNull<u8>> {
        let bytes = count.wrapping_mul(size);
        let payload = self.allocate(bytes)?;
        // SAFETY: the block behind `payload` holds at least `bytes` bytes.
        unsafe { core::ptr::write_bytes(payload.as_ptr(), 0, bytes) };
        Some(payload)
    }

    /// Total bytes currently under management.
    pub(crate) fn span(&self) -> usize {
        let lo = self.arena.low_bound().as_ptr() as usize;
        let hi = self.arena.high_bound().as_ptr() as usize;
        hi - lo
    }

    /// Grows the arena and shapes the growth into one free block, reusing
    /// the old epilogue word as the new block's header. The result runs
    /// through the usual coalescing path, so a free block that was sitting
    /// at the old end of the heap is merged rather than left adjacent.
    fn extend(&mut self, bytes: usize) -> Result<BlockPtr, OutOfMemory> {
        let bytes = align_up(bytes);
        let old_end = self.arena.grow(bytes)?;
        debug!("extended arena by {} bytes", bytes);

        // SAFETY: the old epilogue header sits one word below the old end;
        // the grown region supplies the rest of the new block plus the new
        // epilogue word.
        unsafe {
            let block = BlockPtr::new(old_end.byte_sub(WORD));
            // The epilogue's previous-allocated bit tracked the last real
            // block; the new block inherits it.
            let tag = Tag::new(bytes, false, block.header().is_prev_allocated());
            block.set_header(tag);
            block.set_footer(tag);
            block.next().set_header(Tag::new(0, true, false));
            Ok(self.coalesce(block))
        }
    }

    /// Eagerly merges `block` with whichever of its chain neighbors are
    /// free, re-files the result in the bin for its final size, and pushes
    /// the resulting allocation state forward to the successor's header.
    ///
    /// `block` must already carry a free header and footer.
    unsafe fn coalesce(&mut self, block: BlockPtr) -> BlockPtr {
        let tag = block.header();
        let next = block.next();
        let mut merged = block;
        let mut size = tag.size();

        match (tag.is_prev_allocated(), next.header().is_allocated()) {
            // Both neighbors allocated: nothing to merge.
            (true, true) => {}

            // Free successor: absorb it, keeping this block's start.
            (true, false) => {
                self.bins.remove(next);
                size += next.header().size();
                let tag = Tag::new(size, false, true);
                merged.set_header(tag);
                merged.set_footer(tag);
            }

            // Free predecessor: absorb into it; the block moves back.
            (false, true) => {
                let prev = block.prev();
                self.bins.remove(prev);
                size += prev.header().size();
                let tag = Tag::new(size, false, prev.header().is_prev_allocated());
                merged = prev;
                merged.set_header(tag);
                merged.set_footer(tag);
            }

            // Free on both sides: fold all three into one.
            (false, false) => {
                let prev = block.prev();
                self.bins.remove(prev);
                self.bins.remove(next);
                size += prev.header().size() + next.header().size();
                let tag = Tag::new(size, false, prev.header().is_prev_allocated());
                merged = prev;
                merged.set_header(tag);
                merged.set_footer(tag);
            }
        }

        // Whatever follows the merged block now has a free predecessor.
        let successor = merged.next();
        successor.set_header(successor.header().with_prev_allocated(false));

        self.bins.insert(merged);
        merged
    }

    /// Carves an `adjusted`-byte allocation out of the free `block`.
    ///
    /// Splits when the remainder can stand as a block of its own; otherwise
    /// the whole block is consumed so no unusably small fragment is left
    /// behind. Returns the payload address.
    unsafe fn place(&mut self, block: BlockPtr, adjusted: usize) -> NonNull<u8> {
        self.bins.remove(block);

        let tag = block.header();
        let size = tag.size();
        debug_assert!(size >= adjusted, "placing into a block that is too small");

        if size - adjusted >= MIN_BLOCK {
            // Low part becomes the allocation; no footer for allocated
            // blocks.
            block.set_header(Tag::new(adjusted, true, tag.is_prev_allocated()));

            // High part becomes a new, smaller free block. Its successor's
            // previous-allocated bit is already clear and stays that way.
            let rest = block.next();
            let rest_tag = Tag::new(size - adjusted, false, true);
            rest.set_header(rest_tag);
            rest.set_footer(rest_tag);
            self.bins.insert(rest);
        } else {
            block.set_header(tag.with_allocated(true));
            let successor = block.next();
            successor.set_header(successor.header().with_prev_allocated(true));
        }

        block.payload()
    }
}

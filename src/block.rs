// Copyright © 2026 The ladle developers
// SPDX-License-Identifier: BSD-3-Clause

use crate::tag::Tag;
use core::fmt;
use core::ptr::NonNull;

/// Width of the boundary-tag words and of the free-list link slots.
pub(crate) const WORD: usize = core::mem::size_of::<usize>();

/// Alignment guaranteed for every payload address, and the granularity of
/// block sizes.
pub const ALIGNMENT: usize = 8;

/// Smallest block the chain can carry: header, two link slots and a footer.
pub const MIN_BLOCK: usize = align_up(4 * WORD);

/// Rounds `size` up to the next multiple of [`ALIGNMENT`].
#[inline]
#[must_use]
pub(crate) const fn align_up(size: usize) -> usize {
    (size + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Pointer to a block's header word, i.e. the block's start address.
///
/// Every other address of interest is derived from this one and the size
/// stored behind it: the payload starts one word in, the footer (free blocks
/// only) sits one word before the end, the chain successor starts right past
/// the end, and the chain predecessor is reached through its own footer.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct BlockPtr(NonNull<u8>);

impl BlockPtr {
    #[inline]
    #[must_use]
    pub(crate) const fn new(ptr: NonNull<u8>) -> Self {
        Self(ptr)
    }

    /// Recovers the block from the payload pointer handed out to callers.
    ///
    /// # Safety
    ///
    /// `payload` must be a payload address previously produced by
    /// [`payload()`](Self::payload) for a live block.
    #[inline]
    #[must_use]
    pub(crate) unsafe fn from_payload(payload: NonNull<u8>) -> Self {
        Self(payload.byte_sub(WORD))
    }

    #[inline]
    #[must_use]
    pub(crate) const fn as_nonnull(self) -> NonNull<u8> {
        self.0
    }

    #[inline]
    #[must_use]
    pub(crate) fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// The address returned to callers: one word past the header.
    #[inline]
    #[must_use]
    pub(crate) unsafe fn payload(self) -> NonNull<u8> {
        self.0.byte_add(WORD)
    }

    #[inline]
    #[must_use]
    pub(crate) unsafe fn header(self) -> Tag {
        Tag::from_word(self.0.cast::<usize>().as_ptr().read())
    }

    #[inline]
    pub(crate) unsafe fn set_header(self, tag: Tag) {
        self.0.cast::<usize>().as_ptr().write(tag.to_word());
    }

    /// Reads the footer word. Meaningful only while the block is free.
    #[inline]
    #[must_use]
    pub(crate) unsafe fn footer(self) -> Tag {
        Tag::from_word(self.footer_ptr(self.header().size()).read())
    }

    /// Duplicates the header at the block's end. The footer exists only for
    /// free blocks; an allocated block reuses those bytes as payload.
    #[inline]
    pub(crate) unsafe fn set_footer(self, tag: Tag) {
        self.footer_ptr(tag.size()).write(tag.to_word());
    }

    #[inline]
    unsafe fn footer_ptr(self, size: usize) -> *mut usize {
        self.0.byte_add(size - WORD).cast::<usize>().as_ptr()
    }

    /// The chain successor: the block starting right past this one.
    #[inline]
    #[must_use]
    pub(crate) unsafe fn next(self) -> BlockPtr {
        Self(self.0.byte_add(self.header().size()))
    }

    /// The chain predecessor, reached through its footer.
    ///
    /// Only free predecessors carry a footer; when this block's
    /// previous-allocated bit is set there is nothing to read and stepping
    /// backward is not possible.
    #[inline]
    #[must_use]
    pub(crate) unsafe fn prev(self) -> BlockPtr {
        debug_assert!(
            !self.header().is_prev_allocated(),
            "allocated predecessors have no footer to step back through"
        );
        let prev_tag = Tag::from_word(self.0.byte_sub(WORD).cast::<usize>().as_ptr().read());
        Self(self.0.byte_sub(prev_tag.size()))
    }

    // Free-list link slots, stored in the first two payload words of free
    // blocks. The minimum block size exists precisely to make room for them.

    #[inline]
    #[must_use]
    pub(crate) unsafe fn next_free(self) -> Option<BlockPtr> {
        let word = self.payload().cast::<usize>().as_ptr().read();
        NonNull::new(word as *mut u8).map(Self)
    }

    #[inline]
    pub(crate) unsafe fn set_next_free(self, next: Option<BlockPtr>) {
        let word = next.map_or(0, BlockPtr::addr);
        self.payload().cast::<usize>().as_ptr().write(word);
    }

    #[inline]
    #[must_use]
    pub(crate) unsafe fn prev_free_word(self) -> usize {
        self.payload().byte_add(WORD).cast::<usize>().as_ptr().read()
    }

    #[inline]
    pub(crate) unsafe fn set_prev_free_word(self, word: usize) {
        self.payload().byte_add(WORD).cast::<usize>().as_ptr().write(word);
    }
}

impl fmt::Pointer for BlockPtr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for BlockPtr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockPtr({:p})", self)
    }
}

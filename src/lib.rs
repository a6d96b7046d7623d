// Copyright © 2026 The ladle developers
// SPDX-License-Identifier: BSD-3-Clause

//! Ladle: a segregated-fit memory allocator built on a growable linear
//! arena.
//!
//! Ladle is a drop-in replacement for the classic allocate/free/resize
//! family. It manages a single contiguous region that only ever grows at its
//! high end (an [`Arena`], analogous to a process heap break) and owns all
//! of the bookkeeping needed to hand out aligned, non-overlapping blocks
//! from it and to reclaim and reuse what is freed.
//!
//! This is a no-`std` and no-`alloc` crate: the memory it manages comes from
//! an arena you provide, either a plain byte buffer ([`SliceArena`]) or the
//! real heap break ([`SbrkArena`], with the `sbrk` feature on unix).
//!
//! # Design
//!
//! * **Boundary tags**: every block starts with a one-word header packing
//!   its size with its own and its predecessor's allocation state; free
//!   blocks duplicate the word in a footer so the chain can be walked
//!   backward. Allocated blocks have no footer, keeping the per-allocation
//!   overhead at one word.
//! * **Segregated free lists**: free blocks are indexed by size class, one
//!   LIFO doubly linked list per class with the links stored in the blocks'
//!   own payload space. Searches are first-fit within a class, ascending
//!   through the larger classes.
//! * **Eager coalescing**: every deallocation and every arena extension
//!   immediately merges adjacent free blocks, so no two free neighbors ever
//!   survive an operation.
//! * **Checkable**: [`check`](Ladle::check) independently validates the
//!   block chain and every free list and reports (rather than panics on)
//!   anything inconsistent.
//!
//! # Quick start & examples
//!
//! Construct an allocator over a byte buffer and use the typed interface:
//!
//! ```
//! use ladle::Ladle;
//!
//! let mut memory = [0u8; 64 * 1024];
//! let ladle = Ladle::from(&mut memory);
//!
//! let ptr = ladle.allocate(100).expect("allocation failed");
//! // 8-byte aligned, at least 100 usable bytes.
//! assert_eq!(ptr.as_ptr() as usize % 8, 0);
//!
//! unsafe { ladle.deallocate(ptr) };
//! assert!(ladle.check(0).passed());
//! ```
//!
//! Zero-size requests are not errors, they simply yield nothing:
//!
//! ```
//! use ladle::Ladle;
//!
//! let mut memory = [0u8; 64 * 1024];
//! let ladle = Ladle::from(&mut memory);
//! assert!(ladle.allocate(0).is_none());
//! ```
//!
//! ## Using as a global allocator
//!
//! Because `#[global_allocator]` requires a `static` item, the allocator has
//! to be initialized lazily; the [`LazyLadle`](lazy::LazyLadle) wrapper
//! (feature `lazy`) takes care of that:
//!
//! ```toml
//! ladle = { version = "0.1", features = ["lazy"] }
//! ```
//!
//! ```
//! # #[allow(static_mut_refs)]
//! # #[cfg(feature = "lazy")]
//! # {
//! use ladle::lazy::LazyLadle;
//! use ladle::Ladle;
//! use ladle::SliceArena;
//!
//! #[global_allocator]
//! static LADLE: LazyLadle<SliceArena<'static>> = LazyLadle::new(|| {
//!     static mut MEMORY: [u8; 1 << 20] = [0u8; 1 << 20];
//!     // SAFETY: This closure is called only once, therefore `MEMORY` is
//!     // entirely owned by this `Ladle`, and no other reference to it can
//!     // be created.
//!     Ladle::new(SliceArena::from(unsafe { &mut MEMORY }))
//! });
//! # }
//! ```
//!
//! On unix, the `sbrk` feature provides [`SbrkArena`] so the allocator can
//! manage the actual program break instead of a buffer.
//!
//! # Limits and non-goals
//!
//! * Payload alignment is always 8 bytes ([`ALIGNMENT`]), never more. The
//!   [`GlobalAlloc`] and `Allocator` adapters refuse layouts that ask for
//!   stricter alignment.
//! * Memory is never returned to the arena; the managed region only grows.
//! * The engine itself is single-threaded and non-reentrant. The [`Ladle`]
//!   wrapper serializes access with a spin lock, which makes it usable as a
//!   global allocator but does not make the design concurrent.
//!
//! # Cargo feature flags
//!
//! * `allocator-api`: enables the implementation of the
//!   [`core::alloc::Allocator`] trait (requires a nightly compiler).
//! * `lazy`: enables the [`LazyLadle`](lazy::LazyLadle) wrapper.
//! * `sbrk`: enables [`SbrkArena`] (unix only; pulls in `libc`).

#![no_std]
#![cfg_attr(feature = "allocator-api", feature(allocator_api))]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stderr)]
#![warn(clippy::print_stdout)]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![warn(unused_crate_dependencies)]
#![warn(unused_macro_rules)]
#![warn(unused_qualifications)]
#![doc(test(attr(deny(warnings))))]

mod arena;
mod bins;
mod block;
mod check;
mod heap;
mod iter;
mod tag;
mod usage;

#[cfg(test)]
mod tests;

#[cfg(feature = "lazy")]
pub mod lazy;

use crate::heap::Heap;
use core::alloc::GlobalAlloc;
use core::alloc::Layout;
use core::ptr::NonNull;
use spin::Mutex;

#[cfg(feature = "allocator-api")]
use core::alloc::AllocError;
#[cfg(feature = "allocator-api")]
use core::alloc::Allocator;

pub use crate::arena::Arena;
pub use crate::arena::OutOfMemory;
pub use crate::arena::SliceArena;
pub use crate::block::ALIGNMENT;
pub use crate::block::MIN_BLOCK;
pub use crate::check::CheckReport;
pub use crate::heap::InitError;
pub use crate::usage::Usage;

#[cfg(feature = "sbrk")]
pub use crate::arena::SbrkArena;

/// The ladle allocator.
///
/// `Ladle` hands out 8-byte-aligned, non-overlapping blocks carved from an
/// [`Arena`] and reclaims them for reuse, with the standard allocator
/// contract: zero-size requests yield nothing, exhaustion yields `None`
/// (null through [`GlobalAlloc`]), freeing nothing is a no-op.
///
/// The engine behind it is single-threaded; `Ladle` serializes access with a
/// spin lock so it can serve as a [`GlobalAlloc`]. Construct it from an
/// arena with [`new`](Self::new), or directly from a byte buffer via
/// [`from_slice`](Self::from_slice) / `From`.
///
/// Initialization happens lazily on first use, or explicitly through
/// [`init`](Self::init).
#[derive(Debug)]
pub struct Ladle<A: Arena> {
    inner: Mutex<Heap<A>>,
}

impl<A: Arena> Ladle<A> {
    /// Constructs an allocator over `arena`.
    ///
    /// No arena memory is touched until [`init`](Self::init) or the first
    /// allocation.
    #[inline]
    #[must_use]
    pub const fn new(arena: A) -> Self {
        Self {
            inner: Mutex::new(Heap::new(arena)),
        }
    }

    /// Sets up the block chain: sentinel blocks plus an initial free chunk.
    ///
    /// Runs implicitly on the first allocation; calling it up front merely
    /// moves the cost (and the first chance of failure) to a place of your
    /// choosing. Calling it on an already initialized allocator does
    /// nothing.
    ///
    /// # Errors
    ///
    /// [`InitError`] when the arena refuses to grow. If the sentinels fit
    /// but the initial chunk did not, the allocator is still usable and
    /// later allocations will request their own growth.
    pub fn init(&self) -> Result<(), InitError> {
        self.inner.lock().init()
    }

    /// Allocates `size` bytes and returns the payload address.
    ///
    /// The returned pointer is 8-byte aligned and the block behind it holds
    /// at least `size` usable bytes. Returns `None` for a zero-size request
    /// (by contract, not as a failure) and when the arena cannot grow any
    /// further.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.inner.lock().allocate(size)
    }

    /// Frees the block behind `ptr` and merges it with any free neighbor.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by an allocation method of this
    /// allocator and not freed since.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        self.inner.lock().deallocate(ptr)
    }

    /// Resizes the allocation behind `ptr` to `new_size` bytes.
    ///
    /// `resize(None, n)` allocates afresh; `resize(ptr, 0)` frees and
    /// returns `None`. Otherwise the data is always moved: a new block is
    /// allocated, the smaller of the two payload sizes is copied over, and
    /// the old block is freed. When the new allocation fails the old block
    /// is left untouched.
    ///
    /// # Safety
    ///
    /// A `Some` pointer must obey the [`deallocate`](Self::deallocate)
    /// contract.
    pub unsafe fn resize(&self, ptr: Option<NonNull<u8>>, new_size: usize) -> Option<NonNull<u8>> {
        self.inner.lock().resize(ptr, new_size)
    }

    /// Allocates `count * size` bytes, zero-filled.
    ///
    /// The multiplication is not checked for overflow; a product that wraps
    /// allocates the wrapped amount. Callers that cannot rule out oversized
    /// products must check them first.
    pub fn zeroed_allocate(&self, count: usize, size: usize) -> Option<NonNull<u8>> {
        self.inner.lock().zeroed_allocate(count, size)
    }

    /// Validates the heap structure and reports what it finds.
    ///
    /// Read-only and advisory: the allocator is not modified and nothing
    /// panics on a violation; every problem found is logged and counted in
    /// the returned [`CheckReport`]. `verbose` ≥ 1 additionally logs each
    /// block, ≥ 2 each free-list member.
    ///
    /// This is a diagnostic for tests and debugging, not something the
    /// allocation paths ever run on their own.
    pub fn check(&self, verbose: u8) -> CheckReport {
        self.inner.lock().check(verbose)
    }

    /// Returns memory usage information for this allocator.
    ///
    /// The numbers come from a full walk of the block chain, so this is an
    /// `O(blocks)` operation, not `O(1)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ladle::Ladle;
    ///
    /// let mut memory = [0u8; 64 * 1024];
    /// let ladle = Ladle::from(&mut memory);
    /// ladle.init().expect("arena too small");
    ///
    /// let before = ladle.usage();
    /// assert_eq!(before.objects, 0);
    /// assert_eq!(before.used, 0);
    ///
    /// let ptr = ladle.allocate(100).expect("allocation failed");
    /// let after = ladle.usage();
    /// assert_eq!(after.objects, 1);
    /// assert!(after.used >= 100);
    /// # unsafe { ladle.deallocate(ptr) };
    /// ```
    #[must_use]
    pub fn usage(&self) -> Usage {
        Usage::get(&self.inner.lock())
    }
}

impl<'a> Ladle<SliceArena<'a>> {
    /// Constructs an allocator over a caller-provided buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use ladle::Ladle;
    ///
    /// let mut memory = [0u8; 64 * 1024];
    /// # #[allow(unused_variables)]
    /// let ladle = Ladle::from_slice(&mut memory);
    /// ```
    #[inline]
    #[must_use]
    pub fn from_slice(slice: &'a mut [u8]) -> Self {
        Self::new(SliceArena::from_slice(slice))
    }
}

impl<'a> From<&'a mut [u8]> for Ladle<SliceArena<'a>> {
    #[inline]
    fn from(slice: &'a mut [u8]) -> Self {
        Self::from_slice(slice)
    }
}

impl<'a, const N: usize> From<&'a mut [u8; N]> for Ladle<SliceArena<'a>> {
    #[inline]
    fn from(array: &'a mut [u8; N]) -> Self {
        Self::from(array.as_mut_slice())
    }
}

unsafe impl<A: Arena> GlobalAlloc for Ladle<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return core::ptr::null_mut();
        }
        self.inner
            .lock()
            .allocate(layout.size())
            .map(NonNull::as_ptr)
            .unwrap_or_else(core::ptr::null_mut)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return core::ptr::null_mut();
        }
        self.inner
            .lock()
            .zeroed_allocate(layout.size(), 1)
            .map(NonNull::as_ptr)
            .unwrap_or_else(core::ptr::null_mut)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        // Freeing null is defined as a no-op.
        if let Some(ptr) = NonNull::new(ptr) {
            self.inner.lock().deallocate(ptr);
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return core::ptr::null_mut();
        }
        self.inner
            .lock()
            .resize(NonNull::new(ptr), new_size)
            .map(NonNull::as_ptr)
            .unwrap_or_else(core::ptr::null_mut)
    }
}

#[cfg(feature = "allocator-api")]
unsafe impl<A: Arena> Allocator for Ladle<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.align() > ALIGNMENT {
            return Err(AllocError);
        }
        if layout.size() == 0 {
            // SAFETY: `Layout` guarantees that `align` is non-zero.
            let dangling = unsafe { NonNull::new_unchecked(layout.align() as *mut u8) };
            return Ok(NonNull::slice_from_raw_parts(dangling, 0));
        }
        let ptr = self.inner.lock().allocate(layout.size()).ok_or(AllocError)?;
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            // Zero-size allocations hand out a dangling pointer with no
            // block behind it.
            return;
        }
        self.inner.lock().deallocate(ptr)
    }
}

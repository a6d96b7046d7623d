// Copyright © 2026 The ladle developers
// SPDX-License-Identifier: BSD-3-Clause

//! Wrappers for lazy initialization of the ladle allocator.
//!
//! See [`LazyLadle`] for information and examples.

use crate::arena::Arena;
use crate::Ladle;
use core::alloc::GlobalAlloc;
use core::alloc::Layout;
use core::ops::Deref;
use spin::Lazy;

#[cfg(feature = "allocator-api")]
use core::alloc::AllocError;
#[cfg(feature = "allocator-api")]
use core::alloc::Allocator;
#[cfg(feature = "allocator-api")]
use core::ptr::NonNull;

/// Lazy-initialized version of [`Ladle`].
///
/// This allows constructing a [`Ladle`] allocator *lazily*: the allocator is
/// not built when `LazyLadle` is constructed, but when it is first accessed.
/// This realizes the init-on-first-use half of the allocator's contract at
/// the `static` item level, which is exactly what the
/// [`#[global_allocator]`](https://doc.rust-lang.org/stable/std/alloc/index.html#the-global_allocator-attribute)
/// attribute needs.
///
/// `LazyLadle` implements [`GlobalAlloc`] (and `Allocator` with the
/// `allocator-api` feature), so it can be used anywhere `Ladle` would be.
///
/// # Examples
///
/// ```
/// # #![allow(static_mut_refs)]
/// use ladle::lazy::LazyLadle;
/// use ladle::Ladle;
/// use ladle::SliceArena;
///
/// #[global_allocator]
/// static LADLE: LazyLadle<SliceArena<'static>> = LazyLadle::new(|| {
///     static mut MEMORY: [u8; 1 << 20] = [0u8; 1 << 20];
///     // SAFETY: This closure is called only once, therefore `MEMORY` is
///     // entirely owned by this `Ladle`, and no other reference to it can
///     // be created.
///     Ladle::new(SliceArena::from(unsafe { &mut MEMORY }))
/// });
///
/// // Use the `GlobalAlloc` trait on `LazyLadle`. If this is the first time
/// // `LADLE` is used, the underlying `Ladle` will be initialized now.
/// use std::alloc::GlobalAlloc;
/// use std::alloc::Layout;
/// let _ = unsafe { LADLE.alloc(Layout::new::<u32>()) };
/// ```
#[derive(Debug)]
pub struct LazyLadle<A: Arena, F = fn() -> Ladle<A>>(Lazy<Ladle<A>, F>);

impl<A: Arena, F> LazyLadle<A, F> {
    /// Constructs a new [`LazyLadle`] from the given initialization
    /// function.
    ///
    /// The initialization function runs when the `LazyLadle` is first used:
    /// either dereferenced, or reached through one of the implemented
    /// traits.
    #[inline]
    #[must_use]
    pub const fn new(f: F) -> Self {
        Self(Lazy::new(f))
    }
}

impl<A: Arena, F: FnOnce() -> Ladle<A>> LazyLadle<A, F> {
    /// Returns a reference to the underlying `Ladle`, initializing it if
    /// needed.
    ///
    /// Equivalent to dereferencing (`lazy.get()` is `&*lazy`).
    #[inline]
    pub fn get(&self) -> &Ladle<A> {
        self
    }
}

impl<A: Arena, F: FnOnce() -> Ladle<A>> Deref for LazyLadle<A, F> {
    type Target = Ladle<A>;

    #[inline]
    fn deref(&self) -> &Ladle<A> {
        &self.0
    }
}

#[cfg(feature = "allocator-api")]
unsafe impl<A: Arena, F: FnOnce() -> Ladle<A>> Allocator for LazyLadle<A, F> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        Allocator::allocate(self.get(), layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        Allocator::deallocate(self.get(), ptr, layout)
    }
}

unsafe impl<A: Arena, F: FnOnce() -> Ladle<A>> GlobalAlloc for LazyLadle<A, F> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.get().alloc(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.get().alloc_zeroed(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.get().dealloc(ptr, layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, old_layout: Layout, new_size: usize) -> *mut u8 {
        self.get().realloc(ptr, old_layout, new_size)
    }
}

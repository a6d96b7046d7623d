// Copyright © 2026 The ladle developers
// SPDX-License-Identifier: BSD-3-Clause

use crate::arena::Arena;
use crate::bins::{index_of, PrevLink, BIN_COUNT};
use crate::block::{BlockPtr, ALIGNMENT, MIN_BLOCK, WORD};
use crate::heap::Heap;
use log::{debug, error};

/// Outcome of a [`check`](crate::Ladle::check) pass.
///
/// The checker is advisory: it counts and logs every violation it finds and
/// keeps walking, so a single pass reports all of them. It never mutates the
/// heap and never aborts the process.
#[derive(Default, Copy, Clone, PartialEq, Eq, Debug)]
pub struct CheckReport {
    /// Number of structural violations found.
    pub errors: usize,
    /// Real blocks seen on the chain walk (sentinels excluded).
    pub blocks: usize,
    /// Free blocks seen on the chain walk.
    pub free_blocks: usize,
    /// Free blocks reached through the bin lists.
    pub binned_blocks: usize,
}

impl CheckReport {
    /// `true` when no violation was found.
    #[inline]
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.errors == 0
    }
}

macro_rules! violation {
    ( $report:expr , $( $arg:tt )* ) => {{
        $report.errors += 1;
        error!($($arg)*);
    }};
}

impl<A: Arena> Heap<A> {
    /// Structural validation of the block chain and the free list index.
    ///
    /// Verifies, along the chain: sentinel integrity, payload alignment,
    /// arena bounds, size granularity, header/footer agreement on free
    /// blocks, previous-allocated bits matching the actual predecessor
    /// state, and the absence of adjacent free blocks. Verifies, per bin:
    /// that every member is free, sized for that exact bin, inside the
    /// arena, aligned, and back-linked symmetrically. Finally cross-checks
    /// the free-block population counted each way.
    ///
    /// A bin traversal longer than the largest possible free-block
    /// population is reported as a suspected cycle and abandoned; the check
    /// still returns normally.
    ///
    /// `verbose` ≥ 1 dumps every chain block, ≥ 2 dumps bin members too.
    pub(crate) fn check(&self, verbose: u8) -> CheckReport {
        let mut report = CheckReport::default();

        let Some(base) = self.base() else {
            // Nothing has been set up; nothing can be wrong.
            return report;
        };

        let lo = self.arena().low_bound().as_ptr() as usize;
        let hi = self.arena().high_bound().as_ptr() as usize;

        // SAFETY: the checker only reads, and every dereference below is
        // bounds-checked against the arena before it happens (the sentinels
        // and chain positions are trusted as far as the previous block's
        // size was sane).
        unsafe {
            let prologue = BlockPtr::new(base.as_nonnull().byte_sub(2 * WORD));
            let ptag = prologue.header();
            if ptag.size() != 2 * WORD || !ptag.is_allocated() {
                violation!(report, "bad prologue header: {:?}", ptag);
            }
            if prologue.footer() != ptag {
                violation!(report, "prologue footer does not match its header");
            }

            let mut prev_was_free = false;
            let mut prev_allocated = true;
            let mut cursor = base;
            loop {
                let tag = cursor.header();

                if tag.size() == 0 {
                    // Epilogue: allocated, flush with the high bound, and
                    // aware of its predecessor like any other block.
                    if !tag.is_allocated() {
                        violation!(report, "epilogue at {:p} not marked allocated", cursor);
                    }
                    if cursor.addr() + WORD != hi {
                        violation!(report, "epilogue at {:p} does not mark the arena end", cursor);
                    }
                    if tag.is_prev_allocated() != prev_allocated {
                        violation!(report, "epilogue previous-allocated bit is stale");
                    }
                    break;
                }

                report.blocks += 1;
                if verbose >= 1 {
                    debug!("block {:p}: {:?}", cursor, tag);
                }

                if (cursor.addr() + WORD) % ALIGNMENT != 0 {
                    violation!(report, "payload of {:p} is misaligned", cursor);
                }
                if tag.size() % ALIGNMENT != 0 || tag.size() < MIN_BLOCK {
                    violation!(report, "block {:p} has invalid size {}", cursor, tag.size());
                }
                if cursor.addr() < lo || cursor.addr().saturating_add(tag.size()) > hi {
                    violation!(report, "block {:p} escapes the arena", cursor);
                    // The chain is not trustworthy past this point.
                    break;
                }
                if tag.is_prev_allocated() != prev_allocated {
                    violation!(
                        report,
                        "block {:p}: previous-allocated bit disagrees with the predecessor",
                        cursor
                    );
                }
                if !tag.is_allocated() {
                    report.free_blocks += 1;
                    if cursor.footer() != tag {
                        violation!(report, "block {:p}: footer does not match header", cursor);
                    }
                    if prev_was_free {
                        violation!(report, "adjacent free blocks at {:p}", cursor);
                    }
                }

                prev_was_free = !tag.is_allocated();
                prev_allocated = tag.is_allocated();
                cursor = cursor.next();
            }
        }

        // A list holding more entries than the arena could possibly carry
        // free blocks means the links loop; stop counting instead of
        // following them forever.
        let step_bound = (hi - lo) / MIN_BLOCK + 1;

        for bin in 0..BIN_COUNT {
            let mut steps = 0;
            let mut expected_back = PrevLink::Head(bin);
            let mut cursor = self.bins().head(bin);
            while let Some(block) = cursor {
                if steps >= step_bound {
                    violation!(report, "free list cycle suspected in bin {}", bin);
                    break;
                }
                steps += 1;

                let addr = block.addr();
                if addr % ALIGNMENT != 0 {
                    violation!(report, "bin {}: link target {:p} is misaligned", bin, block);
                    break;
                }
                if addr < lo || addr.saturating_add(MIN_BLOCK) > hi {
                    violation!(report, "bin {}: link target {:p} is outside the arena", bin, block);
                    break;
                }

                // SAFETY: `block` was just checked to be an aligned address
                // inside the arena.
                unsafe {
                    let tag = block.header();
                    if verbose >= 2 {
                        debug!("bin {}: {:p} ({} bytes)", bin, block, tag.size());
                    }
                    if tag.is_allocated() {
                        violation!(report, "bin {}: member {:p} is marked allocated", bin, block);
                    }
                    if tag.size() < MIN_BLOCK {
                        violation!(report, "bin {}: member {:p} has invalid size {}", bin, block, tag.size());
                    } else if index_of(tag.size()) != bin {
                        violation!(
                            report,
                            "bin {}: member {:p} ({} bytes) belongs in bin {}",
                            bin,
                            block,
                            tag.size(),
                            index_of(tag.size())
                        );
                    }
                    let back_word = block.prev_free_word();
                    if back_word == 0 {
                        violation!(report, "bin {}: member {:p} has a null back link", bin, block);
                    } else if PrevLink::decode(back_word) != expected_back {
                        violation!(report, "bin {}: member {:p} has a stale back link", bin, block);
                    }
                    report.binned_blocks += 1;
                    expected_back = PrevLink::Block(block);
                    cursor = block.next_free();
                }
            }
        }

        if report.free_blocks != report.binned_blocks {
            violation!(
                report,
                "{} free blocks on the chain but {} in the bins",
                report.free_blocks,
                report.binned_blocks
            );
        }

        report
    }
}

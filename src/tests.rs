// Copyright © 2026 The ladle developers
// SPDX-License-Identifier: BSD-3-Clause

extern crate alloc;

use crate::arena::SliceArena;
use crate::bins::index_of;
use crate::block::{align_up, BlockPtr, ALIGNMENT, MIN_BLOCK, WORD};
use crate::heap::{Heap, CHUNK, INIT_PAD};
use crate::usage::Usage;
use crate::Ladle;
use alloc::vec;
use alloc::vec::Vec;
use core::alloc::GlobalAlloc;
use core::alloc::Layout;
use core::ptr::NonNull;
use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;

#[repr(align(8))]
struct AlignedArray<const N: usize>([u8; N]);

#[test]
fn aligned_and_in_bounds() {
    let mut memory = AlignedArray([0u8; 32 * 1024]);
    let start = memory.0.as_ptr() as usize;
    let end = start + memory.0.len();
    let ladle = Ladle::from(&mut memory.0);

    for &size in &[1usize, 7, 8, 24, 100, 512, 4000] {
        let ptr = ladle.allocate(size).expect("allocation failed");
        let addr = ptr.as_ptr() as usize;
        assert_eq!(addr % ALIGNMENT, 0, "payload misaligned for size {size}");
        assert!(addr >= start && addr + size <= end, "payload out of bounds");
    }
    assert!(ladle.check(0).passed());
}

#[test]
fn payloads_do_not_overlap() {
    let mut memory = AlignedArray([0u8; 32 * 1024]);
    let ladle = Ladle::from(&mut memory.0);

    let sizes = [1usize, 8, 16, 24, 100, 200, 512];
    let blocks: Vec<(NonNull<u8>, usize)> = sizes
        .iter()
        .map(|&size| (ladle.allocate(size).expect("allocation failed"), size))
        .collect();

    for (index, &(ptr, size)) in blocks.iter().enumerate() {
        unsafe { core::ptr::write_bytes(ptr.as_ptr(), index as u8 + 1, size) };
    }
    for (index, &(ptr, size)) in blocks.iter().enumerate() {
        for offset in 0..size {
            assert_eq!(
                unsafe { ptr.as_ptr().add(offset).read() },
                index as u8 + 1,
                "allocation {index} clobbered at offset {offset}"
            );
        }
    }
    assert!(ladle.check(0).passed());
}

#[test]
fn zero_size_allocation_yields_nothing() {
    let mut memory = AlignedArray([0u8; 16 * 1024]);
    let ladle = Ladle::from(&mut memory.0);
    assert!(ladle.allocate(0).is_none());
    assert_eq!(ladle.usage().objects, 0);
}

#[test]
fn small_allocations_round_up_to_the_minimum_block() {
    let mut memory = AlignedArray([0u8; 16 * 1024]);
    let ladle = Ladle::from(&mut memory.0);

    let ptr = ladle.allocate(1).expect("allocation failed");
    // A one-byte request still gets a minimum-size block; writing the whole
    // usable area must not disturb anything.
    unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0xab, MIN_BLOCK - WORD) };
    assert!(ladle.check(0).passed());
    assert_eq!(ladle.usage().used, MIN_BLOCK - WORD);
}

#[test]
fn freed_block_is_reused() {
    let mut memory = AlignedArray([0u8; 16 * 1024]);
    let ladle = Ladle::from(&mut memory.0);

    let first = ladle.allocate(1).expect("allocation failed");
    let total = ladle.usage().total;
    unsafe { ladle.deallocate(first) };

    // The freed block is the most recently inserted member of its bin, so
    // the next request of the same size takes it back, with no growth.
    let second = ladle.allocate(1).expect("allocation failed");
    assert_eq!(first, second);
    assert_eq!(ladle.usage().total, total);
}

#[test]
fn adjacent_frees_coalesce() {
    let mut memory = AlignedArray([0u8; 16 * 1024]);
    let mut heap = Heap::new(SliceArena::from(&mut memory.0));

    let payload = MIN_BLOCK - WORD;
    let a = heap.allocate(payload).expect("allocation failed");
    let b = heap.allocate(payload).expect("allocation failed");
    let _c = heap.allocate(payload).expect("allocation failed");

    unsafe {
        heap.deallocate(a);
        // Freed alone, `a` sits in the minimum size class.
        let head = heap
            .bins()
            .head(index_of(MIN_BLOCK))
            .expect("freed block not indexed");
        assert_eq!(head.payload(), a);

        heap.deallocate(b);
    }

    // One merged block spanning both, filed under the summed size.
    assert!(heap.check(0).passed());
    assert!(heap.bins().head(index_of(MIN_BLOCK)).is_none());
    let merged = heap
        .bins()
        .head(index_of(2 * MIN_BLOCK))
        .expect("merged block not indexed");
    unsafe {
        assert_eq!(merged.payload(), a);
        assert_eq!(merged.header().size(), 2 * MIN_BLOCK);
    }
}

#[test]
fn resize_moves_data() {
    let mut memory = AlignedArray([0u8; 16 * 1024]);
    let ladle = Ladle::from(&mut memory.0);

    let ptr = ladle.allocate(16).expect("allocation failed");
    unsafe {
        ptr.as_ptr().copy_from_nonoverlapping(b"0123456789abcdef".as_ptr(), 16);

        let bigger = ladle.resize(Some(ptr), 64).expect("resize failed");
        assert_eq!(core::slice::from_raw_parts(bigger.as_ptr(), 16), b"0123456789abcdef");

        let smaller = ladle.resize(Some(bigger), 4).expect("resize failed");
        assert_eq!(core::slice::from_raw_parts(smaller.as_ptr(), 4), b"0123");

        ladle.deallocate(smaller);
    }
    assert_eq!(ladle.usage().objects, 0);
    assert!(ladle.check(0).passed());
}

#[test]
fn resize_to_zero_frees() {
    let mut memory = AlignedArray([0u8; 16 * 1024]);
    let ladle = Ladle::from(&mut memory.0);

    let ptr = ladle.allocate(32).expect("allocation failed");
    assert_eq!(ladle.usage().objects, 1);
    assert!(unsafe { ladle.resize(Some(ptr), 0) }.is_none());
    assert_eq!(ladle.usage().objects, 0);
    assert!(ladle.check(0).passed());
}

#[test]
fn resize_of_nothing_allocates() {
    let mut memory = AlignedArray([0u8; 16 * 1024]);
    let ladle = Ladle::from(&mut memory.0);

    let ptr = unsafe { ladle.resize(None, 40) }.expect("resize failed");
    assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
    assert_eq!(ladle.usage().objects, 1);
}

#[test]
fn dealloc_null_is_a_noop() {
    let mut memory = AlignedArray([0u8; 16 * 1024]);
    let ladle = Ladle::from(&mut memory.0);
    ladle.init().expect("init failed");

    let before = ladle.usage();
    unsafe { ladle.dealloc(core::ptr::null_mut(), Layout::new::<u8>()) };
    assert_eq!(ladle.usage(), before);
    assert!(ladle.check(0).passed());
}

#[test]
fn global_alloc_contract() {
    let mut memory = AlignedArray([0u8; 16 * 1024]);
    let ladle = Ladle::from(&mut memory.0);

    unsafe {
        // Stricter alignment than the allocator guarantees is refused.
        let strict = Layout::from_size_align(8, 16).unwrap();
        assert!(ladle.alloc(strict).is_null());

        let layout = Layout::from_size_align(64, 8).unwrap();
        let zeroed = ladle.alloc_zeroed(layout);
        assert!(!zeroed.is_null());
        assert!(core::slice::from_raw_parts(zeroed, 64).iter().all(|&b| b == 0));
        ladle.dealloc(zeroed, layout);
    }
    assert!(ladle.check(0).passed());
}

#[test]
fn zeroed_allocation_is_zeroed() {
    let mut memory = AlignedArray([0u8; 16 * 1024]);
    let ladle = Ladle::from(&mut memory.0);

    // Dirty the arena first so the zeroing is observable.
    let dirty = ladle.allocate(256).expect("allocation failed");
    unsafe {
        core::ptr::write_bytes(dirty.as_ptr(), 0xff, 256);
        ladle.deallocate(dirty);
    }

    let ptr = ladle.zeroed_allocate(32, 8).expect("allocation failed");
    let data = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), 256) };
    assert!(data.iter().all(|&b| b == 0));
}

#[test]
fn exhaustion_is_reported_not_fatal() {
    let mut memory = AlignedArray([0u8; 8 * 1024]);
    let ladle = Ladle::from(&mut memory.0);

    let mut live = Vec::new();
    while let Some(ptr) = ladle.allocate(128) {
        live.push(ptr);
    }
    assert!(!live.is_empty());
    assert!(ladle.allocate(128).is_none());
    assert!(ladle.check(0).passed());

    // Freeing makes room again.
    let ptr = live.pop().unwrap();
    unsafe { ladle.deallocate(ptr) };
    assert!(ladle.allocate(64).is_some());
    assert!(ladle.check(0).passed());
}

#[test]
fn usage_accounting() {
    let mut memory = AlignedArray([0u8; 16 * 1024]);
    let ladle = Ladle::from(&mut memory.0);
    ladle.init().expect("init failed");

    let baseline = ladle.usage();
    assert_eq!(baseline.total, 3 * WORD + INIT_PAD + CHUNK);
    assert_eq!(baseline.used, 0);
    assert_eq!(baseline.free, CHUNK);
    assert_eq!(baseline.objects, 0);

    let a_block = align_up(24 + WORD).max(MIN_BLOCK);
    let a = ladle.allocate(24).expect("allocation failed");
    let usage = ladle.usage();
    assert_eq!(usage.used, a_block - WORD);
    assert_eq!(usage.free, CHUNK - a_block);
    assert_eq!(usage.objects, 1);

    let b_block = align_up(100 + WORD).max(MIN_BLOCK);
    let b = ladle.allocate(100).expect("allocation failed");
    let usage = ladle.usage();
    assert_eq!(usage.used, (a_block - WORD) + (b_block - WORD));
    assert_eq!(usage.free, CHUNK - a_block - b_block);
    assert_eq!(usage.objects, 2);

    unsafe { ladle.deallocate(a) };
    let usage = ladle.usage();
    assert_eq!(usage.used, b_block - WORD);
    assert_eq!(usage.free, CHUNK - b_block);
    assert_eq!(usage.objects, 1);

    unsafe { ladle.deallocate(b) };
    assert_eq!(ladle.usage(), baseline);
}

#[test]
fn init_twice_is_a_noop() {
    let mut memory = AlignedArray([0u8; 16 * 1024]);
    let ladle = Ladle::from(&mut memory.0);
    ladle.init().expect("init failed");
    let before = ladle.usage();
    ladle.init().expect("second init failed");
    assert_eq!(ladle.usage(), before);
}

#[test]
fn init_failure_is_recoverable() {
    // Too small for even the sentinel words.
    let mut tiny = AlignedArray([0u8; 16]);
    let ladle = Ladle::from(&mut tiny.0);
    assert!(ladle.init().is_err());
    assert!(ladle.allocate(8).is_none());

    // Sentinels fit but the initial chunk does not: init reports the
    // refusal, yet the chain is valid and the allocator answers politely.
    let mut small = AlignedArray([0u8; 1024]);
    let ladle = Ladle::from(&mut small.0);
    assert!(ladle.init().is_err());
    assert!(ladle.check(0).passed());
    assert!(ladle.allocate(100).is_none());
    assert!(ladle.check(0).passed());
}

#[test]
fn cycling_does_not_grow_the_arena() {
    let mut memory = AlignedArray([0u8; 64 * 1024]);
    let ladle = Ladle::from(&mut memory.0);

    let warm = ladle.allocate(256).expect("allocation failed");
    unsafe { ladle.deallocate(warm) };
    let total = ladle.usage().total;

    // Two live blocks of at most ~500 bytes fit comfortably in one chunk;
    // if coalescing ever lost track of a block, growth would creep in here.
    let mut rng = SmallRng::seed_from_u64(999);
    for _ in 0..2000 {
        let size = rng.gen_range(1..=480);
        let a = ladle.allocate(size).expect("allocation failed");
        let b = ladle.allocate(size).expect("allocation failed");
        unsafe {
            ladle.deallocate(a);
            ladle.deallocate(b);
        }
    }

    assert_eq!(ladle.usage().total, total);
    assert!(ladle.check(0).passed());
}

#[cfg(not(miri))]
#[test]
fn random_workload_stays_consistent() {
    let mut memory = vec![0u8; 1 << 20];
    let mut heap = Heap::new(SliceArena::from(&mut memory[..]));

    let mut rng = SmallRng::seed_from_u64(12345);
    let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();
    let mut stamp: u8 = 0;

    for step in 0..4000 {
        match rng.gen_range(0..8) {
            0 | 1 => {
                if !live.is_empty() {
                    let index = rng.gen_range(0..live.len());
                    let (ptr, size, fill) = live.swap_remove(index);
                    unsafe {
                        for offset in 0..size {
                            assert_eq!(ptr.as_ptr().add(offset).read(), fill, "payload clobbered");
                        }
                        heap.deallocate(ptr);
                    }
                }
            }
            2 => {
                if !live.is_empty() {
                    let index = rng.gen_range(0..live.len());
                    let (ptr, _, fill) = live[index];
                    let new_size = rng.gen_range(1..=512);
                    if let Some(new_ptr) = unsafe { heap.resize(Some(ptr), new_size) } {
                        unsafe { core::ptr::write_bytes(new_ptr.as_ptr(), fill, new_size) };
                        live[index] = (new_ptr, new_size, fill);
                    }
                }
            }
            _ => {
                let size = rng.gen_range(1..=512);
                if let Some(ptr) = heap.allocate(size) {
                    stamp = stamp.wrapping_add(1);
                    unsafe { core::ptr::write_bytes(ptr.as_ptr(), stamp, size) };
                    live.push((ptr, size, stamp));
                }
            }
        }

        if step % 256 == 0 {
            assert!(heap.check(0).passed(), "checker failed at step {step}");
        }
    }

    while let Some((ptr, size, fill)) = live.pop() {
        unsafe {
            for offset in 0..size {
                assert_eq!(ptr.as_ptr().add(offset).read(), fill, "payload clobbered");
            }
            heap.deallocate(ptr);
        }
    }

    // With everything freed, eager coalescing leaves a single free block
    // covering the whole chain.
    let report = heap.check(0);
    assert!(report.passed());
    assert_eq!(report.free_blocks, 1);
    let usage = Usage::get(&heap);
    assert_eq!(usage.objects, 0);
    assert_eq!(usage.free, usage.total - 3 * WORD - INIT_PAD);
}

#[test]
fn checker_reports_corruption() {
    let mut memory = AlignedArray([0u8; 16 * 1024]);
    let mut heap = Heap::new(SliceArena::from(&mut memory.0));

    let a = heap.allocate(24).expect("allocation failed");
    let _b = heap.allocate(24).expect("allocation failed");
    assert!(heap.check(0).passed());

    unsafe {
        // Flip the allocation bit behind the engine's back: the chain now
        // disagrees with itself and with the bins.
        let header = a.as_ptr().sub(WORD).cast::<usize>();
        header.write(header.read() & !1);
    }
    assert!(!heap.check(0).passed());
}

#[test]
fn checker_survives_a_looped_free_list() {
    let mut memory = AlignedArray([0u8; 16 * 1024]);
    let mut heap = Heap::new(SliceArena::from(&mut memory.0));

    let a = heap.allocate(24).expect("allocation failed");
    let _hold = heap.allocate(24).expect("allocation failed");
    unsafe {
        heap.deallocate(a);
        // Point the freed block's forward link at itself. The walk must
        // stop at the step bound and report, not spin forever.
        let freed = BlockPtr::from_payload(a);
        freed.set_next_free(Some(freed));
    }
    assert!(!heap.check(0).passed());
}

#[cfg(all(feature = "sbrk", unix))]
mod sbrk {
    use super::*;
    use crate::SbrkArena;

    #[test]
    #[ignore = "requires exclusive ownership of the program break"]
    fn sbrk_roundtrip() {
        let ladle = Ladle::new(SbrkArena::new());
        let ptr = ladle.allocate(64).expect("sbrk allocation failed");
        unsafe {
            core::ptr::write_bytes(ptr.as_ptr(), 0x5a, 64);
            assert_eq!(ptr.as_ptr().read(), 0x5a);
            ladle.deallocate(ptr);
        }
        assert!(ladle.check(0).passed());
    }
}

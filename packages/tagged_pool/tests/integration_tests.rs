//! Integration tests for the `tagged_pool` package.
//!
//! These tests verify the pool's observable contract: uniqueness of live pages,
//! FIFO recycling order, bookkeeping conservation across release and teardown,
//! and the partition invariant under multi-threaded use.

#![allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "test code doesn't need the same safety rigor as production code"
)]

use std::collections::HashSet;
use std::thread;

use tagged_pool::{DropPolicy, RawTaggedPool, TaggedPool};

#[test]
fn live_pages_never_alias() {
    let mut pool = RawTaggedPool::new(64);

    // Allocate across several tags, including recycled pages.
    for warmup_tag in 0..4_u64 {
        let _page = pool.allocate(warmup_tag);
    }
    pool.release_all(1);
    pool.release_all(3);

    let mut addresses = HashSet::new();
    for tag in 0..8_u64 {
        let page = pool.allocate(tag + 100);
        assert!(
            addresses.insert(page.ptr().addr()),
            "two live pages share an address"
        );
    }
}

#[test]
fn fifo_reuse_spans_tags() {
    let mut pool = RawTaggedPool::new(64);

    let pages: Vec<_> = (0..5).map(|_| pool.allocate(1)).collect();
    pool.release_all(1);

    // The next five allocations, to any mix of tags, return the released pages
    // in their original allocation order before any new page is created.
    let capacity_before = pool.capacity();
    for (i, original) in pages.iter().enumerate() {
        let reused = pool.allocate(2 + (i as u64 % 3));
        assert_eq!(reused.ptr(), original.ptr());
    }
    assert_eq!(pool.capacity(), capacity_before);

    // One more allocation must create a fresh page.
    let fresh = pool.allocate(2);
    assert_eq!(pool.capacity(), capacity_before + 1);
    assert!(pages.iter().all(|p| p.ptr() != fresh.ptr()));
}

#[test]
fn release_conserves_page_count() {
    let mut pool = RawTaggedPool::new(64);

    for _ in 0..6 {
        let _page = pool.allocate(1);
    }
    for _ in 0..2 {
        let _page = pool.allocate(2);
    }

    assert_eq!(pool.len(), 8);
    assert_eq!(pool.capacity(), 8);
    assert_eq!(pool.tag_count(), 2);

    pool.release_all(1);

    // Exactly the six pages of tag 1 moved to the free queue; nothing was created
    // or destroyed.
    assert_eq!(pool.len(), 2);
    assert_eq!(pool.free_page_count(), 6);
    assert_eq!(pool.capacity(), 8);
    assert_eq!(pool.tag_count(), 1);
    assert_eq!(pool.page_count_of(1), 0);
}

#[test]
fn double_release_changes_nothing() {
    let mut pool = RawTaggedPool::new(64);

    let _page = pool.allocate(5);
    pool.release_all(5);

    let len = pool.len();
    let free = pool.free_page_count();
    let capacity = pool.capacity();
    let tags = pool.tag_count();

    pool.release_all(5);
    pool.release_all(6); // never allocated

    assert_eq!(pool.len(), len);
    assert_eq!(pool.free_page_count(), free);
    assert_eq!(pool.capacity(), capacity);
    assert_eq!(pool.tag_count(), tags);
}

// The worked example from the pool's design: page size 64, three tags, reuse in
// allocation order, teardown accounts for every page exactly once.
#[test]
fn allocation_and_reuse_walkthrough() {
    let mut pool = RawTaggedPool::new(64);

    let p1 = pool.allocate(1);
    let p2 = pool.allocate(1);
    let p3 = pool.allocate(2);
    assert_eq!(pool.page_count_of(1), 2);
    assert_eq!(pool.page_count_of(2), 1);

    pool.release_all(1);
    assert_eq!(pool.free_page_count(), 2);
    assert_eq!(pool.tag_count(), 1);

    // P1 was appended first, so it is recycled first.
    let reused = pool.allocate(3);
    assert_eq!(reused.ptr(), p1.ptr());
    assert_eq!(pool.free_page_count(), 1);

    pool.release_all(2);
    assert_eq!(pool.free_page_count(), 2);

    // Drop reclaims P1, P2 and P3 - capacity never exceeded three pages.
    assert_eq!(pool.capacity(), 3);
    let _ = p2;
    let _ = p3;
}

#[test]
fn partition_invariant_after_threaded_interleaving() {
    let pool = TaggedPool::new(256);

    // Each worker churns its own range of tags; releases interleave with
    // allocations on other threads through the shared free queue.
    let workers: Vec<_> = (0..8_u64)
        .map(|worker| {
            let pool = pool.clone();
            thread::spawn(move || {
                let base = worker * 100;
                for round in 0..50 {
                    let tag = base + (round % 7);
                    for _ in 0..3 {
                        let mut page = pool.allocate(tag);

                        // Touch the page while it is exclusively ours.
                        let bytes = unsafe { page.as_uninit_slice_mut() };
                        bytes
                            .first_mut()
                            .unwrap()
                            .write(u8::try_from(worker).unwrap());
                    }
                    if round % 2 == 0 {
                        pool.release_all(tag);
                    }
                }
                for tag_offset in 0..7 {
                    pool.release_all(base + tag_offset);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    // Quiescence: every page ever created is in exactly one place - and since all
    // tags were released, that place is the free queue.
    assert_eq!(pool.len(), 0);
    assert_eq!(pool.tag_count(), 0);
    assert_eq!(pool.free_page_count(), pool.capacity());
}

#[test]
fn partition_invariant_holds_mid_flight() {
    let pool = TaggedPool::new(64);

    let _held = pool.allocate(1);
    let _held2 = pool.allocate(2);
    pool.release_all(2);
    pool.reserve(4);

    // One page used, the rest free; nothing unaccounted for.
    assert_eq!(pool.len() + pool.free_page_count(), pool.capacity());
    assert_eq!(pool.len(), 1);
}

#[test]
fn teardown_with_live_tags_reclaims_everything() {
    let pool = TaggedPool::new(64);

    let _first = pool.allocate(1);
    let _second = pool.allocate(2);
    pool.release_all(1);

    // Default drop policy: dropping with tag 2 still live is fine; all pages -
    // used and free alike - are reclaimed exactly once by the pool's Drop.
    drop(pool);
}

#[test]
#[should_panic(expected = "forbidden by DropPolicy::MustNotDropPages")]
fn strict_teardown_rejects_live_tags() {
    let pool = TaggedPool::builder()
        .page_size(64)
        .drop_policy(DropPolicy::MustNotDropPages)
        .build();

    let _page = pool.allocate(1);

    drop(pool);
}

#[test]
fn strict_teardown_accepts_fully_released_pool() {
    let pool = TaggedPool::builder()
        .page_size(64)
        .drop_policy(DropPolicy::MustNotDropPages)
        .build();

    let _page = pool.allocate(1);
    pool.release_all(1);

    drop(pool);
}

#[test]
fn handles_remain_usable_across_threads() {
    let pool = TaggedPool::new(64);

    let page = pool.allocate(1);

    // SAFETY: Tag 1 stays live for the whole test and only one thread at a time
    // touches the page.
    unsafe { page.ptr().cast::<u32>().write(7) };

    let value = thread::spawn(move || {
        // The handle is Copy and Send; the pool handle in this thread keeps it live.
        unsafe { page.ptr().cast::<u32>().read() }
    })
    .join()
    .unwrap();

    assert_eq!(value, 7);
    pool.release_all(1);
}

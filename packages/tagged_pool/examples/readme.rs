//! Copy of the example embedded in the package README, to ensure it remains valid.

fn main() {
    use tagged_pool::TaggedPool;

    // Create a thread-safe pool of 4 KiB pages.
    let pool = TaggedPool::new(4096);

    // Allocate scratch pages under the tag of some unit of work.
    let page = pool.allocate(42);

    // SAFETY: The page was just allocated and nothing else accesses it.
    unsafe { page.ptr().cast::<u64>().write(123) };

    // When the unit of work completes, release everything it allocated.
    pool.release_all(42);

    // The page is back in the free queue, ready for the next unit of work.
    assert_eq!(pool.free_page_count(), 1);
}

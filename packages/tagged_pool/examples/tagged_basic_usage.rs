//! Example demonstrating basic usage of `TaggedPool` across threads.
//!
//! This shows the thread-safe pool with tag-scoped bulk release.
//! Best choice for most use cases.

use std::thread;

use tagged_pool::TaggedPool;

fn main() {
    println!("=== TaggedPool: Thread-safe, Tag-scoped Release ===");

    // Create a thread-safe pool of 4 KiB pages.
    let pool = TaggedPool::new(4096);

    // Allocate a few pages under tag 1.
    let first = pool.allocate(1);
    let second = pool.allocate(1);

    // SAFETY: The pages were just allocated and nothing else accesses them.
    unsafe { first.ptr().cast::<u64>().write(100) };
    // SAFETY: As above.
    unsafe { second.ptr().cast::<u64>().write(200) };

    println!("Pages under tag 1: {}", pool.page_count_of(1));

    // Thread-safe sharing: another thread works under its own tag.
    let worker_pool = pool.clone();
    thread::spawn(move || {
        let page = worker_pool.allocate(2);
        // SAFETY: The page was just allocated under a tag only this thread uses.
        unsafe { page.ptr().cast::<u64>().write(300) };
        println!("From thread: allocated under tag 2");
        worker_pool.release_all(2);
    })
    .join()
    .unwrap();

    // Release everything under tag 1 in one call.
    pool.release_all(1);

    println!("Used pages: {}", pool.len());
    println!("Recyclable pages: {}", pool.free_page_count());
    println!("Total pages ever created: {}", pool.capacity());

    // All pages are reclaimed when the last pool handle is dropped.
}

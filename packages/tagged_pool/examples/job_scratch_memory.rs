//! Example demonstrating the motivating pattern for `TaggedPool`: per-job scratch
//! memory in a multi-threaded job system.
//!
//! Every job gets a tag. Workers allocate as many scratch pages as the job needs
//! without tracking them individually, and the whole job's memory is released with
//! one call when the job retires. After the first wave of jobs, the pool is warm
//! and no allocation touches the system allocator.

use std::thread;

use tagged_pool::TaggedPool;

const PAGE_SIZE: usize = 16 * 1024;
const JOBS_PER_WORKER: u64 = 8;

fn main() {
    let pool = TaggedPool::new(PAGE_SIZE);

    // Warm the pool up front so the steady state never allocates.
    pool.reserve(16);

    let workers: Vec<_> = (0..4_u64)
        .map(|worker| {
            let pool = pool.clone();
            thread::spawn(move || {
                for job in 0..JOBS_PER_WORKER {
                    // Job ids double as tags; the scheme is up to the caller.
                    let job_id = worker * JOBS_PER_WORKER + job;
                    run_job(&pool, job_id);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    println!("jobs done; used pages: {}", pool.len());
    println!(
        "pool reached {} pages, {} now recyclable",
        pool.capacity(),
        pool.free_page_count()
    );
}

fn run_job(pool: &TaggedPool, job_id: u64) {
    // A job grabs scratch pages as it goes; nobody tracks individual pages.
    for chunk in 0..3_u64 {
        let page = pool.allocate(job_id);

        // SAFETY: The page belongs to this job's tag and only this thread runs
        // the job, so the page is exclusively ours until release below.
        unsafe { page.ptr().cast::<u64>().write(chunk) };
    }

    // Retiring the job releases all of its scratch memory at once.
    pool.release_all(job_id);
}

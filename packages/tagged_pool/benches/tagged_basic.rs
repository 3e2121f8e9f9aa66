//! Basic benchmarks for the `tagged_pool` package.

#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use tagged_pool::RawTaggedPool;

criterion_group!(benches, entrypoint);
criterion_main!(benches);

const PAGE_SIZE: usize = 4096;

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("tp_fill");

    group.bench_function("empty", |b| {
        b.iter(|| {
            drop(black_box(RawTaggedPool::new(PAGE_SIZE)));
        });
    });

    group.bench_function("one", |b| {
        b.iter(|| {
            let mut pool = RawTaggedPool::new(PAGE_SIZE);
            let _page = pool.allocate(1);
            pool
        });
    });

    group.bench_function("thousand_one_tag", |b| {
        b.iter(|| {
            let mut pool = RawTaggedPool::new(PAGE_SIZE);
            for _ in 0..1_000 {
                let _page = pool.allocate(1);
            }
            pool
        });
    });

    group.bench_function("thousand_many_tags", |b| {
        b.iter(|| {
            let mut pool = RawTaggedPool::new(PAGE_SIZE);
            for tag in 0_u64..1_000 {
                let _page = pool.allocate(tag % 32);
            }
            pool
        });
    });

    group.finish();

    let mut recycle_group = c.benchmark_group("tp_recycle");

    // Warm pool: every allocation after the first round is pure bookkeeping.
    recycle_group.bench_function("release_and_realloc", |b| {
        let mut pool = RawTaggedPool::new(PAGE_SIZE);

        b.iter(|| {
            for _ in 0..64 {
                let _page = pool.allocate(1);
            }
            pool.release_all(black_box(1));
        });
    });

    recycle_group.bench_function("reserved_alloc", |b| {
        let mut pool = RawTaggedPool::new(PAGE_SIZE);
        pool.reserve(64);

        b.iter(|| {
            for _ in 0..64 {
                let _page = pool.allocate(2);
            }
            pool.release_all(black_box(2));
        });
    });

    recycle_group.finish();
}

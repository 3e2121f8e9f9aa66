//! This package provides [`TaggedPool`], a pool of fixed-size memory pages scoped by
//! caller-chosen numeric tags.
//!
//! Callers allocate pages under a tag - typically the identity of one unit of work -
//! and later release every page under that tag in a single bulk operation. Released
//! pages are recycled through a FIFO free queue instead of being returned to the
//! system, so after warm-up the pool serves allocations without ever touching the
//! system allocator. This amortizes allocation cost for short-lived, group-scoped
//! memory and removes all per-object deallocation bookkeeping.
//!
//! # Features
//!
//! - **Tag-scoped bulk release**: One call frees every page of a unit of work.
//! - **Stable addresses**: Pages never move while the pool is alive.
//! - **FIFO recycling**: Released pages are reused in original allocation order.
//! - **Grow-only resource model**: Pages are created on demand, recycled forever,
//!   and reclaimed only when the pool is dropped.
//! - **Thread-safe and single-threaded variants**: [`TaggedPool`] for multi-threaded
//!   use, [`RawTaggedPool`] for single-threaded performance.
//! - **O(1) bookkeeping**: Allocation, tag append and per-page release cost do not
//!   grow with the number of pages a tag holds.
//! - **Optional leak detection**: The pool can be configured to panic on drop if
//!   tags still hold pages.
//!
//! # Example
//!
//! ```rust
//! use tagged_pool::TaggedPool;
//!
//! // Create a thread-safe pool of 4 KiB pages.
//! let pool = TaggedPool::new(4096);
//!
//! // Allocate scratch pages under the tag of some unit of work.
//! let page = pool.allocate(42);
//!
//! // SAFETY: The page was just allocated and nothing else accesses it.
//! unsafe { page.ptr().cast::<u64>().write(123) };
//!
//! // When the unit of work completes, release everything it allocated.
//! pool.release_all(42);
//!
//! // The page is back in the free queue, ready for the next unit of work.
//! assert_eq!(pool.free_page_count(), 1);
//! ```
//!
//! For single-threaded use:
//!
//! ```rust
//! use tagged_pool::RawTaggedPool;
//!
//! // Create a single-threaded pool (no locking).
//! let mut pool = RawTaggedPool::new(4096);
//!
//! let page = pool.allocate(1);
//! assert_eq!(page.size(), 4096);
//!
//! pool.release_all(1);
//! ```
//!
//! # Contract
//!
//! The pool tracks which pages belong to which tag - nothing more. Page contents are
//! opaque to it: pages are handed out uninitialized and the pool never reads, writes
//! or synchronizes them. A [`PageRef`] stays valid until its tag is released or the
//! pool is dropped; using it past that point is undefined behavior the pool cannot
//! detect, which is why all content access requires unsafe code.

mod builder;
mod constants;
mod drop_policy;
mod page_ref;
mod pool;
mod raw;
mod raw_builder;

pub use builder::*;
pub use drop_policy::*;
pub use page_ref::*;
pub use pool::*;
pub use raw::RawTaggedPool;
pub use raw_builder::*;

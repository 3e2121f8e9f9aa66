use std::alloc::Layout;
use std::sync::{Arc, Mutex};

use crate::constants::ERR_POISONED_LOCK;
use crate::{PageRef, RawTaggedPool, TaggedPoolBuilder};

/// A thread-safe wrapper around [`RawTaggedPool`].
///
/// This type acts as a cloneable handle to a shared pool instance. Multiple handles
/// can exist simultaneously, and the underlying pool remains alive as long as at
/// least one handle exists. This is the natural shape for the intended use: a work
/// scheduler hands clones to its worker threads, workers allocate scratch pages
/// under the tag of the unit of work they are executing, and whichever thread
/// retires the unit releases its tag.
///
/// A single mutual-exclusion lock serializes all bookkeeping: both
/// [`allocate()`][Self::allocate] and [`release_all()`][Self::release_all] hold it
/// for the duration of their structural mutation and release it before returning.
/// The lock guards only the pool's bookkeeping - it never guards page contents.
/// Reading or writing the bytes behind a returned [`PageRef`] is entirely the
/// caller's synchronization responsibility.
///
/// # Example
///
/// ```
/// use std::thread;
///
/// use tagged_pool::TaggedPool;
///
/// let pool = TaggedPool::new(4096);
///
/// // Clone the pool handle to share across threads.
/// let worker_pool = pool.clone();
///
/// let worker = thread::spawn(move || {
///     let page = worker_pool.allocate(1);
///
///     // SAFETY: The page was just allocated under a tag only this thread uses.
///     unsafe { page.ptr().cast::<u64>().write(42) };
///
///     worker_pool.release_all(1);
/// });
///
/// worker.join().unwrap();
/// assert_eq!(pool.len(), 0);
/// assert_eq!(pool.free_page_count(), 1);
/// ```
///
/// # Teardown
///
/// The underlying pool (and with it every page ever created) is reclaimed when the
/// last clone is dropped. Because the handles keep the pool alive, it is impossible
/// to tear the pool down while another thread still holds a handle to operate on.
#[derive(Clone, Debug)]
pub struct TaggedPool {
    /// The shared pool instance protected by a mutex for thread safety.
    inner: Arc<Mutex<RawTaggedPool>>,
}

impl From<RawTaggedPool> for TaggedPool {
    /// Creates a new [`TaggedPool`] from an existing raw pool.
    ///
    /// The provided pool is consumed and wrapped in thread-safe reference counting.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::{RawTaggedPool, TaggedPool};
    ///
    /// let mut raw_pool = RawTaggedPool::new(4096);
    /// raw_pool.reserve(8);
    ///
    /// // Warm up single-threaded, then share.
    /// let pool = TaggedPool::from(raw_pool);
    /// assert_eq!(pool.free_page_count(), 8);
    /// ```
    fn from(pool: RawTaggedPool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pool)),
        }
    }
}

impl TaggedPool {
    /// Creates a new `TaggedPool` with the given page size and default configuration.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is zero.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::TaggedPool;
    ///
    /// let pool = TaggedPool::new(4096);
    ///
    /// let page = pool.allocate(1);
    /// assert_eq!(page.size(), 4096);
    /// ```
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self::builder().page_size(page_size).build()
    }

    /// Returns a builder for creating a [`TaggedPool`] with custom configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::{DropPolicy, TaggedPool};
    ///
    /// let pool = TaggedPool::builder()
    ///     .page_size(4096)
    ///     .drop_policy(DropPolicy::MustNotDropPages)
    ///     .build();
    /// ```
    pub fn builder() -> TaggedPoolBuilder {
        TaggedPoolBuilder::new()
    }

    /// Allocates one page under the given tag and returns a handle to it.
    ///
    /// See [`RawTaggedPool::allocate()`] for the full contract. This operation may
    /// block if another thread is currently mutating the pool.
    ///
    /// # Panics
    ///
    /// Panics if a new page is needed and the system cannot provide backing memory.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::TaggedPool;
    ///
    /// let pool = TaggedPool::new(64);
    ///
    /// let page = pool.allocate(7);
    /// assert_eq!(page.tag(), 7);
    /// assert_eq!(pool.len(), 1);
    /// ```
    #[inline]
    pub fn allocate(&self, tag: u64) -> PageRef {
        let mut pool = self.inner.lock().expect(ERR_POISONED_LOCK);
        pool.allocate(tag)
    }

    /// Releases every page assigned to the given tag in one bulk operation.
    ///
    /// See [`RawTaggedPool::release_all()`] for the full contract - in particular,
    /// every [`PageRef`] previously returned for this tag is invalid as soon as this
    /// call returns, and releasing an unknown or already-released tag is a no-op.
    /// This operation may block if another thread is currently mutating the pool.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::TaggedPool;
    ///
    /// let pool = TaggedPool::new(64);
    ///
    /// let _first = pool.allocate(1);
    /// let _second = pool.allocate(1);
    ///
    /// pool.release_all(1);
    /// assert_eq!(pool.len(), 0);
    /// assert_eq!(pool.free_page_count(), 2);
    /// ```
    #[inline]
    pub fn release_all(&self, tag: u64) {
        let mut pool = self.inner.lock().expect(ERR_POISONED_LOCK);
        pool.release_all(tag);
    }

    /// Pre-creates pages so that at least `additional` allocations can be served
    /// from the free queue without touching the system allocator.
    ///
    /// # Panics
    ///
    /// Panics if the system cannot provide backing memory for a new page.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::TaggedPool;
    ///
    /// let pool = TaggedPool::new(4096);
    ///
    /// pool.reserve(16);
    /// assert_eq!(pool.free_page_count(), 16);
    /// ```
    pub fn reserve(&self, additional: usize) {
        let mut pool = self.inner.lock().expect(ERR_POISONED_LOCK);
        pool.reserve(additional);
    }

    /// The number of pages currently assigned to tags.
    ///
    /// This operation may block if another thread is currently accessing the pool.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::TaggedPool;
    ///
    /// let pool = TaggedPool::new(64);
    ///
    /// assert_eq!(pool.len(), 0);
    ///
    /// let _first = pool.allocate(1);
    /// let _second = pool.allocate(2);
    ///
    /// assert_eq!(pool.len(), 2);
    /// ```
    #[must_use]
    pub fn len(&self) -> usize {
        let pool = self.inner.lock().expect(ERR_POISONED_LOCK);
        pool.len()
    }

    /// Whether no pages are currently assigned to any tag.
    ///
    /// An empty pool may still hold recyclable pages in its free queue.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let pool = self.inner.lock().expect(ERR_POISONED_LOCK);
        pool.is_empty()
    }

    /// The total number of pages this pool has created over its lifetime.
    ///
    /// Pages are never destroyed before the pool itself, so this equals
    /// `len() + free_page_count()` at all times.
    #[must_use]
    pub fn capacity(&self) -> usize {
        let pool = self.inner.lock().expect(ERR_POISONED_LOCK);
        pool.capacity()
    }

    /// The number of pages currently waiting in the free queue for reuse.
    #[must_use]
    pub fn free_page_count(&self) -> usize {
        let pool = self.inner.lock().expect(ERR_POISONED_LOCK);
        pool.free_page_count()
    }

    /// The number of tags currently holding at least one page.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        let pool = self.inner.lock().expect(ERR_POISONED_LOCK);
        pool.tag_count()
    }

    /// The number of pages currently assigned to the given tag.
    ///
    /// Returns zero for tags that hold no pages, including tags never allocated from.
    #[must_use]
    pub fn page_count_of(&self, tag: u64) -> usize {
        let pool = self.inner.lock().expect(ERR_POISONED_LOCK);
        pool.page_count_of(tag)
    }

    /// Returns the layout used for every page in this pool.
    #[must_use]
    pub fn page_layout(&self) -> Layout {
        let pool = self.inner.lock().expect(ERR_POISONED_LOCK);
        pool.page_layout()
    }

    /// Returns the size of every page in this pool, in bytes.
    #[must_use]
    pub fn page_size(&self) -> usize {
        let pool = self.inner.lock().expect(ERR_POISONED_LOCK);
        pool.page_size()
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(TaggedPool: Send, Sync, Clone, std::fmt::Debug);

    #[test]
    fn clones_share_one_pool() {
        let pool = TaggedPool::new(64);
        let clone = pool.clone();

        let _page = pool.allocate(1);

        assert_eq!(clone.len(), 1);
        assert_eq!(clone.page_count_of(1), 1);

        clone.release_all(1);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn allocate_and_release_across_threads() {
        let pool = TaggedPool::new(128);

        let workers: Vec<_> = (0..4_u64)
            .map(|tag| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for _ in 0..16 {
                        let page = pool.allocate(tag);

                        unsafe {
                            page.ptr().cast::<u64>().write(tag);
                        }
                    }

                    pool.release_all(tag);
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(pool.len(), 0);
        assert_eq!(pool.tag_count(), 0);
        assert_eq!(pool.free_page_count(), pool.capacity());
    }

    #[test]
    fn pool_outlives_original_handle() {
        let pool = TaggedPool::new(64);
        let clone = pool.clone();

        let page = pool.allocate(1);
        drop(pool);

        // The clone keeps the pool - and the page - alive.
        unsafe {
            page.ptr().write(7);
            assert_eq!(page.ptr().read(), 7);
        }

        clone.release_all(1);
    }

    #[test]
    fn from_raw_pool_preserves_state() {
        let mut raw_pool = RawTaggedPool::new(64);
        raw_pool.reserve(3);
        let _page = raw_pool.allocate(1);

        let pool = TaggedPool::from(raw_pool);

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.free_page_count(), 2);
        assert_eq!(pool.capacity(), 3);
    }
}

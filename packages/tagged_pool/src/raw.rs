use std::alloc::{Layout, alloc, dealloc};
use std::collections::VecDeque;
use std::num::NonZero;
use std::ptr::NonNull;
use std::thread;

use foldhash::{HashMap, HashMapExt};
use new_zealand::nz;

use crate::{DropPolicy, PageRef, RawTaggedPoolBuilder};

/// Alignment of pages created through [`page_size()`][RawTaggedPoolBuilder::page_size].
///
/// Sixteen bytes satisfies every primitive scalar type, so callers that carve pages
/// into typed objects do not have to think about alignment in the common case. Callers
/// with stronger requirements (e.g. cache-line or OS-page alignment) specify a full
/// layout via [`page_layout()`][RawTaggedPoolBuilder::page_layout] instead.
pub(crate) const DEFAULT_PAGE_ALIGN: NonZero<usize> = nz!(16);

/// One page slot in the pool's arena.
///
/// The slot exclusively owns a single page allocation. The page memory itself is a
/// separate heap allocation, so page addresses stay stable while the arena grows.
/// Slots are created on demand and only deallocated when the pool is dropped.
#[derive(Debug)]
struct PageSlot {
    /// Address of the page allocation. Allocated in `new()` with the pool's page
    /// layout; deallocated exactly once, in the pool's `Drop` implementation.
    ptr: NonNull<u8>,
}

impl PageSlot {
    /// Allocates a fresh page with the given layout.
    ///
    /// # Panics
    ///
    /// Panics if the system cannot provide backing memory.
    #[must_use]
    fn new(page_layout: Layout) -> Self {
        // SAFETY: The pool guarantees the layout has non-zero size (asserted at
        // construction time), which is the only requirement of alloc().
        let ptr = NonNull::new(unsafe { alloc(page_layout) }).expect(
            "we do not intend to handle allocation failure as a real possibility - OOM results in panic",
        );

        Self { ptr }
    }

    #[must_use]
    fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }
}

/// A tag-scoped pool of fixed-size memory pages.
///
/// Callers allocate pages under a caller-chosen numeric tag and later release every
/// page under that tag in one bulk operation. Released pages are not returned to the
/// system - they enter a FIFO free queue and are recycled by later allocations, for
/// any tag. After warm-up, allocation is pure bookkeeping with no system allocator
/// involvement.
///
/// # Out of band access
///
/// The pool does not create or keep references to page contents. The only way to
/// access a page is via unsafe code through the pointer carried by its [`PageRef`].
/// The pool never reads, writes or synchronizes page contents.
///
/// # Resource usage
///
/// The pool only grows. Once a page is created it is retained and recycled until the
/// pool itself is dropped; there is deliberately no way to return individual pages to
/// the system. This trades peak memory headroom for allocation speed - use
/// [`reserve()`][Self::reserve] to pre-pay the warm-up cost.
///
/// # Example
///
/// ```
/// use tagged_pool::RawTaggedPool;
///
/// let mut pool = RawTaggedPool::new(4096);
///
/// // Allocate scratch pages under tag 1.
/// let first = pool.allocate(1);
/// let second = pool.allocate(1);
/// assert_eq!(pool.len(), 2);
///
/// // SAFETY: The pages were just allocated and nothing else accesses them.
/// unsafe { first.ptr().cast::<u64>().write(1) };
/// // SAFETY: As above.
/// unsafe { second.ptr().cast::<u64>().write(2) };
///
/// // Release everything under tag 1 in one call; the pages become recyclable.
/// pool.release_all(1);
/// assert_eq!(pool.len(), 0);
/// assert_eq!(pool.free_page_count(), 2);
/// ```
///
/// # Thread safety
///
/// This type is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]). It can be
/// moved between threads but cannot be shared between threads simultaneously. For
/// thread-safe pool operations, use [`TaggedPool`][crate::TaggedPool] instead.
#[derive(Debug)]
pub struct RawTaggedPool {
    /// Layout of every page in this pool, fixed at construction. Guaranteed to have
    /// non-zero size.
    page_layout: Layout,

    /// Arena of page slots. Grows on demand and never shrinks; slot indexes are
    /// stable for the pool's lifetime, which is what the tag chains and the free
    /// queue store.
    slots: Vec<PageSlot>,

    /// Pages currently assigned to a tag, as slot indexes in allocation order.
    /// A tag is present as a key if and only if it holds at least one page.
    /// We use foldhash for better performance with small hash tables.
    tags: HashMap<u64, Vec<usize>>,

    /// Slot indexes of pages not currently assigned to any tag. FIFO: `release_all`
    /// pushes in chain order at the back, `allocate` pops from the front, so pages
    /// are recycled in their original allocation order.
    free: VecDeque<usize>,

    /// Drop policy that determines how the pool handles still-assigned pages when
    /// it is dropped.
    drop_policy: DropPolicy,

    /// Number of pages currently assigned to tags. We track this explicitly to avoid
    /// summing across chains when calculating the length.
    used: usize,
}

impl RawTaggedPool {
    /// Creates a new `RawTaggedPool` with the given page size and default configuration.
    ///
    /// Pages get the default sixteen-byte alignment. For custom alignment or a custom
    /// drop policy, use [`RawTaggedPool::builder()`].
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is zero.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::RawTaggedPool;
    ///
    /// let mut pool = RawTaggedPool::new(4096);
    ///
    /// let page = pool.allocate(1);
    /// assert_eq!(page.size(), 4096);
    /// ```
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self::builder().page_size(page_size).build()
    }

    /// Creates a builder for configuring and constructing a [`RawTaggedPool`].
    ///
    /// A page size must be specified via `.page_size()` or `.page_layout()` before
    /// calling `.build()`; other settings are optional.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::{DropPolicy, RawTaggedPool};
    ///
    /// let pool = RawTaggedPool::builder()
    ///     .page_size(4096)
    ///     .drop_policy(DropPolicy::MustNotDropPages)
    ///     .build();
    /// ```
    pub fn builder() -> RawTaggedPoolBuilder {
        RawTaggedPoolBuilder::new()
    }

    /// Creates a new `RawTaggedPool` with the specified configuration.
    ///
    /// This method is used internally by the builder to construct the actual pool.
    ///
    /// # Panics
    ///
    /// Panics if the page layout has zero size.
    #[must_use]
    pub(crate) fn new_inner(page_layout: Layout, drop_policy: DropPolicy) -> Self {
        assert!(
            page_layout.size() > 0,
            "RawTaggedPool must have non-zero page size"
        );

        Self {
            page_layout,
            slots: Vec::new(),
            tags: HashMap::new(),
            free: VecDeque::new(),
            drop_policy,
            used: 0,
        }
    }

    /// Allocates one page under the given tag and returns a handle to it.
    ///
    /// The page comes from the front of the free queue when one is available;
    /// otherwise a fresh page is created. Either way it is appended to the tag's
    /// chain, so a tag's pages are ordered by allocation. Appending is O(1) -
    /// repeated allocation to one tag does not degrade.
    ///
    /// The returned handle stays valid (and the page address stable) until
    /// [`release_all()`][Self::release_all] is called for the tag or the pool is
    /// dropped. The page contents are uninitialized.
    ///
    /// # Panics
    ///
    /// Panics if a new page is needed and the system cannot provide backing memory.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::RawTaggedPool;
    ///
    /// let mut pool = RawTaggedPool::new(64);
    ///
    /// let page = pool.allocate(7);
    /// assert_eq!(page.tag(), 7);
    /// assert_eq!(pool.len(), 1);
    /// assert_eq!(pool.page_count_of(7), 1);
    /// ```
    #[inline]
    pub fn allocate(&mut self, tag: u64) -> PageRef {
        let slot_index = self
            .free
            .pop_front()
            .unwrap_or_else(|| self.create_slot());

        self.tags.entry(tag).or_default().push(slot_index);

        // Cannot overflow: every assigned page is backed by a distinct allocation,
        // so the count is bounded far below usize::MAX.
        self.used = self.used.wrapping_add(1);

        let slot = self
            .slots
            .get(slot_index)
            .expect("free queue and tag chains only contain indexes of existing slots");

        PageRef::new(slot.ptr(), self.page_layout, tag)
    }

    /// Releases every page assigned to the given tag in one bulk operation.
    ///
    /// The pages are pushed onto the free queue in their allocation order and the
    /// tag ceases to exist as far as the pool is concerned. Releasing a tag that
    /// holds no pages (never allocated, or already released) is a no-op - the
    /// operation is idempotent.
    ///
    /// Every [`PageRef`] previously returned for this tag is invalid as soon as this
    /// call returns. The pool cannot detect continued use of a stale handle; that is
    /// a caller obligation.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::RawTaggedPool;
    ///
    /// let mut pool = RawTaggedPool::new(64);
    ///
    /// let first = pool.allocate(1);
    /// let second = pool.allocate(1);
    ///
    /// pool.release_all(1);
    /// assert_eq!(pool.len(), 0);
    ///
    /// // Pages are recycled in their original allocation order, for any tag.
    /// assert_eq!(pool.allocate(2).ptr(), first.ptr());
    /// assert_eq!(pool.allocate(3).ptr(), second.ptr());
    ///
    /// // Releasing an unknown or already-released tag is a no-op.
    /// pool.release_all(1);
    /// pool.release_all(999);
    /// ```
    #[inline]
    pub fn release_all(&mut self, tag: u64) {
        let Some(chain) = self.tags.remove(&tag) else {
            return;
        };

        // Cannot underflow: every index in the chain was counted when appended.
        self.used = self.used.wrapping_sub(chain.len());

        // VecDeque::extend pushes to the back, preserving chain order for FIFO reuse.
        self.free.extend(chain);
    }

    /// Pre-creates pages so that at least `additional` allocations can be served
    /// from the free queue without touching the system allocator.
    ///
    /// Does nothing if the free queue already holds that many pages. Because the
    /// pool only grows, reserved pages remain with the pool until it is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the system cannot provide backing memory for a new page.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::RawTaggedPool;
    ///
    /// let mut pool = RawTaggedPool::new(4096);
    ///
    /// // Pay the allocation cost up front.
    /// pool.reserve(8);
    /// assert_eq!(pool.free_page_count(), 8);
    ///
    /// // This allocation recycles a reserved page instead of creating one.
    /// let _page = pool.allocate(1);
    /// assert_eq!(pool.free_page_count(), 7);
    /// assert_eq!(pool.capacity(), 8);
    /// ```
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub fn reserve(&mut self, additional: usize) {
        let missing = additional.saturating_sub(self.free.len());

        for _ in 0..missing {
            let index = self.create_slot();
            self.free.push_back(index);
        }
    }

    /// The number of pages currently assigned to tags.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::RawTaggedPool;
    ///
    /// let mut pool = RawTaggedPool::new(64);
    /// assert_eq!(pool.len(), 0);
    ///
    /// let _first = pool.allocate(1);
    /// let _second = pool.allocate(2);
    /// assert_eq!(pool.len(), 2);
    ///
    /// pool.release_all(1);
    /// assert_eq!(pool.len(), 1);
    /// ```
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Trivial counter accessor; the debug assert carries the logic.
    #[inline]
    pub fn len(&self) -> usize {
        debug_assert_eq!(
            self.used,
            self.tags.values().map(Vec::len).sum::<usize>(),
            "used-page counter diverged from the tag chains"
        );

        self.used
    }

    /// Whether no pages are currently assigned to any tag.
    ///
    /// An empty pool may still hold recyclable pages in its free queue.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// The total number of pages this pool has created over its lifetime.
    ///
    /// Pages are never destroyed before the pool itself, so this equals
    /// `len() + free_page_count()` at all times.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::RawTaggedPool;
    ///
    /// let mut pool = RawTaggedPool::new(64);
    ///
    /// let _page = pool.allocate(1);
    /// pool.release_all(1);
    ///
    /// // The released page is recycled, not destroyed.
    /// assert_eq!(pool.capacity(), 1);
    /// assert_eq!(pool.free_page_count(), 1);
    /// ```
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The number of pages currently waiting in the free queue for reuse.
    #[must_use]
    #[inline]
    pub fn free_page_count(&self) -> usize {
        self.free.len()
    }

    /// The number of tags currently holding at least one page.
    ///
    /// Tags with no pages do not exist as far as the pool is concerned, so this
    /// never counts released or never-used tags.
    #[must_use]
    #[inline]
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// The number of pages currently assigned to the given tag.
    ///
    /// Returns zero for tags that hold no pages, including tags never allocated from.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::RawTaggedPool;
    ///
    /// let mut pool = RawTaggedPool::new(64);
    ///
    /// let _first = pool.allocate(1);
    /// let _second = pool.allocate(1);
    ///
    /// assert_eq!(pool.page_count_of(1), 2);
    /// assert_eq!(pool.page_count_of(2), 0);
    /// ```
    #[must_use]
    #[inline]
    pub fn page_count_of(&self, tag: u64) -> usize {
        self.tags.get(&tag).map_or(0, Vec::len)
    }

    /// Returns the layout used for every page in this pool.
    #[must_use]
    #[inline]
    pub fn page_layout(&self) -> Layout {
        self.page_layout
    }

    /// Returns the size of every page in this pool, in bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use tagged_pool::RawTaggedPool;
    ///
    /// let pool = RawTaggedPool::new(4096);
    /// assert_eq!(pool.page_size(), 4096);
    /// ```
    #[must_use]
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_layout.size()
    }

    /// Creates a fresh page slot and returns its index in the arena.
    fn create_slot(&mut self) -> usize {
        let index = self.slots.len();
        self.slots.push(PageSlot::new(self.page_layout));
        index
    }
}

impl Drop for RawTaggedPool {
    fn drop(&mut self) {
        let had_assigned_pages = self.used != 0;

        for slot in &self.slots {
            // SAFETY: Each slot's allocation was created in PageSlot::new() with
            // self.page_layout, which has not changed since, and every slot appears
            // in the arena exactly once, so each page is deallocated exactly once.
            unsafe { dealloc(slot.ptr().as_ptr(), self.page_layout) };
        }

        // We do this check at the end so we clean up the memory first. As we are
        // going to panic anyway if something is wrong, there is little good to
        // expect for the app itself.
        //
        // If we are already panicking, we do not want to panic again because that
        // will simply obscure whatever the original panic was, leading to debug
        // difficulties.
        if !thread::panicking() && matches!(self.drop_policy, DropPolicy::MustNotDropPages) {
            assert!(
                !had_assigned_pages,
                "dropped a RawTaggedPool while tags still held pages - this is forbidden by DropPolicy::MustNotDropPages"
            );
        }
    }
}

// SAFETY: RawTaggedPool can exist on any thread, as it does not reference any
// thread-specific data. The NonNull pointers it holds refer to allocations it
// exclusively owns, and all structural access goes through &self/&mut self methods.
unsafe impl Send for RawTaggedPool {}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(RawTaggedPool: Send, std::fmt::Debug);
    assert_not_impl_any!(RawTaggedPool: Sync, Clone);

    #[test]
    fn new_pool_is_empty() {
        let pool = RawTaggedPool::new(64);

        assert_eq!(pool.len(), 0);
        assert!(pool.is_empty());
        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.free_page_count(), 0);
        assert_eq!(pool.tag_count(), 0);
    }

    #[test]
    fn allocate_creates_page_when_free_queue_is_empty() {
        let mut pool = RawTaggedPool::new(64);

        let page = pool.allocate(1);

        assert_eq!(page.size(), 64);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.capacity(), 1);
        assert_eq!(pool.free_page_count(), 0);
    }

    #[test]
    fn allocate_appends_in_order() {
        let mut pool = RawTaggedPool::new(64);

        let pages: Vec<_> = (0..4).map(|_| pool.allocate(1)).collect();

        assert_eq!(pool.page_count_of(1), 4);

        // All pages are distinct.
        for (i, a) in pages.iter().enumerate() {
            for b in pages.iter().skip(i + 1) {
                assert_ne!(a.ptr(), b.ptr());
            }
        }
    }

    #[test]
    fn release_all_recycles_in_fifo_order() {
        let mut pool = RawTaggedPool::new(64);

        let first = pool.allocate(1);
        let second = pool.allocate(1);
        let third = pool.allocate(1);

        pool.release_all(1);
        assert_eq!(pool.free_page_count(), 3);

        // Reuse happens in original allocation order, regardless of the new tags.
        assert_eq!(pool.allocate(10).ptr(), first.ptr());
        assert_eq!(pool.allocate(20).ptr(), second.ptr());
        assert_eq!(pool.allocate(10).ptr(), third.ptr());

        // Only once the queue is drained does a fresh page appear.
        let fresh = pool.allocate(10);
        assert_ne!(fresh.ptr(), first.ptr());
        assert_ne!(fresh.ptr(), second.ptr());
        assert_ne!(fresh.ptr(), third.ptr());
        assert_eq!(pool.capacity(), 4);
    }

    #[test]
    fn release_all_unknown_tag_is_noop() {
        let mut pool = RawTaggedPool::new(64);

        let _page = pool.allocate(1);

        pool.release_all(2);

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.free_page_count(), 0);
        assert_eq!(pool.tag_count(), 1);
    }

    #[test]
    fn release_all_is_idempotent() {
        let mut pool = RawTaggedPool::new(64);

        let _first = pool.allocate(1);
        let _second = pool.allocate(1);

        pool.release_all(1);
        let free_after_first = pool.free_page_count();
        let capacity_after_first = pool.capacity();

        pool.release_all(1);

        assert_eq!(pool.free_page_count(), free_after_first);
        assert_eq!(pool.capacity(), capacity_after_first);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn release_all_removes_the_tag() {
        let mut pool = RawTaggedPool::new(64);

        let _first = pool.allocate(1);
        let _second = pool.allocate(2);
        assert_eq!(pool.tag_count(), 2);

        pool.release_all(1);

        assert_eq!(pool.tag_count(), 1);
        assert_eq!(pool.page_count_of(1), 0);
        assert_eq!(pool.page_count_of(2), 1);
    }

    #[test]
    fn tags_are_isolated() {
        let mut pool = RawTaggedPool::new(64);

        let a1 = pool.allocate(1);
        let b1 = pool.allocate(2);
        let a2 = pool.allocate(1);

        assert_eq!(pool.page_count_of(1), 2);
        assert_eq!(pool.page_count_of(2), 1);

        pool.release_all(1);

        // Tag 2 is untouched; tag 1's pages recycle in order.
        assert_eq!(pool.page_count_of(2), 1);
        assert_eq!(pool.allocate(3).ptr(), a1.ptr());
        assert_eq!(pool.allocate(3).ptr(), a2.ptr());

        // b1's page was never freed, so it never entered the queue.
        assert_ne!(a1.ptr(), b1.ptr());
    }

    #[test]
    fn reserve_fills_the_free_queue() {
        let mut pool = RawTaggedPool::new(64);

        pool.reserve(5);

        assert_eq!(pool.free_page_count(), 5);
        assert_eq!(pool.capacity(), 5);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn reserve_with_sufficient_free_pages_does_nothing() {
        let mut pool = RawTaggedPool::new(64);

        pool.reserve(5);
        pool.reserve(3);

        assert_eq!(pool.free_page_count(), 5);
        assert_eq!(pool.capacity(), 5);
    }

    #[test]
    fn reserve_tops_up_a_partially_drained_queue() {
        let mut pool = RawTaggedPool::new(64);

        pool.reserve(2);
        let _first = pool.allocate(1);

        pool.reserve(4);

        assert_eq!(pool.free_page_count(), 4);
        assert_eq!(pool.capacity(), 5);
    }

    #[test]
    fn reserved_pages_are_recycled_before_new_ones() {
        let mut pool = RawTaggedPool::new(64);

        pool.reserve(2);
        let capacity_before = pool.capacity();

        let _first = pool.allocate(1);
        let _second = pool.allocate(1);

        assert_eq!(pool.capacity(), capacity_before);
    }

    #[test]
    fn pages_use_the_configured_layout() {
        let layout = Layout::from_size_align(128, 64).unwrap();
        let mut pool = RawTaggedPool::builder().page_layout(layout).build();

        assert_eq!(pool.page_layout(), layout);
        assert_eq!(pool.page_size(), 128);

        let page = pool.allocate(1);
        assert_eq!(page.ptr().addr().get() % 64, 0);
    }

    #[test]
    fn default_alignment_holds_for_plain_page_size() {
        let mut pool = RawTaggedPool::new(100);

        let page = pool.allocate(1);
        assert_eq!(page.ptr().addr().get() % DEFAULT_PAGE_ALIGN.get(), 0);
    }

    #[test]
    fn drop_with_assigned_pages_is_fine_by_default() {
        let mut pool = RawTaggedPool::new(64);

        let _first = pool.allocate(1);
        let _second = pool.allocate(2);

        drop(pool);
    }

    #[test]
    #[should_panic(expected = "forbidden by DropPolicy::MustNotDropPages")]
    fn must_not_drop_pages_panics_when_tags_remain() {
        let mut pool = RawTaggedPool::builder()
            .page_size(64)
            .drop_policy(DropPolicy::MustNotDropPages)
            .build();

        let _page = pool.allocate(1);

        drop(pool);
    }

    #[test]
    fn must_not_drop_pages_accepts_released_pool() {
        let mut pool = RawTaggedPool::builder()
            .page_size(64)
            .drop_policy(DropPolicy::MustNotDropPages)
            .build();

        let _page = pool.allocate(1);
        pool.release_all(1);

        // Free-queue pages never trigger the policy.
        drop(pool);
    }

    #[test]
    fn page_contents_survive_while_tag_is_live() {
        let mut pool = RawTaggedPool::new(64);

        let page = pool.allocate(1);
        unsafe {
            page.ptr().cast::<u64>().write(0x0123_4567_89AB_CDEF);
        }

        // Unrelated pool activity must not disturb the page.
        let _other = pool.allocate(2);
        pool.reserve(4);
        pool.release_all(2);

        unsafe {
            assert_eq!(page.ptr().cast::<u64>().read(), 0x0123_4567_89AB_CDEF);
        }
    }
}

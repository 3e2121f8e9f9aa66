use std::alloc::Layout;
use std::cell::Cell;
use std::marker::PhantomData;

use crate::raw::DEFAULT_PAGE_ALIGN;
use crate::{DropPolicy, RawTaggedPool};

/// Builder for creating an instance of [`RawTaggedPool`].
///
/// [`RawTaggedPool`] requires the page size to be specified at construction time.
/// Use `.page_size()` for plain byte counts with the default sixteen-byte alignment,
/// or `.page_layout()` to control both size and alignment.
///
/// The page size is mandatory, whereas other settings are optional.
///
/// # Examples
///
/// Using a plain page size:
///
/// ```
/// use tagged_pool::RawTaggedPool;
///
/// let pool = RawTaggedPool::builder().page_size(4096).build();
/// ```
///
/// Using a full layout for cache-line-aligned pages:
///
/// ```
/// use std::alloc::Layout;
///
/// use tagged_pool::RawTaggedPool;
///
/// let layout = Layout::from_size_align(4096, 64).unwrap();
/// let pool = RawTaggedPool::builder().page_layout(layout).build();
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) and can be safely transferred between
/// threads, allowing pool configuration to happen on different threads than where
/// the pool is used. However, it is not thread-safe ([`Sync`]) as it contains
/// mutable configuration state.
#[derive(Debug)]
#[must_use]
pub struct RawTaggedPoolBuilder {
    page_layout: Option<Layout>,
    drop_policy: DropPolicy,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl RawTaggedPoolBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            page_layout: None,
            drop_policy: DropPolicy::default(),
            _not_sync: PhantomData,
        }
    }

    /// Sets the size in bytes of every page in the pool.
    ///
    /// Pages get the default sixteen-byte alignment, which satisfies every primitive
    /// scalar type. Use [`page_layout()`][Self::page_layout] when a specific alignment
    /// is required. If both are called, the last call wins.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is zero or rounds up beyond `isize::MAX`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagged_pool::RawTaggedPool;
    ///
    /// let pool = RawTaggedPool::builder().page_size(4096).build();
    /// ```
    #[inline]
    pub fn page_size(mut self, page_size: usize) -> Self {
        assert!(page_size > 0, "RawTaggedPool must have non-zero page size");

        let layout = Layout::from_size_align(page_size, DEFAULT_PAGE_ALIGN.get())
            .expect("page size rounded up to the default alignment must not overflow isize");

        self.page_layout = Some(layout);
        self
    }

    /// Sets the full memory layout of every page in the pool.
    ///
    /// This controls both the page size and the page alignment. If both this and
    /// [`page_size()`][Self::page_size] are called, the last call wins.
    ///
    /// # Panics
    ///
    /// Panics if the layout has zero size.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::alloc::Layout;
    ///
    /// use tagged_pool::RawTaggedPool;
    ///
    /// // Pages aligned to a typical OS page boundary.
    /// let layout = Layout::from_size_align(16 * 1024, 4096).unwrap();
    /// let pool = RawTaggedPool::builder().page_layout(layout).build();
    /// ```
    #[inline]
    pub fn page_layout(mut self, layout: Layout) -> Self {
        assert!(
            layout.size() > 0,
            "RawTaggedPool must have non-zero page size"
        );

        self.page_layout = Some(layout);
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how to treat
    /// pages still assigned to tags when the pool is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagged_pool::{DropPolicy, RawTaggedPool};
    ///
    /// let pool = RawTaggedPool::builder()
    ///     .page_size(4096)
    ///     .drop_policy(DropPolicy::MustNotDropPages)
    ///     .build();
    /// ```
    #[inline]
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the pool with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if no page size was specified.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagged_pool::RawTaggedPool;
    ///
    /// let pool = RawTaggedPool::builder().page_size(4096).build();
    /// ```
    #[must_use]
    pub fn build(self) -> RawTaggedPool {
        let page_layout = self
            .page_layout
            .expect("a page size is required - call page_size() or page_layout() before build()");

        RawTaggedPool::new_inner(page_layout, self.drop_policy)
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(RawTaggedPoolBuilder: Send, std::fmt::Debug);
    assert_not_impl_any!(RawTaggedPoolBuilder: Sync);

    #[test]
    fn new_builder_has_defaults() {
        let builder = RawTaggedPool::builder();

        assert!(builder.page_layout.is_none());
        assert_eq!(builder.drop_policy, DropPolicy::default());
    }

    #[test]
    fn page_size_sets_default_aligned_layout() {
        let builder = RawTaggedPool::builder().page_size(4096);

        let layout = builder.page_layout.unwrap();
        assert_eq!(layout.size(), 4096);
        assert_eq!(layout.align(), DEFAULT_PAGE_ALIGN.get());
    }

    #[test]
    fn page_layout_overrides_page_size() {
        let layout = Layout::from_size_align(128, 64).unwrap();

        let builder = RawTaggedPool::builder().page_size(4096).page_layout(layout);

        assert_eq!(builder.page_layout, Some(layout));
    }

    #[test]
    fn drop_policy_is_recorded() {
        let builder = RawTaggedPool::builder()
            .page_size(64)
            .drop_policy(DropPolicy::MustNotDropPages);

        assert_eq!(builder.drop_policy, DropPolicy::MustNotDropPages);
    }

    #[test]
    fn build_creates_pool_with_configuration() {
        let pool = RawTaggedPool::builder().page_size(512).build();

        assert_eq!(pool.page_size(), 512);
        assert!(pool.is_empty());
    }

    #[test]
    #[should_panic(expected = "non-zero page size")]
    fn zero_page_size_panics() {
        let _builder = RawTaggedPool::builder().page_size(0);
    }

    #[test]
    #[should_panic(expected = "a page size is required")]
    fn build_without_page_size_panics() {
        let _pool = RawTaggedPool::builder().build();
    }
}

use std::alloc::Layout;

use crate::{DropPolicy, RawTaggedPoolBuilder, TaggedPool};

/// Builder for creating an instance of [`TaggedPool`].
///
/// This is the thread-safe counterpart of
/// [`RawTaggedPoolBuilder`][crate::RawTaggedPoolBuilder] and accepts the same
/// configuration. The page size is mandatory, whereas other settings are optional.
///
/// # Examples
///
/// ```
/// use tagged_pool::{DropPolicy, TaggedPool};
///
/// // Page size with default alignment.
/// let pool = TaggedPool::builder().page_size(4096).build();
///
/// // With a custom drop policy.
/// let pool = TaggedPool::builder()
///     .page_size(4096)
///     .drop_policy(DropPolicy::MustNotDropPages)
///     .build();
/// ```
#[derive(Debug)]
#[must_use]
pub struct TaggedPoolBuilder {
    inner: RawTaggedPoolBuilder,
}

impl TaggedPoolBuilder {
    pub(crate) fn new() -> Self {
        Self {
            inner: RawTaggedPoolBuilder::new(),
        }
    }

    /// Sets the size in bytes of every page in the pool.
    ///
    /// Pages get the default sixteen-byte alignment. Use
    /// [`page_layout()`][Self::page_layout] when a specific alignment is required.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is zero or rounds up beyond `isize::MAX`.
    #[inline]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.inner = self.inner.page_size(page_size);
        self
    }

    /// Sets the full memory layout of every page in the pool.
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
    /// use tagged_pool::TaggedPool;
    ///
    /// let layout = Layout::from_size_align(4096, 64).unwrap();
    /// let pool = TaggedPool::builder().page_layout(layout).build();
    /// ```
    #[inline]
    pub fn page_layout(mut self, layout: Layout) -> Self {
        self.inner = self.inner.page_layout(layout);
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how to treat
    /// pages still assigned to tags when the pool is dropped.
    #[inline]
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.inner = self.inner.drop_policy(policy);
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
    /// use tagged_pool::TaggedPool;
    ///
    /// let pool = TaggedPool::builder().page_size(4096).build();
    /// ```
    #[must_use]
    pub fn build(self) -> TaggedPool {
        TaggedPool::from(self.inner.build())
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(TaggedPoolBuilder: Send, std::fmt::Debug);
    assert_not_impl_any!(TaggedPoolBuilder: Sync);

    #[test]
    fn build_creates_configured_pool() {
        let pool = TaggedPool::builder().page_size(256).build();

        assert_eq!(pool.page_size(), 256);
        assert!(pool.is_empty());
    }

    #[test]
    #[should_panic(expected = "a page size is required")]
    fn build_without_page_size_panics() {
        let _pool = TaggedPool::builder().build();
    }
}

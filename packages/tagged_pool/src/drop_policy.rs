/// Determines how the pool treats pages still assigned to a tag when the pool is dropped.
///
/// By default, the pool reclaims all pages when it is dropped, whether or not their
/// tags were released first.
///
/// # Examples
///
/// ```
/// use tagged_pool::{DropPolicy, RawTaggedPool};
///
/// // The drop policy is set at pool creation time.
/// let pool = RawTaggedPool::builder()
///     .page_size(4096)
///     .drop_policy(DropPolicy::MustNotDropPages)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool will reclaim all pages when it is dropped, including pages whose tags
    /// were never released. This is the default.
    #[default]
    MayDropPages,

    /// The pool will panic if any tag still holds pages when the pool is dropped.
    ///
    /// This may be valuable if callers are known to hold [`PageRef`][crate::PageRef]
    /// handles in long-lived data structures, where dropping the pool underneath them
    /// would leave dangling pointers behind. Pages sitting in the free queue never
    /// trigger this policy.
    MustNotDropPages,
}

//! Deferred resolution wrapper.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::container::Container;
use crate::error::DiResult;
use crate::traits::Resolver;

/// A service reference that resolves on first use.
///
/// `Lazy<T>` captures the resolver view it was created from (container plus
/// ambient scope chain) and resolves `T` against it the first time [`get`]
/// is called; later calls return the cached instance. Cloning is cheap and
/// clones share the cached instance.
///
/// Declared as a dependency with [`Dependency::lazy`], a lazy edge also
/// breaks dependency cycles: the target is not compiled into the parent's
/// plan at all.
///
/// [`get`]: Lazy::get
/// [`Dependency::lazy`]: crate::Dependency::lazy
///
/// # Examples
///
/// ```
/// use ferric_di::{Container, Resolver, Reuse};
///
/// struct Expensive {
///     id: u32,
/// }
///
/// let container = Container::new();
/// container
///     .register_delegate::<Expensive, _>(Reuse::Singleton, |_| Ok(Expensive { id: 7 }))
///     .unwrap();
///
/// let lazy = container.resolve_lazy::<Expensive>();
/// assert!(!lazy.is_resolved());
/// assert_eq!(lazy.get().unwrap().id, 7);
/// assert!(lazy.is_resolved());
/// ```
pub struct Lazy<T: Send + Sync + 'static> {
    inner: Arc<LazyInner<T>>,
}

struct LazyInner<T: Send + Sync + 'static> {
    resolver: Container,
    tag: Option<&'static str>,
    cell: OnceCell<Arc<T>>,
}

impl<T: Send + Sync + 'static> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Send + Sync + 'static> Lazy<T> {
    pub(crate) fn new(resolver: Container, tag: Option<&'static str>) -> Self {
        Self { inner: Arc::new(LazyInner { resolver, tag, cell: OnceCell::new() }) }
    }

    /// Resolves the service on first call, returning the cached instance
    /// afterwards. Resolution failures are not cached; a later call retries.
    pub fn get(&self) -> DiResult<Arc<T>> {
        self.inner
            .cell
            .get_or_try_init(|| match self.inner.tag {
                Some(tag) => self.inner.resolver.resolve_tagged::<T>(tag),
                None => self.inner.resolver.resolve::<T>(),
            })
            .cloned()
    }

    /// Whether the underlying service has been resolved yet.
    pub fn is_resolved(&self) -> bool {
        self.inner.cell.get().is_some()
    }
}

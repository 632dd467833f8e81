//! Reuse policies controlling instance caching.

/// Selects which scope, if any, caches a resolved instance.
///
/// The policy is consulted while a resolution plan is compiled: every
/// non-transient factory gets a scope-binding node wrapped around its
/// construction, and the binding decides where the slot lives at run time.
///
/// # Examples
///
/// ```rust
/// use ferric_di::{Container, Resolver, Reuse};
/// use std::sync::Arc;
///
/// struct Config { url: String }
///
/// let container = Container::new();
/// container.register_delegate::<Config, _>(Reuse::Singleton, |_| {
///     Ok(Config { url: "postgres://localhost".to_string() })
/// }).unwrap();
///
/// let a = container.resolve::<Config>().unwrap();
/// let b = container.resolve::<Config>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b)); // Same instance
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reuse {
    /// New instance per resolution, never cached.
    Transient,
    /// Single instance per container, cached in the root scope.
    ///
    /// Shared across every scope opened from the same container; child
    /// containers have their own root scope and therefore their own
    /// singletons.
    Singleton,
    /// Single instance per scope, cached in the innermost open scope.
    ///
    /// Resolving without an open scope fails with `NoMatchingScope`.
    Scoped,
    /// Like [`Reuse::Scoped`] but binds to the nearest enclosing scope with
    /// the given name, walking the parent chain.
    ScopedTo(&'static str),
    /// Single instance per top-level resolve call.
    ///
    /// The instance is shared by everything constructed within one
    /// `resolve` call tree and torn down when that call returns, unless the
    /// caller retains the scope explicitly.
    InResolution,
}

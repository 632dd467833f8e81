//! Error types for the dependency injection container.

use std::fmt;

/// Dependency injection errors
///
/// Every failure raised by the container carries one of these categories
/// together with enough context (type names, tags, dependency chains) to
/// read the failure without a debugger.
///
/// # Examples
///
/// ```rust
/// use ferric_di::{Container, DiError, Resolver};
///
/// let container = Container::new();
/// match container.resolve::<String>() {
///     Err(DiError::Unresolved { service, .. }) => {
///         assert_eq!(service, "alloc::string::String");
///     }
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone)]
pub enum DiError {
    /// No registration (and no fallback resolver) matched the service key
    Unresolved {
        service: &'static str,
        tag: Option<&'static str>,
    },
    /// Constructor selection failed: several constructors without a
    /// selector, no constructor at all, or a selector matching none
    AmbiguousConstructor {
        implementation: &'static str,
        count: usize,
    },
    /// A service key repeated in its own dependency chain (includes the chain)
    Cyclic { chain: Vec<&'static str> },
    /// A scope was used after it was disposed
    ScopeDisposed { scope: Option<&'static str> },
    /// The container itself was disposed
    ContainerDisposed,
    /// A scoped reuse found no open scope to bind to
    NoMatchingScope { required: Option<&'static str> },
    /// Registration rejected by the `Fail` conflict policy
    RegistrationConflict {
        service: &'static str,
        tag: Option<&'static str>,
    },
    /// Type-erasure downcast failed
    TypeMismatch { expected: &'static str },
    /// Maximum resolution depth exceeded
    DepthExceeded { depth: usize },
}

impl fmt::Display for DiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiError::Unresolved { service, tag } => match tag {
                Some(tag) => write!(f, "Service not resolved: {} (tag \"{}\")", service, tag),
                None => write!(f, "Service not resolved: {}", service),
            },
            DiError::AmbiguousConstructor { implementation, count } => write!(
                f,
                "{} has {} constructors and no selector was given",
                implementation, count
            ),
            DiError::Cyclic { chain } => {
                write!(f, "Cyclic dependency: {}", chain.join(" -> "))
            }
            DiError::ScopeDisposed { scope } => match scope {
                Some(name) => write!(f, "Scope \"{}\" is disposed", name),
                None => write!(f, "Scope is disposed"),
            },
            DiError::ContainerDisposed => write!(f, "Container is disposed"),
            DiError::NoMatchingScope { required } => match required {
                Some(name) => write!(f, "No open scope named \"{}\"", name),
                None => write!(f, "No open scope to bind to"),
            },
            DiError::RegistrationConflict { service, tag } => match tag {
                Some(tag) => {
                    write!(f, "Already registered: {} (tag \"{}\")", service, tag)
                }
                None => write!(f, "Already registered: {}", service),
            },
            DiError::TypeMismatch { expected } => write!(f, "Type mismatch for: {}", expected),
            DiError::DepthExceeded { depth } => write!(f, "Max depth {} exceeded", depth),
        }
    }
}

impl std::error::Error for DiError {}

/// Result type for DI operations
///
/// A convenience alias for `Result<T, DiError>` used throughout ferric-di.
pub type DiResult<T> = Result<T, DiError>;

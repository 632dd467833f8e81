//! # ferric-di
//!
//! Snapshot-based, lock-free dependency injection for Rust with compiled
//! resolution plans.
//!
//! ## Features
//!
//! - **Immutable registry snapshots**: registration installs a new snapshot
//!   with a pointer swap; resolutions never block and never observe a
//!   half-written registry
//! - **Compiled plans**: each resolution is compiled once per registry
//!   snapshot (candidate ranking, constructor selection, cycle detection)
//!   and replayed from a cache afterwards
//! - **Reuse policies**: transient, singleton, scoped, named-scope and
//!   per-resolve instance sharing
//! - **Deterministic disposal**: scopes release tracked instances in reverse
//!   creation order, and a disposed scope fails every later access, even
//!   from threads that captured it earlier
//! - **Open generics**: constructor-marker families with explicit type
//!   shapes stand in for runtime generics reification
//!
//! ## Quick Start
//!
//! ```rust
//! use ferric_di::{Container, Resolver, Reuse};
//! use std::sync::Arc;
//!
//! // Define your services
//! struct Database {
//!     connection_string: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! // Register services
//! let container = Container::new();
//! container.register_instance(Database {
//!     connection_string: "postgres://localhost".to_string(),
//! }).unwrap();
//! container.register_delegate::<UserService, _>(Reuse::Transient, |ctx| {
//!     Ok(UserService {
//!         db: ctx.resolve::<Database>()?,
//!     })
//! }).unwrap();
//!
//! // Resolve
//! let user_service = container.resolve::<UserService>().unwrap();
//! assert_eq!(user_service.db.connection_string, "postgres://localhost");
//! ```
//!
//! ## Reuse policies
//!
//! - **Transient**: created fresh on every resolution
//! - **Singleton**: created once, shared container-wide via the root scope
//! - **Scoped / ScopedTo(name)**: shared within one open scope (or the named
//!   ancestor scope)
//! - **InResolution**: shared within one top-level resolve call tree
//!
//! ## Scopes
//!
//! ```rust
//! use ferric_di::{Container, Resolver, Reuse};
//! use std::sync::Arc;
//!
//! struct RequestState(u32);
//!
//! let container = Container::new();
//! let counter = Arc::new(std::sync::atomic::AtomicU32::new(0));
//! container.register_delegate::<RequestState, _>(Reuse::Scoped, move |_| {
//!     Ok(RequestState(counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed)))
//! }).unwrap();
//!
//! let request_a = container.open_scope(None);
//! let request_b = container.open_scope(None);
//!
//! let a = request_a.resolve::<RequestState>().unwrap();
//! let b = request_b.resolve::<RequestState>().unwrap();
//! // Different scopes get different instances
//! assert_ne!(a.0, b.0);
//! ```

// Module declarations
pub mod container;
pub mod descriptor;
pub mod error;
pub mod key;
pub mod lazy;
pub mod map;
pub mod observer;
pub mod reuse;
pub mod scope;
pub mod traits;

// Internal modules
mod factory;
mod internal;
mod plan;
mod registry;
mod request;

// Re-export core types
pub use container::{Container, ResolveContext, Rules, ScopedContainer, TypeRegistration, UnknownService};
pub use descriptor::{Args, Dependency, Injectable, TypeDescriptor, TypeDescriptorBuilder};
pub use error::{DiError, DiResult};
pub use factory::{ClosedDelegate, FactoryKind, IfConflict};
pub use key::{ServiceKey, Shaped, TypeArg, TypeShape};
pub use lazy::Lazy;
pub use map::{Enumerate, PersistentMap};
pub use observer::{DiObserver, LoggingObserver};
pub use request::RequestInfo;
pub use reuse::Reuse;
pub use scope::Scope;
pub use traits::{Dispose, Resolver};

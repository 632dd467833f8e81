//! Factory recipes and registration metadata.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::container::ResolveContext;
use crate::descriptor::{AnyArc, TypeDescriptor};
use crate::error::DiResult;
use crate::request::RequestInfo;
use crate::reuse::Reuse;

pub(crate) type DelegateFn = Arc<dyn Fn(&ResolveContext) -> DiResult<AnyArc> + Send + Sync>;
pub(crate) type ConditionFn = Arc<dyn Fn(&RequestInfo<'_>) -> bool + Send + Sync>;
pub(crate) type TrackFn =
    Arc<dyn Fn(&AnyArc) -> Option<Box<dyn FnOnce() + Send>> + Send + Sync>;

// Factory ids are allocated process-wide so every snapshot, plan and scope
// slot agrees on them, including across child containers.
static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_factory_id() -> u64 {
    NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed)
}

/// The kind of recipe behind a registration, usable as an unregistration
/// filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryKind {
    /// A pre-built instance.
    Instance,
    /// A delegate closure invoked with a resolve context.
    Delegate,
    /// Constructor injection through a type descriptor.
    Constructed,
}

/// What to do when a registration lands on an occupied service key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IfConflict {
    /// Keep both; the newest wins single resolution, collections see all.
    #[default]
    Append,
    /// Drop the previous registrations for the key.
    Replace,
    /// Keep the previous registrations, ignore the new one.
    Keep,
    /// Reject with `RegistrationConflict`.
    Fail,
}

pub(crate) enum Recipe {
    Instance(AnyArc),
    Delegate(DelegateFn),
    Constructed { descriptor: Arc<TypeDescriptor>, selector: Option<&'static str> },
}

#[derive(Default)]
pub(crate) struct Setup {
    pub(crate) condition: Option<ConditionFn>,
    pub(crate) track_dispose: Option<TrackFn>,
    pub(crate) inject_members: bool,
}

/// An immutable implementation recipe plus its reuse and setup metadata.
///
/// Re-registration never mutates a factory; it installs a new registry
/// snapshot, so plans compiled against a replaced factory stay valid for
/// whoever still holds them.
pub(crate) struct Factory {
    pub(crate) id: u64,
    /// Scope slot identity. Equal to `id` for registered factories; factories
    /// synthesized per closed shape derive a stable slot from the family id
    /// and the requested key instead, so recompiles land on the same slot.
    pub(crate) slot: u64,
    pub(crate) reuse: Reuse,
    pub(crate) recipe: Recipe,
    pub(crate) setup: Setup,
}

impl Factory {
    pub(crate) fn new(reuse: Reuse, recipe: Recipe) -> Self {
        let id = next_factory_id();
        Self { id, slot: id, reuse, recipe, setup: Setup::default() }
    }

    pub(crate) fn kind(&self) -> FactoryKind {
        match self.recipe {
            Recipe::Instance(_) => FactoryKind::Instance,
            Recipe::Delegate(_) => FactoryKind::Delegate,
            Recipe::Constructed { .. } => FactoryKind::Constructed,
        }
    }
}

/// A closed factory produced by an open-generic family for one concrete
/// shape.
///
/// # Examples
///
/// ```
/// use ferric_di::ClosedDelegate;
///
/// struct Parser<T>(std::marker::PhantomData<T>);
///
/// let closed = ClosedDelegate::new(|_ctx| Ok(Parser::<u32>(std::marker::PhantomData)));
/// # let _ = closed;
/// ```
pub struct ClosedDelegate {
    pub(crate) delegate: DelegateFn,
}

impl ClosedDelegate {
    pub fn new<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolveContext) -> DiResult<T> + Send + Sync + 'static,
    {
        Self { delegate: Arc::new(move |ctx| Ok(Arc::new(f(ctx)?) as AnyArc)) }
    }
}

//! Container façade: registration, plan caching and resolution entry points.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use once_cell::unsync::OnceCell;
use smallvec::SmallVec;

use crate::descriptor::{AnyArc, Injectable};
use crate::error::{DiError, DiResult};
use crate::factory::{
    ClosedDelegate, ConditionFn, DelegateFn, Factory, FactoryKind, IfConflict, Recipe, TrackFn,
};
use crate::key::{ServiceKey, TypeShape};
use crate::map::PersistentMap;
use crate::observer::DiObserver;
use crate::plan::{compile_collection, compile_service, Binding, Plan};
use crate::registry::{OpenFamily, Snapshot};
use crate::request::{Request, RequestInfo, MAX_DEPTH};
use crate::reuse::Reuse;
use crate::scope::Scope;
use crate::traits::{Dispose, Resolver};

pub(crate) type UnknownServiceFn =
    Arc<dyn Fn(&ServiceKey) -> Option<UnknownService> + Send + Sync>;

/// A service synthesized by an unknown-service fallback resolver.
///
/// # Examples
///
/// ```
/// use ferric_di::{Container, Resolver, Reuse, Rules, UnknownService};
///
/// #[derive(Default)]
/// struct StubMetrics;
///
/// let rules = Rules::new().with_unknown_service(|key| {
///     // Synthesize a stub for the one abstraction the tests never register.
///     (key.type_name().ends_with("StubMetrics"))
///         .then(|| UnknownService::delegate(Reuse::Singleton, |_| Ok(StubMetrics)))
/// });
///
/// let container = Container::with_rules(rules);
/// assert!(container.resolve::<StubMetrics>().is_ok());
/// ```
pub struct UnknownService {
    pub(crate) reuse: Reuse,
    pub(crate) delegate: DelegateFn,
}

impl UnknownService {
    pub fn delegate<T, F>(reuse: Reuse, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolveContext) -> DiResult<T> + Send + Sync + 'static,
    {
        Self { reuse, delegate: Arc::new(move |ctx| Ok(Arc::new(f(ctx)?) as AnyArc)) }
    }
}

/// Container-wide behavior settings, fixed at construction.
#[derive(Clone, Default)]
pub struct Rules {
    pub(crate) if_conflict: IfConflict,
    pub(crate) lock_scope_slots: bool,
    pub(crate) unknown_services: Vec<UnknownServiceFn>,
    pub(crate) observers: Vec<Arc<dyn DiObserver>>,
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default conflict policy for registrations that do not pick one.
    pub fn with_conflict_policy(mut self, policy: IfConflict) -> Self {
        self.if_conflict = policy;
        self
    }

    /// Serializes scope slot fill with a per-scope lock, trading contention
    /// for at-most-once factory invocation per slot.
    pub fn with_slot_locking(mut self) -> Self {
        self.lock_scope_slots = true;
        self
    }

    /// Adds a fallback consulted when no registration matches a key; used
    /// for example to synthesize stubs for unregistered abstractions.
    pub fn with_unknown_service<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&ServiceKey) -> Option<UnknownService> + Send + Sync + 'static,
    {
        self.unknown_services.push(Arc::new(fallback));
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DiObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

/// Everything the plan compiler needs from the container.
pub(crate) struct CompileEnv<'e> {
    pub(crate) snapshot: &'e Snapshot,
    pub(crate) rules: &'e Rules,
}

type CachedPlan = (u64, Arc<Plan>);

/// Compiled-plan cache tied to a registry snapshot version.
///
/// Entries remember the snapshot version they were compiled against; a hit
/// against a stale version drops the whole cache, so any mutation
/// invalidates every cached plan.
struct PlanCache {
    plans: ArcSwap<PersistentMap<ServiceKey, CachedPlan>>,
}

impl PlanCache {
    fn new() -> Self {
        Self { plans: ArcSwap::from_pointee(PersistentMap::new()) }
    }

    fn lookup(&self, version: u64, key: &ServiceKey) -> Option<Arc<Plan>> {
        let plans = self.plans.load();
        match plans.try_find(key.hash_value(), key) {
            Some((cached_version, plan)) if *cached_version == version => Some(Arc::clone(plan)),
            Some(_) => {
                self.plans.store(Arc::new(PersistentMap::new()));
                None
            }
            None => None,
        }
    }

    fn insert(&self, version: u64, key: &ServiceKey, plan: Arc<Plan>) {
        self.plans
            .rcu(|plans| plans.add_or_update(key.hash_value(), key.clone(), (version, Arc::clone(&plan))));
    }
}

struct ContainerInner {
    snapshot: ArcSwap<Snapshot>,
    /// Next snapshot version to assign; strictly greater than any published
    /// snapshot's version.
    version: AtomicU64,
    root_scope: Arc<Scope>,
    rules: Rules,
    disposed: AtomicBool,
}

thread_local! {
    static ACTIVE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Guard against runaway re-entrant resolution (for example a deferred
/// handle resolved from inside the factory that created it).
struct DepthGuard;

impl DepthGuard {
    fn enter() -> DiResult<Self> {
        ACTIVE_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= MAX_DEPTH {
                return Err(DiError::DepthExceeded { depth: current });
            }
            depth.set(current + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        ACTIVE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// The dependency injection container.
///
/// A `Container` is a cheap-to-clone view over shared state: the current
/// registry snapshot, the root scope backing singletons, and a plan cache.
/// The read path is lock-free; registration installs a whole new snapshot
/// with a pointer swap. One writer concurrent with any number of readers is
/// safe; concurrent writers race and the last snapshot wins.
///
/// # Examples
///
/// ```
/// use ferric_di::{Container, Resolver, Reuse};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// let container = Container::new();
/// container.register_instance(Database { url: "postgres://localhost".to_string() }).unwrap();
/// container.register_delegate::<UserService, _>(Reuse::Transient, |ctx| {
///     Ok(UserService { db: ctx.resolve::<Database>()? })
/// }).unwrap();
///
/// let service = container.resolve::<UserService>().unwrap();
/// assert_eq!(service.db.url, "postgres://localhost");
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
    cache: Arc<PlanCache>,
    ambient: Option<Arc<Scope>>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::with_rules(Rules::default())
    }

    pub fn with_rules(rules: Rules) -> Self {
        let root_scope = Scope::root(rules.lock_scope_slots);
        Self {
            inner: Arc::new(ContainerInner {
                snapshot: ArcSwap::from_pointee(Snapshot::empty()),
                version: AtomicU64::new(1),
                root_scope,
                rules,
                disposed: AtomicBool::new(false),
            }),
            cache: Arc::new(PlanCache::new()),
            ambient: None,
        }
    }

    // ----- Registration -----

    /// Registers a pre-built instance, shared by every resolution.
    pub fn register_instance<T: Send + Sync + 'static>(&self, value: T) -> DiResult<()> {
        self.install(ServiceKey::of::<T>(), instance_factory(value), None)
    }

    /// Registers a pre-built instance under a tag.
    pub fn register_instance_tagged<T: Send + Sync + 'static>(
        &self,
        tag: &'static str,
        value: T,
    ) -> DiResult<()> {
        self.install(ServiceKey::tagged::<T>(tag), instance_factory(value), None)
    }

    /// Registers a delegate factory for `T`.
    pub fn register_delegate<T, F>(&self, reuse: Reuse, f: F) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolveContext) -> DiResult<T> + Send + Sync + 'static,
    {
        self.install(ServiceKey::of::<T>(), delegate_factory(reuse, f, None), None)
    }

    /// Registers a delegate factory for `T` under a tag.
    pub fn register_delegate_tagged<T, F>(
        &self,
        tag: &'static str,
        reuse: Reuse,
        f: F,
    ) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolveContext) -> DiResult<T> + Send + Sync + 'static,
    {
        self.install(ServiceKey::tagged::<T>(tag), delegate_factory(reuse, f, None), None)
    }

    /// Registers a delegate factory whose instances are tracked for disposal
    /// by the scope that caches them (the ambient scope for transients).
    pub fn register_disposable_delegate<T, F>(&self, reuse: Reuse, f: F) -> DiResult<()>
    where
        T: Dispose + Send + Sync + 'static,
        F: Fn(&ResolveContext) -> DiResult<T> + Send + Sync + 'static,
    {
        self.install(
            ServiceKey::of::<T>(),
            delegate_factory(reuse, f, Some(track_dispose::<T>())),
            None,
        )
    }

    /// Registers `T` for constructor injection through its descriptor.
    pub fn register_type<T: Injectable>(&self, reuse: Reuse) -> DiResult<()> {
        self.register_type_with::<T>(reuse).register()
    }

    /// Starts a registration of `T` with non-default options. Finish with
    /// [`TypeRegistration::register`].
    pub fn register_type_with<T: Injectable>(&self, reuse: Reuse) -> TypeRegistration<'_, T> {
        TypeRegistration {
            container: self,
            reuse,
            tag: None,
            policy: None,
            selector: None,
            inject_members: false,
            condition: None,
            track: None,
            _marker: PhantomData,
        }
    }

    /// Registers an open-generic family keyed by the constructor marker `C`.
    ///
    /// The provider receives each requested closed shape and returns a
    /// closed factory when it can unify the arguments. Closed registrations
    /// always outrank factories produced here.
    pub fn register_open_generic<C, P>(&self, reuse: Reuse, provider: P) -> DiResult<()>
    where
        C: 'static,
        P: Fn(&TypeShape) -> Option<ClosedDelegate> + Send + Sync + 'static,
    {
        let family = Arc::new(OpenFamily {
            id: crate::factory::next_factory_id(),
            reuse,
            provider: Arc::new(move |shape| provider(shape).map(|closed| closed.delegate)),
        });
        self.mutate(|snapshot, version| {
            Ok(snapshot.with_open_registered(version, TypeId::of::<C>(), Arc::clone(&family)))
        })
    }

    /// Removes the registration of `T` (the tagged entry when `tag` is
    /// given, the untagged one otherwise), optionally filtered by recipe
    /// kind. Combine with [`without_cache`](Container::without_cache) to
    /// guarantee no stale compiled plan survives.
    pub fn unregister<T: 'static>(
        &self,
        tag: Option<&'static str>,
        kind: Option<FactoryKind>,
    ) -> DiResult<()> {
        let key = match tag {
            Some(tag) => ServiceKey::tagged::<T>(tag),
            None => ServiceKey::of::<T>(),
        };
        self.mutate(|snapshot, version| Ok(snapshot.with_unregistered(version, &key, kind)))
    }

    /// Removes the open-generic family registered under `C`.
    pub fn unregister_open<C: 'static>(&self) -> DiResult<()> {
        self.mutate(|snapshot, version| {
            Ok(snapshot.with_open_unregistered(version, &TypeId::of::<C>()))
        })
    }

    pub(crate) fn install(
        &self,
        key: ServiceKey,
        factory: Factory,
        policy: Option<IfConflict>,
    ) -> DiResult<()> {
        let policy = policy.unwrap_or(self.inner.rules.if_conflict);
        let factory = Arc::new(factory);
        self.mutate(|snapshot, version| {
            snapshot.with_registered(version, key.clone(), Arc::clone(&factory), policy)
        })
    }

    fn mutate(&self, build: impl Fn(&Snapshot, u64) -> DiResult<Snapshot>) -> DiResult<()> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(DiError::ContainerDisposed);
        }
        let current = self.inner.snapshot.load_full();
        let version = self.inner.version.fetch_add(1, Ordering::Relaxed);
        let next = build(&current, version)?;
        // Writers may race here; the last stored snapshot wins.
        self.inner.snapshot.store(Arc::new(next));
        Ok(())
    }

    // ----- Views and lifecycle -----

    /// Opens a scope, optionally named, nested under this view's ambient
    /// scope. The returned handle disposes the scope when dropped.
    pub fn open_scope(&self, name: Option<&'static str>) -> ScopedContainer {
        let parent = self.ambient.clone().unwrap_or_else(|| Arc::clone(&self.inner.root_scope));
        let scope = Scope::child(&parent, name, self.inner.rules.lock_scope_slots);
        for observer in &self.inner.rules.observers {
            observer.scope_opened(name);
        }
        ScopedContainer {
            container: Container {
                inner: Arc::clone(&self.inner),
                cache: Arc::clone(&self.cache),
                ambient: Some(Arc::clone(&scope)),
            },
            scope,
        }
    }

    /// A child container sharing this container's registrations by
    /// reference. Registrations in either container never affect the other,
    /// and the child has its own root scope, so its singletons and their
    /// disposal are fully isolated.
    pub fn child_container(&self) -> Container {
        Container {
            inner: Arc::new(ContainerInner {
                snapshot: ArcSwap::new(self.inner.snapshot.load_full()),
                version: AtomicU64::new(self.inner.version.load(Ordering::Relaxed)),
                root_scope: Scope::root(self.inner.rules.lock_scope_slots),
                rules: self.inner.rules.clone(),
                disposed: AtomicBool::new(false),
            }),
            cache: Arc::new(PlanCache::new()),
            ambient: None,
        }
    }

    /// The same container with an empty plan cache, so nothing resolved
    /// through the view can replay a previously compiled plan.
    pub fn without_cache(&self) -> Container {
        Container {
            inner: Arc::clone(&self.inner),
            cache: Arc::new(PlanCache::new()),
            ambient: self.ambient.clone(),
        }
    }

    /// Disposes the container: the root scope releases its tracked
    /// instances in reverse creation order and every later resolution fails
    /// with `ContainerDisposed`. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.root_scope.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    #[cfg(feature = "diagnostics")]
    pub fn to_debug_string(&self) -> String {
        use std::fmt::Write as _;
        let snapshot = self.inner.snapshot.load_full();
        let mut out = String::from("=== Container Registrations ===\n");
        for (key, list) in snapshot.entries() {
            for factory in list.iter() {
                let _ = writeln!(out, "  {}: {:?} ({:?})", key, factory.reuse, factory.kind());
            }
        }
        out
    }

    // ----- Resolution -----

    fn check_alive(&self) -> DiResult<()> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(DiError::ContainerDisposed);
        }
        if let Some(scope) = &self.ambient {
            if scope.is_disposed() {
                return Err(DiError::ScopeDisposed { scope: scope.name() });
            }
        }
        Ok(())
    }

    pub(crate) fn plan_for(
        &self,
        key: &ServiceKey,
        shape: Option<&TypeShape>,
    ) -> DiResult<Arc<Plan>> {
        let snapshot = self.inner.snapshot.load_full();
        if let Some(plan) = self.cache.lookup(snapshot.version, key) {
            return Ok(plan);
        }
        let request = Request::root(key);
        let env = CompileEnv { snapshot: &snapshot, rules: &self.inner.rules };
        let plan = Arc::new(compile_service(&env, key, shape, &request)?);
        self.cache.insert(snapshot.version, key, Arc::clone(&plan));
        Ok(plan)
    }

    pub(crate) fn resolve_erased(
        &self,
        key: &ServiceKey,
        shape: Option<&TypeShape>,
    ) -> DiResult<AnyArc> {
        self.check_alive()?;
        let _depth = DepthGuard::enter()?;
        let observers = &self.inner.rules.observers;
        if observers.is_empty() {
            return self.resolve_pinned(key, shape);
        }
        for observer in observers {
            observer.resolving(key);
        }
        let started = Instant::now();
        let result = self.resolve_pinned(key, shape);
        for observer in observers {
            observer.resolved(key, started.elapsed());
        }
        result
    }

    fn resolve_pinned(&self, key: &ServiceKey, shape: Option<&TypeShape>) -> DiResult<AnyArc> {
        let plan = self.plan_for(key, shape)?;
        let ctx = ResolveContext::new(self.clone());
        let result = plan.run(&ctx);
        ctx.teardown();
        result
    }

    pub(crate) fn resolve_erased_many(&self, key: &ServiceKey) -> DiResult<Vec<AnyArc>> {
        self.check_alive()?;
        let _depth = DepthGuard::enter()?;
        let snapshot = self.inner.snapshot.load_full();
        let env = CompileEnv { snapshot: &snapshot, rules: &self.inner.rules };
        let request = Request::root(key);
        let items = compile_collection(&env, key, &request)?;
        let ctx = ResolveContext::new(self.clone());
        let mut out = Vec::with_capacity(items.len());
        let mut run = || -> DiResult<()> {
            for item in &items {
                out.push(item.run(&ctx)?);
            }
            Ok(())
        };
        let result = run();
        ctx.teardown();
        result.map(|_| out)
    }

    /// Resolves `T` and hands the caller ownership of the per-resolve scope
    /// instead of tearing it down, so `InResolution`-reused dependencies of
    /// the returned instance stay alive until the handle is disposed.
    pub fn resolve_retaining_scope<T: Send + Sync + 'static>(
        &self,
    ) -> DiResult<(Arc<T>, ScopedContainer)> {
        self.check_alive()?;
        let _depth = DepthGuard::enter()?;
        let key = ServiceKey::of::<T>();
        let plan = self.plan_for(&key, None)?;
        let ctx = ResolveContext::new(self.clone());
        match plan.run(&ctx) {
            Ok(any) => {
                let value = any.downcast::<T>().map_err(|_| DiError::TypeMismatch {
                    expected: std::any::type_name::<T>(),
                })?;
                let scope = ctx.take_resolution().unwrap_or_else(|| {
                    let parent =
                        self.ambient.clone().unwrap_or_else(|| Arc::clone(&self.inner.root_scope));
                    Scope::resolution_child(&parent, self.inner.rules.lock_scope_slots)
                });
                let handle = ScopedContainer {
                    container: Container {
                        inner: Arc::clone(&self.inner),
                        cache: Arc::clone(&self.cache),
                        ambient: Some(Arc::clone(&scope)),
                    },
                    scope,
                };
                Ok((value, handle))
            }
            Err(error) => {
                ctx.teardown();
                Err(error)
            }
        }
    }

    /// Injects declared members into an existing instance
    /// (`ResolvePropertiesAndFields` in other containers).
    pub fn resolve_members<T: Injectable>(&self, target: &mut T) -> DiResult<()> {
        self.check_alive()?;
        let _depth = DepthGuard::enter()?;
        let descriptor = T::descriptor();
        let ctx = ResolveContext::new(self.clone());
        let mut run = || -> DiResult<()> {
            for member in &descriptor.members {
                let value = ctx.resolve_key(&member.dep.key, None)?;
                (member.inject)(&mut *target, value)?;
            }
            Ok(())
        };
        let result = run();
        ctx.teardown();
        result
    }
}

fn instance_factory<T: Send + Sync + 'static>(value: T) -> Factory {
    Factory::new(Reuse::Singleton, Recipe::Instance(Arc::new(value)))
}

fn delegate_factory<T, F>(reuse: Reuse, f: F, track: Option<TrackFn>) -> Factory
where
    T: Send + Sync + 'static,
    F: Fn(&ResolveContext) -> DiResult<T> + Send + Sync + 'static,
{
    let mut factory = Factory::new(
        reuse,
        Recipe::Delegate(Arc::new(move |ctx| Ok(Arc::new(f(ctx)?) as AnyArc))),
    );
    factory.setup.track_dispose = track;
    factory
}

fn track_dispose<T: Dispose + Send + Sync + 'static>() -> TrackFn {
    Arc::new(|any: &AnyArc| {
        any.clone()
            .downcast::<T>()
            .ok()
            .map(|arc| Box::new(move || arc.dispose()) as Box<dyn FnOnce() + Send>)
    })
}

/// In-progress registration of an [`Injectable`] type. Finish with
/// [`register`](TypeRegistration::register).
///
/// # Examples
///
/// ```
/// use ferric_di::{Args, Container, Injectable, Resolver, Reuse, TypeDescriptor};
/// use once_cell::sync::OnceCell;
/// use std::sync::Arc;
///
/// struct Repo;
///
/// impl Injectable for Repo {
///     fn descriptor() -> Arc<TypeDescriptor> {
///         static D: OnceCell<Arc<TypeDescriptor>> = OnceCell::new();
///         D.get_or_init(|| {
///             TypeDescriptor::builder("Repo")
///                 .constructor("new", vec![], |_args: Args| Ok(Repo))
///                 .build()
///         })
///         .clone()
///     }
/// }
///
/// let container = Container::new();
/// container
///     .register_type_with::<Repo>(Reuse::Singleton)
///     .tagged("primary")
///     .register()
///     .unwrap();
///
/// assert!(container.resolve_tagged::<Repo>("primary").is_ok());
/// ```
pub struct TypeRegistration<'c, T: Injectable> {
    container: &'c Container,
    reuse: Reuse,
    tag: Option<&'static str>,
    policy: Option<IfConflict>,
    selector: Option<&'static str>,
    inject_members: bool,
    condition: Option<ConditionFn>,
    track: Option<TrackFn>,
    _marker: PhantomData<fn() -> T>,
}

impl<'c, T: Injectable> TypeRegistration<'c, T> {
    /// Discriminates the registration with a tag.
    pub fn tagged(mut self, tag: &'static str) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Picks a constructor by name instead of requiring a single one.
    pub fn with_constructor(mut self, name: &'static str) -> Self {
        self.selector = Some(name);
        self
    }

    /// Also injects the descriptor's declared members after construction.
    pub fn with_members(mut self) -> Self {
        self.inject_members = true;
        self
    }

    /// Restricts the registration to requests matching the predicate.
    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&RequestInfo<'_>) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Tracks created instances for disposal by their caching scope.
    pub fn disposable(mut self) -> Self
    where
        T: Dispose,
    {
        self.track = Some(track_dispose::<T>());
        self
    }

    /// Overrides the container's default conflict policy for this key.
    pub fn on_conflict(mut self, policy: IfConflict) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn register(self) -> DiResult<()> {
        let mut factory = Factory::new(
            self.reuse,
            Recipe::Constructed { descriptor: T::descriptor(), selector: self.selector },
        );
        factory.setup.condition = self.condition;
        factory.setup.inject_members = self.inject_members;
        factory.setup.track_dispose = self.track;
        let key = match self.tag {
            Some(tag) => ServiceKey::tagged::<T>(tag),
            None => ServiceKey::of::<T>(),
        };
        self.container.install(key, factory, self.policy)
    }
}

impl Resolver for Container {
    fn resolve_key(
        &self,
        key: &ServiceKey,
        shape: Option<&TypeShape>,
    ) -> DiResult<Arc<dyn Any + Send + Sync>> {
        self.resolve_erased(key, shape)
    }

    fn resolve_key_many(&self, key: &ServiceKey) -> DiResult<Vec<Arc<dyn Any + Send + Sync>>> {
        self.resolve_erased_many(key)
    }

    fn view(&self) -> Container {
        self.clone()
    }
}

/// Scoped resolver handle returned by `open_scope`.
///
/// Resolutions through the handle see the scope as ambient: `Scoped` and
/// `ScopedTo` reuses bind to it (or to a named ancestor). Dropping the
/// handle disposes the scope, which releases tracked instances in reverse
/// creation order and deterministically fails every later access through
/// the scope, including from threads that captured a view earlier.
///
/// # Examples
///
/// ```
/// use ferric_di::{Container, Resolver, Reuse};
/// use std::sync::Arc;
///
/// struct RequestId(u64);
///
/// let container = Container::new();
/// let counter = Arc::new(std::sync::atomic::AtomicU64::new(0));
/// container.register_delegate::<RequestId, _>(Reuse::Scoped, move |_| {
///     Ok(RequestId(counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed)))
/// }).unwrap();
///
/// let request = container.open_scope(None);
/// let a = request.resolve::<RequestId>().unwrap();
/// let b = request.resolve::<RequestId>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b)); // Shared within the scope
///
/// let other = container.open_scope(None);
/// let c = other.resolve::<RequestId>().unwrap();
/// assert!(!Arc::ptr_eq(&a, &c)); // Sibling scopes are isolated
/// ```
pub struct ScopedContainer {
    container: Container,
    scope: Arc<Scope>,
}

impl ScopedContainer {
    /// Opens a child scope nested under this one.
    pub fn open_scope(&self, name: Option<&'static str>) -> ScopedContainer {
        self.container.open_scope(name)
    }

    pub fn scope_name(&self) -> Option<&'static str> {
        self.scope.name()
    }

    pub fn is_disposed(&self) -> bool {
        self.scope.is_disposed()
    }

    /// Disposes the scope now instead of waiting for drop. Idempotent.
    pub fn dispose(&self) {
        if self.scope.is_disposed() {
            return;
        }
        self.scope.dispose();
        for observer in &self.container.inner.rules.observers {
            observer.scope_disposed(self.scope.name());
        }
    }
}

impl Drop for ScopedContainer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Resolver for ScopedContainer {
    fn resolve_key(
        &self,
        key: &ServiceKey,
        shape: Option<&TypeShape>,
    ) -> DiResult<Arc<dyn Any + Send + Sync>> {
        self.container.resolve_erased(key, shape)
    }

    fn resolve_key_many(&self, key: &ServiceKey) -> DiResult<Vec<Arc<dyn Any + Send + Sync>>> {
        self.container.resolve_erased_many(key)
    }

    fn view(&self) -> Container {
        self.container.clone()
    }
}

/// Resolution context passed to delegate factories and plan execution.
///
/// Carries the container view, the lazily created per-resolve scope, and the
/// stack of delegate invocations used to detect cycles that only appear at
/// run time. Nested resolutions through the context stay inside the same
/// top-level call tree (they share its resolution scope).
pub struct ResolveContext {
    container: Container,
    resolution: OnceCell<Arc<Scope>>,
    owner: RefCell<Option<Arc<Scope>>>,
    stack: RefCell<SmallVec<[ServiceKey; 8]>>,
}

impl ResolveContext {
    pub(crate) fn new(container: Container) -> Self {
        Self {
            container,
            resolution: OnceCell::new(),
            owner: RefCell::new(None),
            stack: RefCell::new(SmallVec::new()),
        }
    }

    /// Locates the scope a bind node fills.
    pub(crate) fn locate(&self, binding: &Binding) -> DiResult<Arc<Scope>> {
        match binding {
            Binding::Root => Ok(Arc::clone(&self.container.inner.root_scope)),
            Binding::Ambient => self
                .container
                .ambient
                .clone()
                .ok_or(DiError::NoMatchingScope { required: None }),
            Binding::Named(name) => self
                .container
                .ambient
                .as_ref()
                .and_then(|scope| scope.find_named(name))
                .ok_or(DiError::NoMatchingScope { required: Some(*name) }),
            Binding::Resolution => {
                if let Some(scope) = self.resolution.get() {
                    return Ok(Arc::clone(scope));
                }
                // A retained resolution scope serving as ambient is reused
                // instead of opening a second one under it.
                if let Some(ambient) = &self.container.ambient {
                    if ambient.is_resolution() {
                        return Ok(Arc::clone(ambient));
                    }
                }
                Ok(Arc::clone(self.resolution.get_or_init(|| {
                    let parent = self
                        .container
                        .ambient
                        .clone()
                        .unwrap_or_else(|| Arc::clone(&self.container.inner.root_scope));
                    Scope::resolution_child(&parent, self.container.inner.rules.lock_scope_slots)
                })))
            }
        }
    }

    /// Runs `f` with `scope` recorded as the scope being filled, so
    /// transient disposables created inside bind to it.
    pub(crate) fn with_owner<R>(&self, scope: Arc<Scope>, f: impl FnOnce() -> R) -> R {
        let previous = self.owner.replace(Some(scope));
        let result = f();
        self.owner.replace(previous);
        result
    }

    /// Registers a tracked disposable with the scope currently being filled,
    /// falling back to the ambient scope and then the root scope.
    pub(crate) fn track(&self, track: &TrackFn, value: &AnyArc) -> DiResult<()> {
        if let Some(hook) = track(value) {
            let scope = self
                .owner
                .borrow()
                .clone()
                .or_else(|| self.container.ambient.clone())
                .unwrap_or_else(|| Arc::clone(&self.container.inner.root_scope));
            scope.push_disposer(hook)?;
        }
        Ok(())
    }

    /// Wraps a delegate invocation with the run-time cycle guard.
    pub(crate) fn guarded(
        &self,
        key: &ServiceKey,
        f: impl FnOnce() -> DiResult<AnyArc>,
    ) -> DiResult<AnyArc> {
        self.stack.borrow_mut().push(key.clone());
        let result = f();
        self.stack.borrow_mut().pop();
        result
    }

    pub(crate) fn teardown(&self) {
        if let Some(scope) = self.resolution.get() {
            scope.dispose();
        }
    }

    pub(crate) fn take_resolution(&self) -> Option<Arc<Scope>> {
        self.resolution.get().cloned()
    }
}

impl Resolver for ResolveContext {
    fn resolve_key(
        &self,
        key: &ServiceKey,
        shape: Option<&TypeShape>,
    ) -> DiResult<Arc<dyn Any + Send + Sync>> {
        {
            let stack = self.stack.borrow();
            if stack.iter().any(|active| active == key) {
                let mut chain: Vec<&'static str> =
                    stack.iter().map(|active| active.type_name()).collect();
                chain.push(key.type_name());
                return Err(DiError::Cyclic { chain });
            }
        }
        self.container.check_alive()?;
        let plan = self.container.plan_for(key, shape)?;
        plan.run(self)
    }

    fn resolve_key_many(&self, key: &ServiceKey) -> DiResult<Vec<Arc<dyn Any + Send + Sync>>> {
        self.container.check_alive()?;
        let snapshot = self.container.inner.snapshot.load_full();
        let env = CompileEnv { snapshot: &snapshot, rules: &self.container.inner.rules };
        let request = Request::root(key);
        let items = compile_collection(&env, key, &request)?;
        let mut out = Vec::with_capacity(items.len());
        for item in &items {
            out.push(item.run(self)?);
        }
        Ok(out)
    }

    fn view(&self) -> Container {
        let ambient = self.owner.borrow().clone().or_else(|| self.container.ambient.clone());
        Container {
            inner: Arc::clone(&self.container.inner),
            cache: Arc::clone(&self.container.cache),
            ambient,
        }
    }
}

//! Construction plans: compilation and execution.
//!
//! A plan is the executable form of one resolution: a tree of nodes produced
//! by walking the registry from the requested key. Compilation does the
//! expensive work once per key per snapshot (candidate ranking, constructor
//! selection, cycle detection); execution is an interpreted walk against the
//! ambient scope chain.

use std::sync::Arc;

use crate::container::{CompileEnv, ResolveContext};
use crate::descriptor::{AdaptFn, AnyArc, Args, DefaultFn, DepKind, Dependency, MakeFn, TypeDescriptor, WrapFn};
use crate::error::{DiError, DiResult};
use crate::factory::{DelegateFn, Factory, Recipe, TrackFn};
use crate::key::{hash_pair, ServiceKey, TypeShape};
use crate::request::{Request, MAX_DEPTH};
use crate::reuse::Reuse;

// Slot salt for factories synthesized by unknown-service fallbacks, keeping
// their scope slots stable across recompiles.
const FALLBACK_SLOT_SALT: u64 = 0x0fa11bac;

pub(crate) enum Plan {
    /// A pre-built instance.
    Constant(AnyArc),
    /// Construct through a descriptor constructor with argument plans.
    Construct {
        descriptor: Arc<TypeDescriptor>,
        ctor: usize,
        args: Vec<ArgStep>,
        members: Vec<(usize, ArgStep)>,
        track: Option<TrackFn>,
    },
    /// Invoke a delegate factory; cycles through delegates are caught at run
    /// time by the context's resolve stack.
    Delegate {
        key: ServiceKey,
        run: DelegateFn,
        track: Option<TrackFn>,
    },
    /// Get-or-add the inner plan's product into a located scope at a slot.
    ScopeBind {
        binding: Binding,
        slot: u64,
        track: Option<TrackFn>,
        inner: Arc<Plan>,
    },
    /// All implementations of a service, registration order, no dedup.
    Collection { items: Vec<Plan>, adapt: AdaptFn },
}

/// One argument position of a constructor (or member).
pub(crate) enum ArgStep {
    Plan(Plan),
    /// Optional dependency that resolved: wrap the value into `Some`.
    Wrap { some: WrapFn, inner: Box<Plan> },
    /// Optional dependency that did not resolve: produce `None`.
    Missing { none: DefaultFn },
    /// Deferred dependency: build the `Lazy` handle, resolve nothing now.
    Defer { make: MakeFn },
}

/// Which scope a scope-bind node fills at run time.
pub(crate) enum Binding {
    Root,
    Ambient,
    Named(&'static str),
    Resolution,
}

fn binding_for(reuse: Reuse) -> Option<Binding> {
    match reuse {
        Reuse::Transient => None,
        Reuse::Singleton => Some(Binding::Root),
        Reuse::Scoped => Some(Binding::Ambient),
        Reuse::ScopedTo(name) => Some(Binding::Named(name)),
        Reuse::InResolution => Some(Binding::Resolution),
    }
}

/// Compiles a plan for `key`: candidate lookup, specificity ranking,
/// recursive dependency compilation, reuse wrapping.
pub(crate) fn compile_service(
    env: &CompileEnv<'_>,
    key: &ServiceKey,
    shape: Option<&TypeShape>,
    request: &Request<'_>,
) -> DiResult<Plan> {
    // Rank is (closedness, tag exactness, registration order); the highest
    // tuple wins, so closed beats open-generic, an exact tag beats the
    // untagged fallback, and among equals the newest registration wins.
    let mut best: Option<((u8, u8, u64), Arc<Factory>)> = None;
    let info = request.info();
    let mut consider = |rank: (u8, u8, u64), factory: Arc<Factory>| {
        if let Some(condition) = &factory.setup.condition {
            if !condition(&info) {
                return;
            }
        }
        if best.as_ref().map_or(true, |(r, _)| rank > *r) {
            best = Some((rank, factory));
        }
    };

    if let Some(list) = env.snapshot.find(key) {
        for factory in list.iter() {
            consider((1, 1, factory.id), Arc::clone(factory));
        }
    }
    if key.tag().is_some() {
        let fallback = key.untagged();
        if let Some(list) = env.snapshot.find(&fallback) {
            for factory in list.iter() {
                consider((1, 0, factory.id), Arc::clone(factory));
            }
        }
    }
    if let Some(shape) = shape {
        if let Some(families) = env.snapshot.find_open(&shape.ctor_id) {
            for family in families.iter() {
                if let Some(delegate) = (family.provider)(shape) {
                    let mut factory = Factory::new(family.reuse, Recipe::Delegate(delegate));
                    // Stable slot per (family, closed key) so recompiles and
                    // cache-free views share the same cached instance.
                    factory.slot = hash_pair(family.id, key.hash_value());
                    consider((0, 1, family.id), Arc::new(factory));
                }
            }
        }
    }

    if let Some((_, factory)) = best {
        return compile_factory(env, key, &factory, request);
    }

    for fallback in &env.rules.unknown_services {
        if let Some(unknown) = fallback(key) {
            let mut factory = Factory::new(unknown.reuse, Recipe::Delegate(unknown.delegate));
            factory.slot = hash_pair(FALLBACK_SLOT_SALT, key.hash_value());
            return compile_factory(env, key, &Arc::new(factory), request);
        }
    }

    Err(DiError::Unresolved { service: key.type_name(), tag: key.tag() })
}

/// Compiles the plan for one chosen factory, wrapping it with its reuse.
pub(crate) fn compile_factory(
    env: &CompileEnv<'_>,
    key: &ServiceKey,
    factory: &Arc<Factory>,
    request: &Request<'_>,
) -> DiResult<Plan> {
    let transient = matches!(factory.reuse, Reuse::Transient);
    let node_track = if transient { factory.setup.track_dispose.clone() } else { None };

    let core = match &factory.recipe {
        // Instances are owned by their registrar; nothing to scope or track.
        Recipe::Instance(value) => return Ok(Plan::Constant(value.clone())),
        Recipe::Delegate(run) => {
            Plan::Delegate { key: key.clone(), run: run.clone(), track: node_track }
        }
        Recipe::Constructed { descriptor, selector } => {
            let ctor = select_constructor(descriptor, *selector)?;
            let params = &descriptor.constructors[ctor].params;
            let mut args = Vec::with_capacity(params.len());
            for dep in params {
                args.push(compile_dependency(env, dep, request)?);
            }
            let mut members = Vec::new();
            if factory.setup.inject_members {
                for (index, member) in descriptor.members.iter().enumerate() {
                    members.push((index, compile_dependency(env, &member.dep, request)?));
                }
            }
            Plan::Construct {
                descriptor: Arc::clone(descriptor),
                ctor,
                args,
                members,
                track: node_track,
            }
        }
    };

    Ok(match binding_for(factory.reuse) {
        None => core,
        Some(binding) => Plan::ScopeBind {
            binding,
            slot: factory.slot,
            track: factory.setup.track_dispose.clone(),
            inner: Arc::new(core),
        },
    })
}

fn select_constructor(
    descriptor: &TypeDescriptor,
    selector: Option<&'static str>,
) -> DiResult<usize> {
    match selector {
        Some(name) => descriptor
            .constructors
            .iter()
            .position(|c| c.name == name)
            .ok_or(DiError::AmbiguousConstructor {
                implementation: descriptor.type_name(),
                count: descriptor.constructors.len(),
            }),
        None => match descriptor.constructors.len() {
            1 => Ok(0),
            count => Err(DiError::AmbiguousConstructor {
                implementation: descriptor.type_name(),
                count,
            }),
        },
    }
}

fn compile_dependency(
    env: &CompileEnv<'_>,
    dep: &Dependency,
    parent: &Request<'_>,
) -> DiResult<ArgStep> {
    match &dep.kind {
        // Deferred edges resolve later from a fresh chain; nothing to walk.
        DepKind::Lazy { make } => Ok(ArgStep::Defer { make: make.clone() }),
        DepKind::Single => {
            let child = guard_chain(dep, parent)?;
            Ok(ArgStep::Plan(compile_service(env, &dep.key, None, &child)?))
        }
        DepKind::Optional { some, none } => {
            let child = guard_chain(dep, parent)?;
            match compile_service(env, &dep.key, None, &child) {
                Ok(plan) => Ok(ArgStep::Wrap { some: some.clone(), inner: Box::new(plan) }),
                Err(DiError::Unresolved { .. }) => Ok(ArgStep::Missing { none: none.clone() }),
                Err(other) => Err(other),
            }
        }
        DepKind::Collection { adapt } => {
            let child = guard_chain(dep, parent)?;
            let items = compile_collection(env, &dep.key, &child)?;
            Ok(ArgStep::Plan(Plan::Collection { items, adapt: adapt.clone() }))
        }
    }
}

/// Fails fast on a repeated key in the chain, otherwise extends it.
fn guard_chain<'a>(dep: &'a Dependency, parent: &'a Request<'a>) -> DiResult<Request<'a>> {
    if parent.depth >= MAX_DEPTH {
        return Err(DiError::DepthExceeded { depth: parent.depth });
    }
    if parent.contains(&dep.key) {
        let mut chain = parent.chain_names();
        chain.push(dep.key.type_name());
        return Err(DiError::Cyclic { chain });
    }
    Ok(parent.child(&dep.key))
}

/// Compiles one plan per registration of the service type, tagged or not,
/// in registration order.
pub(crate) fn compile_collection(
    env: &CompileEnv<'_>,
    key: &ServiceKey,
    request: &Request<'_>,
) -> DiResult<Vec<Plan>> {
    let factories = env.snapshot.collect_for_type(key.type_id());
    let info = request.info();
    let mut items = Vec::with_capacity(factories.len());
    for (element_key, factory) in &factories {
        if let Some(condition) = &factory.setup.condition {
            if !condition(&info) {
                continue;
            }
        }
        items.push(compile_factory(env, element_key, factory, request)?);
    }
    Ok(items)
}

impl Plan {
    pub(crate) fn run(&self, ctx: &ResolveContext) -> DiResult<AnyArc> {
        match self {
            Plan::Constant(value) => Ok(value.clone()),
            Plan::Construct { descriptor, ctor, args, members, track } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(run_arg(arg, ctx)?);
                }
                let mut built = (descriptor.constructors[*ctor].build)(Args::new(values))?;
                for (index, step) in members {
                    let value = run_arg(step, ctx)?;
                    (descriptor.members[*index].inject)(built.as_mut(), value)?;
                }
                let value: AnyArc = Arc::from(built);
                if let Some(track) = track {
                    ctx.track(track, &value)?;
                }
                Ok(value)
            }
            Plan::Delegate { key, run, track } => {
                let value = ctx.guarded(key, || run(ctx))?;
                if let Some(track) = track {
                    ctx.track(track, &value)?;
                }
                Ok(value)
            }
            Plan::ScopeBind { binding, slot, track, inner } => {
                let scope = ctx.locate(binding)?;
                ctx.with_owner(Arc::clone(&scope), || {
                    scope.get_or_add(*slot, || inner.run(ctx), track.as_ref())
                })
            }
            Plan::Collection { items, adapt } => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.run(ctx)?);
                }
                adapt(out)
            }
        }
    }
}

fn run_arg(step: &ArgStep, ctx: &ResolveContext) -> DiResult<AnyArc> {
    match step {
        ArgStep::Plan(plan) => plan.run(ctx),
        ArgStep::Wrap { some, inner } => some(inner.run(ctx)?),
        ArgStep::Missing { none } => Ok(none()),
        ArgStep::Defer { make } => Ok(make(ctx)),
    }
}

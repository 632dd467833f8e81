use ferric_di::{
    Args, Container, Dependency, DiError, Injectable, Resolver, Reuse, TypeDescriptor,
};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[test]
fn test_scoped_shared_within_scope_isolated_between_scopes() {
    let container = Container::new();
    let counter = Arc::new(AtomicU32::new(0));
    container
        .register_delegate::<u32, _>(Reuse::Scoped, move |_| {
            Ok(counter.fetch_add(1, Ordering::Relaxed))
        })
        .unwrap();

    let scope_a = container.open_scope(None);
    let scope_b = container.open_scope(None);

    let a1 = scope_a.resolve::<u32>().unwrap();
    let a2 = scope_a.resolve::<u32>().unwrap();
    let b = scope_b.resolve::<u32>().unwrap();

    assert!(Arc::ptr_eq(&a1, &a2));
    assert!(!Arc::ptr_eq(&a1, &b));
}

#[test]
fn test_singleton_shared_across_scopes() {
    struct Shared;

    let container = Container::new();
    container.register_delegate::<Shared, _>(Reuse::Singleton, |_| Ok(Shared)).unwrap();

    let from_root = container.resolve::<Shared>().unwrap();
    let scope = container.open_scope(None);
    let from_scope = scope.resolve::<Shared>().unwrap();
    let nested = scope.open_scope(None);
    let from_nested = nested.resolve::<Shared>().unwrap();

    assert!(Arc::ptr_eq(&from_root, &from_scope));
    assert!(Arc::ptr_eq(&from_root, &from_nested));
}

#[test]
fn test_named_scope_binding() {
    struct Session {
        id: u32,
    }

    let container = Container::new();
    let counter = Arc::new(AtomicU32::new(0));
    container
        .register_delegate::<Session, _>(Reuse::ScopedTo("request"), move |_| {
            Ok(Session { id: counter.fetch_add(1, Ordering::Relaxed) })
        })
        .unwrap();

    let request = container.open_scope(Some("request"));
    let inner_a = request.open_scope(None);
    let inner_b = request.open_scope(None);

    // Both nested scopes walk up to the same named ancestor.
    let a = inner_a.resolve::<Session>().unwrap();
    let b = inner_b.resolve::<Session>().unwrap();
    let direct = request.resolve::<Session>().unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &direct));
    assert_eq!(a.id, 0);
}

#[test]
fn test_named_scope_missing_fails() {
    struct Session;

    let container = Container::new();
    container
        .register_delegate::<Session, _>(Reuse::ScopedTo("request"), |_| Ok(Session))
        .unwrap();

    let unnamed = container.open_scope(None);
    match unnamed.resolve::<Session>() {
        Err(DiError::NoMatchingScope { required: Some("request") }) => {}
        other => panic!("expected NoMatchingScope, got {:?}", other.err()),
    }
}

struct SharedCtx {
    id: u32,
}

struct Holder {
    ctx: Arc<SharedCtx>,
}

impl Injectable for Holder {
    fn descriptor() -> Arc<TypeDescriptor> {
        static D: OnceCell<Arc<TypeDescriptor>> = OnceCell::new();
        D.get_or_init(|| {
            TypeDescriptor::builder("Holder")
                .constructor("new", vec![Dependency::of::<SharedCtx>()], |mut args: Args| {
                    Ok(Holder { ctx: args.take::<SharedCtx>()? })
                })
                .build()
        })
        .clone()
    }
}

struct Pair {
    left: Arc<Holder>,
    right: Arc<Holder>,
}

impl Injectable for Pair {
    fn descriptor() -> Arc<TypeDescriptor> {
        static D: OnceCell<Arc<TypeDescriptor>> = OnceCell::new();
        D.get_or_init(|| {
            TypeDescriptor::builder("Pair")
                .constructor(
                    "new",
                    vec![Dependency::of::<Holder>(), Dependency::of::<Holder>()],
                    |mut args: Args| {
                        Ok(Pair { left: args.take::<Holder>()?, right: args.take::<Holder>()? })
                    },
                )
                .build()
        })
        .clone()
    }
}

#[test]
fn test_in_resolution_reuse_shared_within_one_call_tree() {
    let container = Container::new();
    let counter = Arc::new(AtomicU32::new(0));
    container
        .register_delegate::<SharedCtx, _>(Reuse::InResolution, move |_| {
            Ok(SharedCtx { id: counter.fetch_add(1, Ordering::Relaxed) })
        })
        .unwrap();
    container.register_type::<Holder>(Reuse::Transient).unwrap();
    container.register_type::<Pair>(Reuse::Transient).unwrap();

    let pair = container.resolve::<Pair>().unwrap();
    // Both branches of one resolve call tree share the instance.
    assert!(Arc::ptr_eq(&pair.left.ctx, &pair.right.ctx));

    // A second top-level resolve gets a fresh one.
    let again = container.resolve::<Pair>().unwrap();
    assert!(!Arc::ptr_eq(&pair.left.ctx, &again.left.ctx));
    assert_ne!(pair.left.ctx.id, again.left.ctx.id);
}

#[test]
fn test_resolution_scope_disposed_when_call_returns() {
    struct Tracked;
    impl ferric_di::Dispose for Tracked {
        fn dispose(&self) {
            DISPOSED.store(true, Ordering::Relaxed);
        }
    }
    static DISPOSED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

    let container = Container::new();
    container
        .register_disposable_delegate::<Tracked, _>(Reuse::InResolution, |_| Ok(Tracked))
        .unwrap();

    let tracked = container.resolve::<Tracked>().unwrap();
    // The implicit per-resolve scope was torn down on return.
    assert!(DISPOSED.load(Ordering::Relaxed));
    drop(tracked);
}

#[test]
fn test_resolve_retaining_scope_keeps_instances_alive() {
    struct Tracked;
    impl ferric_di::Dispose for Tracked {
        fn dispose(&self) {
            DISPOSED.store(true, Ordering::Relaxed);
        }
    }
    static DISPOSED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

    let container = Container::new();
    container
        .register_disposable_delegate::<Tracked, _>(Reuse::InResolution, |_| Ok(Tracked))
        .unwrap();

    let (tracked, handle) = container.resolve_retaining_scope::<Tracked>().unwrap();
    assert!(!DISPOSED.load(Ordering::Relaxed));

    // Resolving through the retained handle reuses the same slot.
    let again = handle.resolve::<Tracked>().unwrap();
    assert!(Arc::ptr_eq(&tracked, &again));

    drop(handle);
    assert!(DISPOSED.load(Ordering::Relaxed));
}

#[test]
fn test_nested_scopes_bind_to_innermost() {
    let container = Container::new();
    let counter = Arc::new(AtomicU32::new(0));
    container
        .register_delegate::<u32, _>(Reuse::Scoped, move |_| {
            Ok(counter.fetch_add(1, Ordering::Relaxed))
        })
        .unwrap();

    let outer = container.open_scope(None);
    let inner = outer.open_scope(None);

    let from_outer = outer.resolve::<u32>().unwrap();
    let from_inner = inner.resolve::<u32>().unwrap();

    // Scoped binds to the innermost open scope, so the two differ.
    assert!(!Arc::ptr_eq(&from_outer, &from_inner));
}

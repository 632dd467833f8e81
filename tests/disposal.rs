use ferric_di::{Container, DiError, Dispose, Resolver, Reuse};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};

struct Recorder {
    name: &'static str,
    order: Arc<Mutex<Vec<&'static str>>>,
}

impl Dispose for Recorder {
    fn dispose(&self) {
        self.order.lock().unwrap().push(self.name);
    }
}

struct First(Recorder);
struct Second(Recorder);
struct Third(Recorder);

impl Dispose for First {
    fn dispose(&self) {
        self.0.dispose();
    }
}
impl Dispose for Second {
    fn dispose(&self) {
        self.0.dispose();
    }
}
impl Dispose for Third {
    fn dispose(&self) {
        self.0.dispose();
    }
}

#[test]
fn test_scope_disposal_is_lifo() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new();

    let o = order.clone();
    container
        .register_disposable_delegate::<First, _>(Reuse::Scoped, move |_| {
            Ok(First(Recorder { name: "first", order: o.clone() }))
        })
        .unwrap();
    let o = order.clone();
    container
        .register_disposable_delegate::<Second, _>(Reuse::Scoped, move |_| {
            Ok(Second(Recorder { name: "second", order: o.clone() }))
        })
        .unwrap();
    let o = order.clone();
    container
        .register_disposable_delegate::<Third, _>(Reuse::Scoped, move |_| {
            Ok(Third(Recorder { name: "third", order: o.clone() }))
        })
        .unwrap();

    let scope = container.open_scope(None);
    let _ = scope.resolve::<First>().unwrap();
    let _ = scope.resolve::<Second>().unwrap();
    let _ = scope.resolve::<Third>().unwrap();

    scope.dispose();
    assert_eq!(*order.lock().unwrap(), vec!["third", "second", "first"]);
}

#[test]
fn test_disposing_scope_leaves_parent_and_sibling_alone() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new();

    let o = order.clone();
    container
        .register_disposable_delegate::<First, _>(Reuse::Singleton, move |_| {
            Ok(First(Recorder { name: "singleton", order: o.clone() }))
        })
        .unwrap();
    let o = order.clone();
    container
        .register_disposable_delegate::<Second, _>(Reuse::Scoped, move |_| {
            Ok(Second(Recorder { name: "scoped", order: o.clone() }))
        })
        .unwrap();

    let _singleton = container.resolve::<First>().unwrap();
    let scope_a = container.open_scope(None);
    let scope_b = container.open_scope(None);
    let _a = scope_a.resolve::<Second>().unwrap();
    let b = scope_b.resolve::<Second>().unwrap();

    scope_a.dispose();

    // Only scope A's instance was released.
    assert_eq!(*order.lock().unwrap(), vec!["scoped"]);
    assert!(!scope_b.is_disposed());
    // Sibling scope and the root singleton keep working.
    let b_again = scope_b.resolve::<Second>().unwrap();
    assert!(Arc::ptr_eq(&b, &b_again));

    scope_b.dispose();
    container.dispose();
    assert_eq!(*order.lock().unwrap(), vec!["scoped", "scoped", "singleton"]);
}

#[test]
fn test_disposed_scope_access_fails() {
    let container = Container::new();
    container.register_delegate::<u32, _>(Reuse::Scoped, |_| Ok(5u32)).unwrap();

    let scope = container.open_scope(Some("request"));
    let _ = scope.resolve::<u32>().unwrap();
    let view = scope.view();
    scope.dispose();

    match view.resolve::<u32>() {
        Err(DiError::ScopeDisposed { scope: Some("request") }) => {}
        other => panic!("expected ScopeDisposed, got {:?}", other.err()),
    }
    // The handle itself fails the same way.
    assert!(matches!(scope.resolve::<u32>(), Err(DiError::ScopeDisposed { .. })));
}

#[test]
fn test_disposed_scope_fails_from_other_thread() {
    let container = Container::new();
    container.register_delegate::<u32, _>(Reuse::Scoped, |_| Ok(5u32)).unwrap();

    let scope = container.open_scope(None);
    let _ = scope.resolve::<u32>().unwrap();
    let view = scope.view();

    // The background thread captures the view before disposal begins and
    // only resolves after disposal completed.
    let before_dispose = Arc::new(Barrier::new(2));
    let after_dispose = Arc::new(Barrier::new(2));

    crossbeam_utils::thread::scope(|s| {
        let thread_view = view.clone();
        let before = before_dispose.clone();
        let after = after_dispose.clone();
        s.spawn(move |_| {
            before.wait();
            after.wait();
            match thread_view.resolve::<u32>() {
                Err(DiError::ScopeDisposed { .. }) => {}
                other => panic!("expected ScopeDisposed, got {:?}", other.err()),
            }
        });

        before_dispose.wait();
        scope.dispose();
        after_dispose.wait();
    })
    .unwrap();
}

#[test]
fn test_container_dispose_is_terminal() {
    struct Tracked;
    static RELEASED: AtomicBool = AtomicBool::new(false);
    impl Dispose for Tracked {
        fn dispose(&self) {
            RELEASED.store(true, Ordering::Relaxed);
        }
    }

    let container = Container::new();
    container
        .register_disposable_delegate::<Tracked, _>(Reuse::Singleton, |_| Ok(Tracked))
        .unwrap();
    let _ = container.resolve::<Tracked>().unwrap();

    container.dispose();
    container.dispose(); // Idempotent
    assert!(RELEASED.load(Ordering::Relaxed));

    assert!(matches!(container.resolve::<Tracked>(), Err(DiError::ContainerDisposed)));
    assert!(matches!(container.register_instance(1u8), Err(DiError::ContainerDisposed)));
}

#[test]
fn test_disposed_scope_releases_instance_ownership() {
    struct Payload {
        _bytes: Vec<u8>,
    }

    let container = Container::new();
    container
        .register_delegate::<Payload, _>(Reuse::Scoped, |_| Ok(Payload { _bytes: vec![0; 64] }))
        .unwrap();

    let scope = container.open_scope(None);
    let strong = scope.resolve::<Payload>().unwrap();
    let weak = Arc::downgrade(&strong);
    drop(strong);

    // The scope's slot still owns the instance until disposal.
    assert!(weak.upgrade().is_some());
    scope.dispose();
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_transient_disposable_tracked_by_ambient_scope() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new();

    let o = order.clone();
    container
        .register_disposable_delegate::<First, _>(Reuse::Transient, move |_| {
            Ok(First(Recorder { name: "transient", order: o.clone() }))
        })
        .unwrap();

    let scope = container.open_scope(None);
    let _ = scope.resolve::<First>().unwrap();
    let _ = scope.resolve::<First>().unwrap();
    assert!(order.lock().unwrap().is_empty());

    scope.dispose();
    // Both transient instances were tracked by the scope they were made in.
    assert_eq!(*order.lock().unwrap(), vec!["transient", "transient"]);
}

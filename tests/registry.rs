use ferric_di::{
    ClosedDelegate, Container, DiError, FactoryKind, IfConflict, Resolver, Reuse, Rules,
    Shaped, TypeArg, TypeShape, UnknownService,
};
use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

#[test]
fn test_conflict_policy_fail() {
    let container = Container::with_rules(Rules::new().with_conflict_policy(IfConflict::Fail));
    container.register_instance(1u32).unwrap();

    match container.register_instance(2u32) {
        Err(DiError::RegistrationConflict { service, tag: None }) => {
            assert_eq!(service, "u32");
        }
        other => panic!("expected RegistrationConflict, got {:?}", other.err()),
    }
    // The original registration is untouched.
    assert_eq!(*container.resolve::<u32>().unwrap(), 1);
}

#[test]
fn test_conflict_policy_keep_and_replace() {
    let keep = Container::with_rules(Rules::new().with_conflict_policy(IfConflict::Keep));
    keep.register_instance(1u32).unwrap();
    keep.register_instance(2u32).unwrap();
    assert_eq!(*keep.resolve::<u32>().unwrap(), 1);

    let replace = Container::with_rules(Rules::new().with_conflict_policy(IfConflict::Replace));
    replace.register_instance(1u32).unwrap();
    replace.register_instance(2u32).unwrap();
    assert_eq!(*replace.resolve::<u32>().unwrap(), 2);
    // Replace dropped the first registration entirely.
    assert_eq!(replace.resolve_many::<u32>().unwrap().len(), 1);
}

#[test]
fn test_unregister_then_resolve_fails() {
    let container = Container::new();
    container.register_instance("here".to_string()).unwrap();
    assert!(container.resolve::<String>().is_ok());

    container.unregister::<String>(None, None).unwrap();

    let fresh = container.without_cache();
    assert!(matches!(fresh.resolve::<String>(), Err(DiError::Unresolved { .. })));
    // The mutation bumped the snapshot version, so even the original view
    // cannot replay the stale plan.
    assert!(matches!(container.resolve::<String>(), Err(DiError::Unresolved { .. })));
}

#[test]
fn test_unregister_filters_by_kind() {
    let container = Container::new();
    container.register_instance(1u64).unwrap();
    container.register_delegate::<u64, _>(Reuse::Transient, |_| Ok(2u64)).unwrap();
    assert_eq!(container.resolve_many::<u64>().unwrap().len(), 2);

    container.unregister::<u64>(None, Some(FactoryKind::Instance)).unwrap();

    let remaining = container.resolve_many::<u64>().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(*remaining[0], 2);
}

#[test]
fn test_unregister_tagged_entry_only() {
    let container = Container::new();
    container.register_instance(1u16).unwrap();
    container.register_instance_tagged("alt", 2u16).unwrap();

    container.unregister::<u16>(Some("alt"), None).unwrap();

    assert_eq!(*container.resolve::<u16>().unwrap(), 1);
    // The tagged entry is gone; the request falls back to the untagged one.
    assert_eq!(*container.resolve_tagged::<u16>("alt").unwrap(), 1);
}

// ----- Open generics -----

struct ParserCtor;

struct Parser<T: Send + Sync + 'static> {
    label: &'static str,
    _marker: PhantomData<T>,
}

impl<T: Send + Sync + 'static> Shaped for Parser<T> {
    fn shape() -> TypeShape {
        TypeShape::of::<ParserCtor>([TypeArg::of::<T>()])
    }
}

fn register_parser_family(container: &Container, reuse: Reuse) {
    container
        .register_open_generic::<ParserCtor, _>(reuse, |shape| {
            let arg = shape.arg(0)?;
            if arg.id == TypeId::of::<i32>() {
                Some(ClosedDelegate::new(|_| {
                    Ok(Parser::<i32> { label: "from-family", _marker: PhantomData })
                }))
            } else {
                None
            }
        })
        .unwrap();
}

#[test]
fn test_open_generic_resolution() {
    let container = Container::new();
    register_parser_family(&container, Reuse::Transient);

    let parser = container.resolve_shaped::<Parser<i32>>().unwrap();
    assert_eq!(parser.label, "from-family");

    // The family cannot unify String; nothing else matches.
    assert!(matches!(
        container.resolve_shaped::<Parser<String>>(),
        Err(DiError::Unresolved { .. })
    ));
}

#[test]
fn test_closed_registration_beats_open_family() {
    let container = Container::new();
    register_parser_family(&container, Reuse::Transient);
    container
        .register_instance(Parser::<i32> { label: "closed", _marker: PhantomData })
        .unwrap();

    let parser = container.resolve_shaped::<Parser<i32>>().unwrap();
    assert_eq!(parser.label, "closed");
}

#[test]
fn test_open_generic_singleton_is_stable_across_views() {
    let container = Container::new();
    register_parser_family(&container, Reuse::Singleton);

    let a = container.resolve_shaped::<Parser<i32>>().unwrap();
    let b = container.resolve_shaped::<Parser<i32>>().unwrap();
    // A cache-free view recompiles the plan yet lands on the same slot.
    let c = container.without_cache().resolve_shaped::<Parser<i32>>().unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
}

#[test]
fn test_unregister_open_generic_scenario() {
    let container = Container::new();
    register_parser_family(&container, Reuse::Transient);
    assert!(container.resolve_shaped::<Parser<i32>>().is_ok());

    container.unregister_open::<ParserCtor>().unwrap();

    let fresh = container.without_cache();
    assert!(matches!(
        fresh.resolve_shaped::<Parser<i32>>(),
        Err(DiError::Unresolved { .. })
    ));
}

// ----- Cache and snapshot behavior -----

#[test]
fn test_plan_cache_invalidated_by_registration() {
    let container = Container::new();
    container.register_delegate::<String, _>(Reuse::Transient, |_| Ok("v1".to_string())).unwrap();
    assert_eq!(container.resolve::<String>().unwrap().as_str(), "v1");

    // Appending a newer registration takes over single resolution.
    container.register_delegate::<String, _>(Reuse::Transient, |_| Ok("v2".to_string())).unwrap();
    assert_eq!(container.resolve::<String>().unwrap().as_str(), "v2");
}

#[test]
fn test_resolve_many_empty_for_unregistered() {
    struct Nothing;
    let container = Container::new();
    assert!(container.resolve_many::<Nothing>().unwrap().is_empty());
}

#[test]
fn test_child_container_shares_registry_but_not_singletons() {
    struct Shared;

    let parent = Container::new();
    parent.register_delegate::<Shared, _>(Reuse::Singleton, |_| Ok(Shared)).unwrap();

    let child = parent.child_container();

    // Registration made before the fork is visible in the child.
    let from_parent = parent.resolve::<Shared>().unwrap();
    let from_child = child.resolve::<Shared>().unwrap();
    assert!(!Arc::ptr_eq(&from_parent, &from_child)); // Separate root scopes

    // Overriding in the child does not affect the parent.
    child.register_delegate::<u32, _>(Reuse::Transient, |_| Ok(7u32)).unwrap();
    assert!(child.resolve::<u32>().is_ok());
    assert!(matches!(parent.resolve::<u32>(), Err(DiError::Unresolved { .. })));

    // And the parent's later registrations do not leak into the child.
    parent.register_instance(3u8).unwrap();
    assert!(matches!(child.resolve::<u8>(), Err(DiError::Unresolved { .. })));
}

#[test]
fn test_unknown_service_fallback() {
    struct Synthesized {
        marker: &'static str,
    }

    let rules = Rules::new().with_unknown_service(|key| {
        if key.type_name().contains("Synthesized") {
            Some(UnknownService::delegate(Reuse::Singleton, |_| {
                Ok(Synthesized { marker: "stub" })
            }))
        } else {
            None
        }
    });

    let container = Container::with_rules(rules);
    let a = container.resolve::<Synthesized>().unwrap();
    let b = container.resolve::<Synthesized>().unwrap();
    assert_eq!(a.marker, "stub");
    assert!(Arc::ptr_eq(&a, &b)); // The fallback's reuse is honored

    // Fallbacks never shadow real registrations.
    struct Real;
    let plain = Container::with_rules(Rules::new().with_unknown_service(|_| None));
    assert!(matches!(plain.resolve::<Real>(), Err(DiError::Unresolved { .. })));
}

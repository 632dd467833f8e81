//! Type descriptors: the pluggable introspection capability.
//!
//! Rust has no runtime reflection, so every constructor-injected type
//! describes itself once through [`Injectable`]: which constructors it has,
//! what each one depends on, and how to set injectable members. The plan
//! compiler walks these descriptors instead of walking metadata.

use std::any::Any;
use std::sync::Arc;

use crate::container::ResolveContext;
use crate::error::{DiError, DiResult};
use crate::key::ServiceKey;
use crate::lazy::Lazy;
use crate::traits::Resolver;

/// Type-erased shared instance.
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;
/// Type-erased owned instance, mutable until published.
pub(crate) type AnyBox = Box<dyn Any + Send + Sync>;

pub(crate) type AdaptFn = Arc<dyn Fn(Vec<AnyArc>) -> DiResult<AnyArc> + Send + Sync>;
pub(crate) type WrapFn = Arc<dyn Fn(AnyArc) -> DiResult<AnyArc> + Send + Sync>;
pub(crate) type DefaultFn = Arc<dyn Fn() -> AnyArc + Send + Sync>;
pub(crate) type MakeFn = Arc<dyn Fn(&ResolveContext) -> AnyArc + Send + Sync>;
pub(crate) type InjectFn =
    Arc<dyn Fn(&mut (dyn Any + Send + Sync), AnyArc) -> DiResult<()> + Send + Sync>;
pub(crate) type BuildFn = Arc<dyn Fn(Args) -> DiResult<AnyBox> + Send + Sync>;

/// How a declared dependency is delivered to the constructor.
pub(crate) enum DepKind {
    /// Plain `Arc<T>` argument.
    Single,
    /// `Option<Arc<T>>` argument; `None` when the service is unregistered.
    Optional { some: WrapFn, none: DefaultFn },
    /// `Vec<Arc<T>>` of every registered implementation, registration order.
    Collection { adapt: AdaptFn },
    /// `Lazy<T>` argument; resolution deferred until first use.
    Lazy { make: MakeFn },
}

/// One declared dependency of a constructor or member.
///
/// Built with the typed helpers ([`Dependency::of`], [`Dependency::optional`],
/// [`Dependency::collection`], [`Dependency::lazy`]); the erased engine never
/// needs the dependency's concrete type again afterwards.
pub struct Dependency {
    pub(crate) key: ServiceKey,
    pub(crate) kind: DepKind,
}

impl Dependency {
    /// A required dependency on `T`, delivered as `Arc<T>`.
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self { key: ServiceKey::of::<T>(), kind: DepKind::Single }
    }

    /// A required dependency on a tagged registration of `T`.
    pub fn tagged<T: Send + Sync + 'static>(tag: &'static str) -> Self {
        Self { key: ServiceKey::tagged::<T>(tag), kind: DepKind::Single }
    }

    /// An optional dependency, delivered as `Option<Arc<T>>`.
    ///
    /// An unresolved service becomes `None` instead of failing the whole
    /// resolution; every other failure still propagates.
    pub fn optional<T: Send + Sync + 'static>() -> Self {
        Self {
            key: ServiceKey::of::<T>(),
            kind: DepKind::Optional {
                some: Arc::new(|any: AnyArc| {
                    let arc = any
                        .downcast::<T>()
                        .map_err(|_| DiError::TypeMismatch { expected: std::any::type_name::<T>() })?;
                    Ok(Arc::new(Some(arc)) as AnyArc)
                }),
                none: Arc::new(|| Arc::new(None::<Arc<T>>) as AnyArc),
            },
        }
    }

    /// A dependency on every registered implementation of `T`, delivered as
    /// `Vec<Arc<T>>` in registration order.
    pub fn collection<T: Send + Sync + 'static>() -> Self {
        Self {
            key: ServiceKey::of::<T>(),
            kind: DepKind::Collection {
                adapt: Arc::new(|items: Vec<AnyArc>| {
                    let mut out = Vec::with_capacity(items.len());
                    for any in items {
                        out.push(any.downcast::<T>().map_err(|_| DiError::TypeMismatch {
                            expected: std::any::type_name::<T>(),
                        })?);
                    }
                    Ok(Arc::new(out) as AnyArc)
                }),
            },
        }
    }

    /// A deferred dependency, delivered as [`Lazy<T>`].
    ///
    /// The service is not touched while the graph is built; it resolves on
    /// the first `get`, against the scope chain that was ambient here. A
    /// lazy edge also starts a fresh dependency chain, which is how mutually
    /// referential graphs are expressed without tripping cycle detection.
    pub fn lazy<T: Send + Sync + 'static>() -> Self {
        Self::lazy_inner::<T>(None)
    }

    /// A deferred dependency on a tagged registration.
    pub fn lazy_tagged<T: Send + Sync + 'static>(tag: &'static str) -> Self {
        Self::lazy_inner::<T>(Some(tag))
    }

    fn lazy_inner<T: Send + Sync + 'static>(tag: Option<&'static str>) -> Self {
        let key = match tag {
            Some(t) => ServiceKey::tagged::<T>(t),
            None => ServiceKey::of::<T>(),
        };
        Self {
            key,
            kind: DepKind::Lazy {
                make: Arc::new(move |ctx: &ResolveContext| {
                    Arc::new(Lazy::<T>::new(ctx.view(), tag)) as AnyArc
                }),
            },
        }
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }
}

/// Resolved constructor arguments, consumed positionally.
///
/// The `take_*` method used for each position must match the corresponding
/// [`Dependency`] declaration, in declaration order.
pub struct Args {
    items: std::vec::IntoIter<AnyArc>,
}

impl Args {
    pub(crate) fn new(values: Vec<AnyArc>) -> Self {
        Self { items: values.into_iter() }
    }

    fn next_any(&mut self, expected: &'static str) -> DiResult<AnyArc> {
        self.items.next().ok_or(DiError::TypeMismatch { expected })
    }

    /// Takes the next argument as `Arc<T>` (declared with [`Dependency::of`]).
    pub fn take<T: Send + Sync + 'static>(&mut self) -> DiResult<Arc<T>> {
        self.next_any(std::any::type_name::<T>())?
            .downcast::<T>()
            .map_err(|_| DiError::TypeMismatch { expected: std::any::type_name::<T>() })
    }

    /// Takes the next argument as `Option<Arc<T>>` ([`Dependency::optional`]).
    pub fn take_optional<T: Send + Sync + 'static>(&mut self) -> DiResult<Option<Arc<T>>> {
        self.next_any(std::any::type_name::<T>())?
            .downcast::<Option<Arc<T>>>()
            .map(|arc| (*arc).clone())
            .map_err(|_| DiError::TypeMismatch { expected: std::any::type_name::<T>() })
    }

    /// Takes the next argument as `Vec<Arc<T>>` ([`Dependency::collection`]).
    pub fn take_collection<T: Send + Sync + 'static>(&mut self) -> DiResult<Vec<Arc<T>>> {
        self.next_any(std::any::type_name::<T>())?
            .downcast::<Vec<Arc<T>>>()
            .map(|arc| (*arc).clone())
            .map_err(|_| DiError::TypeMismatch { expected: std::any::type_name::<T>() })
    }

    /// Takes the next argument as [`Lazy<T>`] ([`Dependency::lazy`]).
    pub fn take_lazy<T: Send + Sync + 'static>(&mut self) -> DiResult<Lazy<T>> {
        self.next_any(std::any::type_name::<T>())?
            .downcast::<Lazy<T>>()
            .map(|arc| (*arc).clone())
            .map_err(|_| DiError::TypeMismatch { expected: std::any::type_name::<T>() })
    }
}

/// One way to construct the implementation type.
pub struct ConstructorDescriptor {
    pub(crate) name: &'static str,
    pub(crate) params: Vec<Dependency>,
    pub(crate) build: BuildFn,
}

/// One injectable member of the implementation type.
pub struct MemberDescriptor {
    pub(crate) name: &'static str,
    pub(crate) dep: Dependency,
    pub(crate) inject: InjectFn,
}

/// Everything the container knows about one implementation type.
///
/// Computed once per type (cache it in a `static` inside the [`Injectable`]
/// impl) and shared by every registration of the type.
pub struct TypeDescriptor {
    pub(crate) type_name: &'static str,
    pub(crate) constructors: Vec<ConstructorDescriptor>,
    pub(crate) members: Vec<MemberDescriptor>,
}

impl TypeDescriptor {
    pub fn builder(type_name: &'static str) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder { type_name, constructors: Vec::new(), members: Vec::new() }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type_name", &self.type_name)
            .field("constructors", &self.constructors.iter().map(|c| c.name).collect::<Vec<_>>())
            .field("members", &self.members.iter().map(|m| m.name).collect::<Vec<_>>())
            .finish()
    }
}

/// Fluent builder for [`TypeDescriptor`].
pub struct TypeDescriptorBuilder {
    type_name: &'static str,
    constructors: Vec<ConstructorDescriptor>,
    members: Vec<MemberDescriptor>,
}

impl TypeDescriptorBuilder {
    /// Declares a constructor: its name (for explicit selection), its
    /// dependencies, and the build closure consuming them.
    pub fn constructor<T, F>(mut self, name: &'static str, params: Vec<Dependency>, build: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Args) -> DiResult<T> + Send + Sync + 'static,
    {
        self.constructors.push(ConstructorDescriptor {
            name,
            params,
            build: Arc::new(move |args| Ok(Box::new(build(args)?) as AnyBox)),
        });
        self
    }

    /// Declares an injectable member: the service `D` it needs and the
    /// setter storing it into the instance.
    ///
    /// Members are filled after construction when the registration enables
    /// member injection, and by `resolve_members` on existing instances.
    pub fn member<T, D, F>(self, name: &'static str, set: F) -> Self
    where
        T: Send + Sync + 'static,
        D: Send + Sync + 'static,
        F: Fn(&mut T, Arc<D>) + Send + Sync + 'static,
    {
        self.member_inner(name, Dependency::of::<D>(), set)
    }

    /// Like [`member`](Self::member) but resolving a tagged registration.
    pub fn member_tagged<T, D, F>(self, name: &'static str, tag: &'static str, set: F) -> Self
    where
        T: Send + Sync + 'static,
        D: Send + Sync + 'static,
        F: Fn(&mut T, Arc<D>) + Send + Sync + 'static,
    {
        self.member_inner(name, Dependency::tagged::<D>(tag), set)
    }

    fn member_inner<T, D, F>(mut self, name: &'static str, dep: Dependency, set: F) -> Self
    where
        T: Send + Sync + 'static,
        D: Send + Sync + 'static,
        F: Fn(&mut T, Arc<D>) + Send + Sync + 'static,
    {
        self.members.push(MemberDescriptor {
            name,
            dep,
            inject: Arc::new(move |target, value| {
                let target = target
                    .downcast_mut::<T>()
                    .ok_or(DiError::TypeMismatch { expected: std::any::type_name::<T>() })?;
                let value = value
                    .downcast::<D>()
                    .map_err(|_| DiError::TypeMismatch { expected: std::any::type_name::<D>() })?;
                set(target, value);
                Ok(())
            }),
        });
        self
    }

    pub fn build(self) -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor {
            type_name: self.type_name,
            constructors: self.constructors,
            members: self.members,
        })
    }
}

/// Implementation types the container can construct on its own.
///
/// The descriptor is the compile-time answer to runtime constructor
/// discovery: list the constructors, their dependencies, and any injectable
/// members once, and cache the result in a `static`.
///
/// # Examples
///
/// ```
/// use ferric_di::{Args, Dependency, Injectable, TypeDescriptor};
/// use once_cell::sync::OnceCell;
/// use std::sync::Arc;
///
/// struct Database {
///     url: String,
/// }
///
/// struct UserService {
///     db: Arc<Database>,
/// }
///
/// impl Injectable for UserService {
///     fn descriptor() -> Arc<TypeDescriptor> {
///         static DESCRIPTOR: OnceCell<Arc<TypeDescriptor>> = OnceCell::new();
///         DESCRIPTOR
///             .get_or_init(|| {
///                 TypeDescriptor::builder("UserService")
///                     .constructor(
///                         "new",
///                         vec![Dependency::of::<Database>()],
///                         |mut args: Args| {
///                             Ok(UserService { db: args.take::<Database>()? })
///                         },
///                     )
///                     .build()
///             })
///             .clone()
///     }
/// }
/// ```
pub trait Injectable: Send + Sync + Sized + 'static {
    /// The cached descriptor for this type.
    fn descriptor() -> Arc<TypeDescriptor>;
}

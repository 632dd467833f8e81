//! Service keys and type shapes.

use std::any::TypeId;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};

use once_cell::sync::Lazy;
use smallvec::SmallVec;

// Fixed seeds so hashes are stable for the process lifetime; every snapshot,
// scope and plan cache must agree on where a key lives.
static HASHER: Lazy<ahash::RandomState> =
    Lazy::new(|| ahash::RandomState::with_seeds(0x51ab, 0x7e11, 0xc0de, 0xd1d1));

pub(crate) fn hash_of<T: Hash>(value: &T) -> u64 {
    HASHER.hash_one(value)
}

pub(crate) fn hash_pair(a: u64, b: u64) -> u64 {
    let mut h = HASHER.build_hasher();
    a.hash(&mut h);
    b.hash(&mut h);
    h.finish()
}

/// Identifies a registration slot: a service type plus an optional
/// discriminator tag.
///
/// Two keys are equal when their `TypeId` and tag agree; the captured type
/// name only feeds diagnostics and error messages.
///
/// # Examples
///
/// ```
/// use ferric_di::ServiceKey;
///
/// struct Database;
///
/// let plain = ServiceKey::of::<Database>();
/// let replica = ServiceKey::tagged::<Database>("replica");
///
/// assert_ne!(plain, replica);
/// assert_eq!(plain.tag(), None);
/// assert_eq!(replica.tag(), Some("replica"));
/// ```
#[derive(Debug, Clone)]
pub struct ServiceKey {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) tag: Option<&'static str>,
}

impl ServiceKey {
    /// Key for an untagged registration of `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            tag: None,
        }
    }

    /// Key for a registration of `T` discriminated by `tag`.
    pub fn tagged<T: 'static>(tag: &'static str) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            tag: Some(tag),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn tag(&self) -> Option<&'static str> {
        self.tag
    }

    /// The same key with the tag stripped, used for untagged fallback lookup.
    pub(crate) fn untagged(&self) -> Self {
        Self { type_id: self.type_id, type_name: self.type_name, tag: None }
    }

    pub(crate) fn hash_value(&self) -> u64 {
        hash_of(self)
    }
}

impl PartialEq for ServiceKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        // Type identity plus tag; the name string is ignored.
        self.type_id == other.type_id && self.tag == other.tag
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.tag.hash(state);
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Some(tag) => write!(f, "{} (tag \"{}\")", self.type_name, tag),
            None => f.write_str(self.type_name),
        }
    }
}

/// One argument position of a closed generic type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeArg {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeArg {
    pub fn of<T: 'static>() -> Self {
        Self { id: TypeId::of::<T>(), name: std::any::type_name::<T>() }
    }
}

/// Explicit descriptor of a closed generic type: the identity of its type
/// constructor plus the argument list.
///
/// Rust has no runtime reification of generics, so open-generic registrations
/// are keyed by a constructor marker type and closed requests carry one of
/// these shapes; a family's provider unifies the arguments and hands back a
/// closed factory when it can.
///
/// # Examples
///
/// ```
/// use ferric_di::{Shaped, TypeArg, TypeShape};
///
/// struct Repository<T>(std::marker::PhantomData<T>);
/// // Marker identifying the `Repository` constructor across instantiations.
/// struct RepositoryCtor;
///
/// impl<T: 'static> Shaped for Repository<T> {
///     fn shape() -> TypeShape {
///         TypeShape::of::<RepositoryCtor>([TypeArg::of::<T>()])
///     }
/// }
///
/// let shape = Repository::<u32>::shape();
/// assert_eq!(shape.arity(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct TypeShape {
    pub(crate) ctor_id: TypeId,
    pub(crate) ctor_name: &'static str,
    pub(crate) args: SmallVec<[TypeArg; 2]>,
}

impl TypeShape {
    /// Builds a shape for the constructor marker `C` and the given arguments.
    pub fn of<C: 'static>(args: impl IntoIterator<Item = TypeArg>) -> Self {
        Self {
            ctor_id: TypeId::of::<C>(),
            ctor_name: std::any::type_name::<C>(),
            args: args.into_iter().collect(),
        }
    }

    pub fn ctor_name(&self) -> &'static str {
        self.ctor_name
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// The argument at position `index`, if any.
    pub fn arg(&self, index: usize) -> Option<&TypeArg> {
        self.args.get(index)
    }
}

/// Closed generic types that can describe their own shape.
///
/// Implementations are the compile-time stand-in for runtime generic
/// introspection; see [`TypeShape`] for an example.
pub trait Shaped: 'static {
    fn shape() -> TypeShape;
}

//! Resolver trait for typed service resolution.

use std::any::Any;
use std::sync::Arc;

use crate::container::Container;
use crate::error::{DiError, DiResult};
use crate::key::{ServiceKey, Shaped, TypeShape};
use crate::lazy::Lazy;

fn downcast<T: Send + Sync + 'static>(any: Arc<dyn Any + Send + Sync>) -> DiResult<Arc<T>> {
    any.downcast::<T>()
        .map_err(|_| DiError::TypeMismatch { expected: std::any::type_name::<T>() })
}

/// Typed resolution interface shared by the container, scoped handles and
/// the resolve context handed to delegate factories.
///
/// The two `*_key` methods are the erased core; everything else is a typed
/// convenience built on top of them.
///
/// # Examples
///
/// ```
/// use ferric_di::{Container, Resolver, Reuse};
/// use std::sync::Arc;
///
/// struct Config { port: u16 }
/// struct Server { config: Arc<Config> }
///
/// let container = Container::new();
/// container.register_instance(Config { port: 8080 }).unwrap();
/// container.register_delegate::<Server, _>(Reuse::Transient, |ctx| {
///     Ok(Server { config: ctx.resolve::<Config>()? })
/// }).unwrap();
///
/// let server = container.resolve::<Server>().unwrap();
/// assert_eq!(server.config.port, 8080);
/// ```
pub trait Resolver {
    /// Resolves a single service by key, optionally with the closed generic
    /// shape of the requested type.
    fn resolve_key(
        &self,
        key: &ServiceKey,
        shape: Option<&TypeShape>,
    ) -> DiResult<Arc<dyn Any + Send + Sync>>;

    /// Resolves every registration of the keyed service type, tagged or not,
    /// in registration order.
    fn resolve_key_many(&self, key: &ServiceKey) -> DiResult<Vec<Arc<dyn Any + Send + Sync>>>;

    /// The container view (registry plus ambient scope chain) this resolver
    /// resolves against; deferred wrappers capture it.
    fn view(&self) -> Container;

    /// Resolves `T` from its untagged registration.
    fn resolve<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        downcast(self.resolve_key(&ServiceKey::of::<T>(), None)?)
    }

    /// Resolves `T` from the registration tagged `tag`, falling back to the
    /// untagged registration when no tagged one matches.
    fn resolve_tagged<T: Send + Sync + 'static>(&self, tag: &'static str) -> DiResult<Arc<T>> {
        downcast(self.resolve_key(&ServiceKey::tagged::<T>(tag), None)?)
    }

    /// Resolves a closed generic `T`, consulting open-generic families when
    /// no closed registration matches.
    fn resolve_shaped<T: Shaped + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        downcast(self.resolve_key(&ServiceKey::of::<T>(), Some(&T::shape()))?)
    }

    /// Resolves `T`, mapping an unresolved service to `None`. Every other
    /// failure still propagates.
    fn resolve_opt<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        match self.resolve_key(&ServiceKey::of::<T>(), None) {
            Ok(any) => Ok(Some(downcast(any)?)),
            Err(DiError::Unresolved { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Tagged variant of [`resolve_opt`](Resolver::resolve_opt).
    fn resolve_opt_tagged<T: Send + Sync + 'static>(
        &self,
        tag: &'static str,
    ) -> DiResult<Option<Arc<T>>> {
        match self.resolve_key(&ServiceKey::tagged::<T>(tag), None) {
            Ok(any) => Ok(Some(downcast(any)?)),
            Err(DiError::Unresolved { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Resolves every registered implementation of `T` in registration
    /// order, without deduplication. Unregistered types yield an empty list.
    fn resolve_many<T: Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        let anys = self.resolve_key_many(&ServiceKey::of::<T>())?;
        let mut out = Vec::with_capacity(anys.len());
        for any in anys {
            out.push(downcast(any)?);
        }
        Ok(out)
    }

    /// A deferred handle to `T`, resolved on first use against this
    /// resolver's view.
    fn resolve_lazy<T: Send + Sync + 'static>(&self) -> Lazy<T> {
        Lazy::new(self.view(), None)
    }

    /// Tagged variant of [`resolve_lazy`](Resolver::resolve_lazy).
    fn resolve_lazy_tagged<T: Send + Sync + 'static>(&self, tag: &'static str) -> Lazy<T> {
        Lazy::new(self.view(), Some(tag))
    }
}

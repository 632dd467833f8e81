//! Immutable registry snapshots.
//!
//! A snapshot is the unit of publication: registration and unregistration
//! build a whole new snapshot in O(log n) and the container swaps it in with
//! a plain pointer store. Resolutions pin whatever snapshot they loaded and
//! are never affected by later writes.

use std::any::TypeId;
use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::factory::{DelegateFn, Factory, FactoryKind, IfConflict};
use crate::key::{hash_of, ServiceKey, TypeShape};
use crate::map::PersistentMap;
use crate::reuse::Reuse;

pub(crate) type FactoryList = Arc<Vec<Arc<Factory>>>;
pub(crate) type FamilyList = Arc<Vec<Arc<OpenFamily>>>;

/// An open-generic registration: one factory family per constructor marker.
///
/// The provider is handed the requested closed shape and unifies the
/// arguments itself, returning a closed delegate when it can.
pub(crate) struct OpenFamily {
    pub(crate) id: u64,
    pub(crate) reuse: Reuse,
    pub(crate) provider: Arc<dyn Fn(&TypeShape) -> Option<DelegateFn> + Send + Sync>,
}

pub(crate) struct Snapshot {
    pub(crate) version: u64,
    services: PersistentMap<ServiceKey, FactoryList>,
    open: PersistentMap<TypeId, FamilyList>,
}

impl Snapshot {
    pub(crate) fn empty() -> Self {
        Self { version: 0, services: PersistentMap::new(), open: PersistentMap::new() }
    }

    pub(crate) fn find(&self, key: &ServiceKey) -> Option<&FactoryList> {
        self.services.try_find(key.hash_value(), key)
    }

    pub(crate) fn find_open(&self, ctor: &TypeId) -> Option<&FamilyList> {
        self.open.try_find(hash_of(ctor), ctor)
    }

    /// Every registration whose service type matches, tagged or not, in
    /// registration order. Collection resolution is built on this.
    pub(crate) fn collect_for_type(&self, type_id: TypeId) -> Vec<(ServiceKey, Arc<Factory>)> {
        let mut out = Vec::new();
        for (key, list) in self.services.enumerate() {
            if key.type_id == type_id {
                for factory in list.iter() {
                    out.push((key.clone(), Arc::clone(factory)));
                }
            }
        }
        out.sort_by_key(|(_, f)| f.id);
        out
    }

    #[cfg(feature = "diagnostics")]
    pub(crate) fn entries(&self) -> crate::map::Enumerate<'_, ServiceKey, FactoryList> {
        self.services.enumerate()
    }

    pub(crate) fn with_registered(
        &self,
        version: u64,
        key: ServiceKey,
        factory: Arc<Factory>,
        policy: IfConflict,
    ) -> DiResult<Self> {
        let hash = key.hash_value();
        let services = match self.services.try_find(hash, &key) {
            None => self.services.add_or_update(hash, key, Arc::new(vec![factory])),
            Some(existing) => match policy {
                IfConflict::Append => {
                    let mut list = (**existing).clone();
                    list.push(factory);
                    self.services.add_or_update(hash, key, Arc::new(list))
                }
                IfConflict::Replace => {
                    self.services.add_or_update(hash, key, Arc::new(vec![factory]))
                }
                IfConflict::Keep => self.services.clone(),
                IfConflict::Fail => {
                    return Err(DiError::RegistrationConflict {
                        service: key.type_name,
                        tag: key.tag,
                    })
                }
            },
        };
        Ok(Self { version, services, open: self.open.clone() })
    }

    pub(crate) fn with_unregistered(
        &self,
        version: u64,
        key: &ServiceKey,
        kind: Option<FactoryKind>,
    ) -> Self {
        let hash = key.hash_value();
        let services = match (self.services.try_find(hash, key), kind) {
            (None, _) => self.services.clone(),
            (Some(_), None) => self.services.remove(hash, key),
            (Some(list), Some(kind)) => {
                let remaining: Vec<Arc<Factory>> =
                    list.iter().filter(|f| f.kind() != kind).cloned().collect();
                if remaining.is_empty() {
                    self.services.remove(hash, key)
                } else {
                    self.services.add_or_update(hash, key.clone(), Arc::new(remaining))
                }
            }
        };
        Self { version, services, open: self.open.clone() }
    }

    pub(crate) fn with_open_registered(
        &self,
        version: u64,
        ctor: TypeId,
        family: Arc<OpenFamily>,
    ) -> Self {
        let hash = hash_of(&ctor);
        let open = match self.open.try_find(hash, &ctor) {
            None => self.open.add_or_update(hash, ctor, Arc::new(vec![family])),
            Some(existing) => {
                let mut list = (**existing).clone();
                list.push(family);
                self.open.add_or_update(hash, ctor, Arc::new(list))
            }
        };
        Self { version, services: self.services.clone(), open }
    }

    pub(crate) fn with_open_unregistered(&self, version: u64, ctor: &TypeId) -> Self {
        Self {
            version,
            services: self.services.clone(),
            open: self.open.remove(hash_of(ctor), ctor),
        }
    }
}

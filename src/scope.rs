//! Hierarchical, disposable instance stores.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, ReentrantMutex};

use crate::descriptor::AnyArc;
use crate::error::{DiError, DiResult};
use crate::factory::TrackFn;
use crate::internal::DisposeBag;
use crate::map::PersistentMap;

/// A disposable store of created instances with a defined lifetime boundary.
///
/// Scopes form a chain: every scope keeps a reference to its parent, named
/// scopes are found by walking that chain, and the root scope (owned by the
/// container) backs singletons. The slot map is append-only and published
/// through an atomic pointer, so readers never block.
///
/// Disposal is terminal: the disposed flag is checked on every slot access,
/// and a thread that captured the scope before teardown started still gets a
/// deterministic `ScopeDisposed` error afterwards.
pub struct Scope {
    name: Option<&'static str>,
    parent: Option<Arc<Scope>>,
    slots: ArcSwap<PersistentMap<u64, AnyArc>>,
    disposed: AtomicBool,
    bag: Mutex<DisposeBag>,
    /// Set for the implicit per-resolve scope, so a retained one is found
    /// again by later resolves through its handle.
    resolution: bool,
    /// Serializes slot fill when the container rules ask for it; otherwise
    /// two racing threads may both invoke a factory and one result is kept.
    /// Reentrant: filling one slot resolves dependencies that may fill
    /// other slots of the same scope on the same thread.
    slot_lock: Option<ReentrantMutex<()>>,
}

impl Scope {
    pub(crate) fn root(lock_slots: bool) -> Arc<Self> {
        Self::build(None, None, false, lock_slots)
    }

    pub(crate) fn child(
        parent: &Arc<Scope>,
        name: Option<&'static str>,
        lock_slots: bool,
    ) -> Arc<Self> {
        Self::build(name, Some(Arc::clone(parent)), false, lock_slots)
    }

    pub(crate) fn resolution_child(parent: &Arc<Scope>, lock_slots: bool) -> Arc<Self> {
        Self::build(None, Some(Arc::clone(parent)), true, lock_slots)
    }

    fn build(
        name: Option<&'static str>,
        parent: Option<Arc<Scope>>,
        resolution: bool,
        lock_slots: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            parent,
            slots: ArcSwap::from_pointee(PersistentMap::new()),
            disposed: AtomicBool::new(false),
            bag: Mutex::new(DisposeBag::default()),
            resolution,
            slot_lock: lock_slots.then(|| ReentrantMutex::new(())),
        })
    }

    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    pub(crate) fn is_resolution(&self) -> bool {
        self.resolution
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Nearest scope in the parent chain carrying `name`, including self.
    pub(crate) fn find_named(self: &Arc<Self>, name: &str) -> Option<Arc<Scope>> {
        let mut current = Some(Arc::clone(self));
        while let Some(scope) = current {
            if scope.name.map_or(false, |n| n == name) {
                return Some(scope);
            }
            current = scope.parent.clone();
        }
        None
    }

    /// Returns the instance cached at `slot`, invoking `make` on a miss.
    ///
    /// Without slot locking two threads can both run `make`; the published
    /// instance wins and the loser's result is dropped. The disposed flag is
    /// re-checked after publication so an instance never escapes a scope
    /// that was torn down mid-fill.
    pub(crate) fn get_or_add(
        &self,
        slot: u64,
        make: impl FnOnce() -> DiResult<AnyArc>,
        track: Option<&TrackFn>,
    ) -> DiResult<AnyArc> {
        if self.is_disposed() {
            return Err(DiError::ScopeDisposed { scope: self.name });
        }
        if let Some(existing) = self.slots.load().try_find(slot, &slot) {
            return Ok(existing.clone());
        }

        let _guard = self.slot_lock.as_ref().map(|m| m.lock());
        if self.slot_lock.is_some() {
            if let Some(existing) = self.slots.load().try_find(slot, &slot) {
                return Ok(existing.clone());
            }
        }

        let value = make()?;
        let mut winner = value.clone();
        let mut inserted = false;
        self.slots.rcu(|slots| match slots.try_find(slot, &slot) {
            Some(existing) => {
                winner = existing.clone();
                inserted = false;
                (**slots).clone()
            }
            None => {
                winner = value.clone();
                inserted = true;
                slots.add_or_update(slot, slot, value.clone())
            }
        });

        if self.is_disposed() {
            return Err(DiError::ScopeDisposed { scope: self.name });
        }
        if inserted {
            if let Some(track) = track {
                if let Some(hook) = track(&winner) {
                    self.push_disposer(hook)?;
                }
            }
        }
        Ok(winner)
    }

    /// Registers a disposal hook, run in reverse registration order when the
    /// scope is disposed. Fails once the scope is disposed.
    pub(crate) fn push_disposer(&self, hook: Box<dyn FnOnce() + Send>) -> DiResult<()> {
        let mut bag = self.bag.lock();
        // Checked under the bag lock: dispose sets the flag before draining,
        // so a hook pushed here is either rejected or drained.
        if self.is_disposed() {
            return Err(DiError::ScopeDisposed { scope: self.name });
        }
        bag.push(hook);
        Ok(())
    }

    /// Disposes the scope: releases tracked instances in reverse creation
    /// order and fails every later slot access. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut bag = self.bag.lock();
        bag.run_reverse();
        drop(bag);
        // Drop the cached instances too: disposal must leave no surviving
        // owner behind, not just run the hooks.
        self.slots.store(Arc::new(PersistentMap::new()));
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        // Last-resort teardown; the scoped handle normally disposed already.
        self.dispose();
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

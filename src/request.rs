//! Resolution request chains for cycle detection.
//!
//! A request is a borrowed link in the chain of services currently being
//! compiled. It exists only for the duration of one plan compilation; errors
//! copy the chain out as type names before the chain unwinds.

use crate::key::ServiceKey;

pub(crate) const MAX_DEPTH: usize = 1024;

pub(crate) struct Request<'a> {
    pub(crate) key: &'a ServiceKey,
    parent: Option<&'a Request<'a>>,
    pub(crate) depth: usize,
}

impl<'a> Request<'a> {
    pub(crate) fn root(key: &'a ServiceKey) -> Self {
        Self { key, parent: None, depth: 1 }
    }

    pub(crate) fn child(&'a self, key: &'a ServiceKey) -> Request<'a> {
        Request { key, parent: Some(self), depth: self.depth + 1 }
    }

    /// True when `key` already appears anywhere in this chain.
    pub(crate) fn contains(&self, key: &ServiceKey) -> bool {
        let mut current = Some(self);
        while let Some(req) = current {
            if req.key == key {
                return true;
            }
            current = req.parent;
        }
        false
    }

    /// Type names root-first, for error messages.
    pub(crate) fn chain_names(&self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(self.depth);
        let mut current = Some(self);
        while let Some(req) = current {
            names.push(req.key.type_name);
            current = req.parent;
        }
        names.reverse();
        names
    }

    pub(crate) fn info(&self) -> RequestInfo<'_> {
        RequestInfo { service: self.key, parent: self.parent.map(|p| p.key) }
    }
}

/// Read-only view of the request chain handed to condition predicates.
///
/// # Examples
///
/// ```
/// use ferric_di::RequestInfo;
///
/// fn only_under_repositories(info: &RequestInfo<'_>) -> bool {
///     info.parent().map_or(false, |p| p.type_name().contains("Repository"))
/// }
/// # let _ = only_under_repositories;
/// ```
pub struct RequestInfo<'a> {
    service: &'a ServiceKey,
    parent: Option<&'a ServiceKey>,
}

impl<'a> RequestInfo<'a> {
    /// The service being resolved.
    pub fn service(&self) -> &ServiceKey {
        self.service
    }

    /// The service that depends on it, if this is not the resolution root.
    pub fn parent(&self) -> Option<&ServiceKey> {
        self.parent
    }
}

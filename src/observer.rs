//! Observation hooks for resolution and scope lifecycle events.

use std::time::Duration;

use crate::key::ServiceKey;

/// Observer for container events.
///
/// Attach observers through `Rules::with_observer`; the container notifies
/// them around every top-level resolution and on scope open/dispose. All
/// methods have empty defaults so observers implement only what they need.
///
/// # Examples
///
/// ```
/// use ferric_di::{Container, DiObserver, Resolver, Reuse, Rules, ServiceKey};
/// use std::sync::Arc;
///
/// struct Counter(std::sync::atomic::AtomicUsize);
///
/// impl DiObserver for Counter {
///     fn resolving(&self, _service: &ServiceKey) {
///         self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
///     }
/// }
///
/// let counter = Arc::new(Counter(Default::default()));
/// let container = Container::with_rules(Rules::new().with_observer(counter.clone()));
/// container.register_delegate::<u32, _>(Reuse::Transient, |_| Ok(42u32)).unwrap();
/// let _ = container.resolve::<u32>().unwrap();
/// assert_eq!(counter.0.load(std::sync::atomic::Ordering::Relaxed), 1);
/// ```
pub trait DiObserver: Send + Sync {
    /// A top-level resolution is starting.
    fn resolving(&self, service: &ServiceKey) {
        let _ = service;
    }

    /// A top-level resolution finished (successfully or not).
    fn resolved(&self, service: &ServiceKey, elapsed: Duration) {
        let _ = (service, elapsed);
    }

    /// A scope was opened.
    fn scope_opened(&self, name: Option<&'static str>) {
        let _ = name;
    }

    /// A scope was disposed.
    fn scope_disposed(&self, name: Option<&'static str>) {
        let _ = name;
    }
}

/// Observer that writes events to stderr. Useful while debugging wiring.
pub struct LoggingObserver;

impl DiObserver for LoggingObserver {
    fn resolving(&self, service: &ServiceKey) {
        eprintln!("[ferric-di] resolving {}", service);
    }

    fn resolved(&self, service: &ServiceKey, elapsed: Duration) {
        eprintln!("[ferric-di] resolved {} in {:?}", service, elapsed);
    }

    fn scope_opened(&self, name: Option<&'static str>) {
        eprintln!("[ferric-di] scope opened: {}", name.unwrap_or("<unnamed>"));
    }

    fn scope_disposed(&self, name: Option<&'static str>) {
        eprintln!("[ferric-di] scope disposed: {}", name.unwrap_or("<unnamed>"));
    }
}

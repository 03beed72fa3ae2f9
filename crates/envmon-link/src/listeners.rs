//! Listener registry.
//!
//! Listeners are invoked synchronously, in registration order, once per
//! registration (the same `Arc` registered twice is called twice). A panic
//! in one listener is caught and logged; the rest still run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, error};

use crate::event::ConnectionEvent;

/// Callback receiving every [`ConnectionEvent`].
pub type Listener = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Ordered set of listeners; identity is the `Arc` allocation.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Listener>>,
}

/// Outcome of one dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that returned normally.
    pub delivered: usize,
    /// Listeners that panicked.
    pub panicked: usize,
}

impl ListenerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener.
    pub fn add(&self, listener: Listener) {
        self.listeners.write().push(listener);
    }

    /// Remove every registration of `listener`. Returns how many were removed.
    pub fn remove(&self, listener: &Listener) -> usize {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|existing| !same_listener(existing, listener));
        before - listeners.len()
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Call every listener with `event`.
    ///
    /// Works on a snapshot, so listeners may add or remove listeners while
    /// being called; changes apply from the next dispatch.
    pub fn dispatch(&self, event: &ConnectionEvent) -> DispatchReport {
        let snapshot: Vec<Listener> = self.listeners.read().clone();
        let mut report = DispatchReport::default();

        for (index, listener) in snapshot.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => report.delivered += 1,
                Err(panic) => {
                    report.panicked += 1;
                    error!(
                        listener = index,
                        panic = panic_message(panic.as_ref()),
                        "listener panicked"
                    );
                }
            }
        }
        report
    }
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Handle returned by `add_listener`; `remove()` unregisters that listener.
///
/// Dropping the handle does not unregister.
pub struct ListenerRemover {
    registry: Weak<ListenerRegistry>,
    listener: Listener,
}

impl ListenerRemover {
    pub(crate) fn new(registry: &Arc<ListenerRegistry>, listener: Listener) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            listener,
        }
    }

    /// Unregister the listener. Idempotent.
    pub fn remove(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let removed = registry.remove(&self.listener);
            debug!(removed, "listener removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use serde_json::json;
    use tracing::Level;

    use super::*;

    fn counter() -> (Listener, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let listener: Listener = Arc::new(move |_event: &ConnectionEvent| {
            let _ = seen.fetch_add(1, Ordering::SeqCst);
        });
        (listener, hits)
    }

    fn explode(_event: &ConnectionEvent) {
        panic!("listener exploded");
    }

    fn telemetry() -> ConnectionEvent {
        ConnectionEvent::Telemetry(json!({"temperature": 20.0}))
    }

    #[test]
    fn dispatch_in_registration_order() {
        let registry = ListenerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            registry.add(Arc::new(move |_event: &ConnectionEvent| order.lock().push(name)));
        }

        let report = registry.dispatch(&telemetry());
        assert_eq!(report.delivered, 3);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn duplicate_registration_called_twice() {
        let registry = ListenerRegistry::new();
        let (listener, hits) = counter();
        registry.add(Arc::clone(&listener));
        registry.add(Arc::clone(&listener));

        let _ = registry.dispatch(&telemetry());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn remove_by_reference_is_idempotent() {
        let registry = ListenerRegistry::new();
        let (kept, kept_hits) = counter();
        let (removed, removed_hits) = counter();
        registry.add(Arc::clone(&kept));
        registry.add(Arc::clone(&removed));

        assert_eq!(registry.remove(&removed), 1);
        assert_eq!(registry.remove(&removed), 0);
        assert_eq!(registry.len(), 1);

        let _ = registry.dispatch(&telemetry());
        assert_eq!(kept_hits.load(Ordering::SeqCst), 1);
        assert_eq!(removed_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn equal_closures_are_distinct_listeners() {
        let registry = ListenerRegistry::new();
        let a: Listener = Arc::new(|_event: &ConnectionEvent| {});
        let b: Listener = Arc::new(|_event: &ConnectionEvent| {});
        registry.add(Arc::clone(&a));
        registry.add(b);

        assert_eq!(registry.remove(&a), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let (logs, _guard) = envmon_core::logging::capture_logs();
        let registry = ListenerRegistry::new();
        registry.add(Arc::new(explode));
        let (listener, hits) = counter();
        registry.add(listener);

        let report = registry.dispatch(&telemetry());
        assert_eq!(report, DispatchReport { delivered: 1, panicked: 1 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let report = registry.dispatch(&telemetry());
        assert_eq!(report.delivered, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert!(logs.has_event(Level::ERROR, "listener panicked"));
        assert_eq!(
            logs.events()[0].field("panic"),
            Some("listener exploded")
        );
    }

    #[test]
    fn remover_handle() {
        let registry = Arc::new(ListenerRegistry::new());
        let (listener, hits) = counter();
        registry.add(Arc::clone(&listener));
        let remover = ListenerRemover::new(&registry, listener);

        remover.remove();
        remover.remove();
        assert!(registry.is_empty());

        let _ = registry.dispatch(&telemetry());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_may_modify_registry_during_dispatch() {
        let registry = Arc::new(ListenerRegistry::new());
        let inner = Arc::clone(&registry);
        registry.add(Arc::new(move |_event: &ConnectionEvent| {
            inner.add(Arc::new(|_event: &ConnectionEvent| {}));
        }));

        let report = registry.dispatch(&telemetry());
        assert_eq!(report.delivered, 1);
        assert_eq!(registry.len(), 2);
    }
}

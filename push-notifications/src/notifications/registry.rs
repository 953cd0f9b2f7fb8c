use crate::notifications::types::{Notification, NotificationKind};
use log::{debug, error as log_error};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callback invoked for every fan-out. Identity (for removal) is the `Arc`
/// allocation, so clone the handle you registered to remove it later.
pub type NotificationListener = Arc<dyn Fn(&Notification, NotificationKind) + Send + Sync>;

/// Wrap a closure as a [`NotificationListener`]
pub fn listener<F>(callback: F) -> NotificationListener
where
    F: Fn(&Notification, NotificationKind) + Send + Sync + 'static,
{
    Arc::new(callback)
}

/// Outcome of a single fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Ordered set of notification listeners.
///
/// Insertion order is fan-out order and duplicates are allowed. The list is
/// snapshotted at the start of each dispatch, so callbacks may add or remove
/// listeners without affecting the delivery already in progress.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<NotificationListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<NotificationListener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a listener. Adding the same handle twice delivers twice.
    pub fn add(&self, listener: NotificationListener) {
        let mut listeners = self.lock();
        listeners.push(listener);
        debug!("Listener added ({} registered)", listeners.len());
    }

    /// Remove every occurrence of `listener`. Returns how many were removed;
    /// zero when it was never registered.
    pub fn remove(&self, listener: &NotificationListener) -> usize {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|registered| !Arc::ptr_eq(registered, listener));
        let removed = before - listeners.len();
        if removed > 0 {
            debug!("Listener removed ({} occurrences, {} remaining)", removed, listeners.len());
        }
        removed
    }

    /// Deliver `(notification, kind)` to every listener in registration order.
    ///
    /// A panicking listener is logged and counted as failed; delivery carries
    /// on with the next one.
    pub fn dispatch(&self, notification: &Notification, kind: NotificationKind) -> DispatchReport {
        let snapshot: Vec<NotificationListener> = self.lock().clone();
        let mut report = DispatchReport::default();

        for (index, listener) in snapshot.iter().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(notification, kind)));
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(cause) => {
                    report.failed += 1;
                    log_error!(
                        "Notification listener #{} panicked on '{}' event for {}: {}",
                        index,
                        kind,
                        notification.summary(),
                        panic_message(cause.as_ref())
                    );
                }
            }
        }

        report
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop all listeners
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

fn panic_message(cause: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = cause.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type Calls = Arc<Mutex<Vec<(&'static str, Notification, NotificationKind)>>>;

    fn recorder(name: &'static str, calls: &Calls) -> NotificationListener {
        let calls = calls.clone();
        listener(move |notification, kind| {
            calls.lock().unwrap().push((name, notification.clone(), kind));
        })
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = ListenerRegistry::new();
        let calls: Calls = Arc::default();
        registry.add(recorder("cb1", &calls));
        registry.add(recorder("cb2", &calls));

        let event = Notification::from_value(json!({"id": 1}));
        let report = registry.dispatch(&event, NotificationKind::Received);

        let calls = calls.lock().unwrap();
        assert_eq!(report, DispatchReport { delivered: 2, failed: 0 });
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], ("cb1", event.clone(), NotificationKind::Received));
        assert_eq!(calls[1], ("cb2", event, NotificationKind::Received));
    }

    #[test]
    fn test_duplicate_listener_receives_each_occurrence() {
        let registry = ListenerRegistry::new();
        let calls: Calls = Arc::default();
        let cb = recorder("cb", &calls);
        registry.add(cb.clone());
        registry.add(cb);

        registry.dispatch(&Notification::default(), NotificationKind::Opened);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_remove_drops_all_occurrences() {
        let registry = ListenerRegistry::new();
        let calls: Calls = Arc::default();
        let cb1 = recorder("cb1", &calls);
        registry.add(cb1.clone());
        registry.add(cb1.clone());
        registry.add(recorder("cb2", &calls));

        assert_eq!(registry.remove(&cb1), 2);
        registry.dispatch(&Notification::default(), NotificationKind::Received);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "cb2");
    }

    #[test]
    fn test_remove_unknown_listener_is_noop() {
        let registry = ListenerRegistry::new();
        let calls: Calls = Arc::default();
        registry.add(recorder("cb1", &calls));

        let stranger = recorder("never-added", &calls);
        assert_eq!(registry.remove(&stranger), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_equal_closures_are_distinct_listeners() {
        let registry = ListenerRegistry::new();
        let a = listener(|_, _| {});
        let b = listener(|_, _| {});
        registry.add(a.clone());
        registry.add(b);

        registry.remove(&a);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let registry = ListenerRegistry::new();
        let calls: Calls = Arc::default();
        registry.add(listener(|_, _| panic!("listener failure")));
        registry.add(recorder("after", &calls));

        let report = registry.dispatch(&Notification::default(), NotificationKind::Received);

        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_listener_can_remove_itself_during_dispatch() {
        let registry = Arc::new(ListenerRegistry::new());
        let calls: Calls = Arc::default();
        let slot: Arc<Mutex<Option<NotificationListener>>> = Arc::default();

        let self_removing = {
            let registry = registry.clone();
            let slot = slot.clone();
            listener(move |_, _| {
                if let Some(me) = slot.lock().unwrap().as_ref() {
                    registry.remove(me);
                }
            })
        };
        *slot.lock().unwrap() = Some(self_removing.clone());
        registry.add(self_removing);
        registry.add(recorder("second", &calls));

        registry.dispatch(&Notification::default(), NotificationKind::Received);
        registry.dispatch(&Notification::default(), NotificationKind::Received);

        assert_eq!(registry.len(), 1);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_dispatch_on_empty_registry() {
        let registry = ListenerRegistry::new();
        let report = registry.dispatch(&Notification::default(), NotificationKind::Opened);
        assert_eq!(report, DispatchReport::default());
        assert!(registry.is_empty());
    }
}

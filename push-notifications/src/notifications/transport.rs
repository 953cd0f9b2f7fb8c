use crate::notifications::error::Result;
use crate::notifications::types::{
    ForegroundPresentation, Notification, RegisteredEvent, RegistrationError,
};
use log::{debug, info as log_info, warn as log_warn};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Foreground delivery; the return value is the completion acknowledgement.
pub type ForegroundHandler = Arc<dyn Fn(Notification) -> ForegroundPresentation + Send + Sync>;
/// The user opened a notification; returning acknowledges it.
pub type OpenedHandler = Arc<dyn Fn(Notification) + Send + Sync>;
pub type RegisteredHandler = Arc<dyn Fn(RegisteredEvent) + Send + Sync>;
pub type RegistrationFailedHandler = Arc<dyn Fn(RegistrationError) + Send + Sync>;

/// The platform push service, seen from the app.
///
/// Implementations may invoke handlers from any thread. Every subscription
/// returns a [`Subscription`] that must be disposed on teardown.
pub trait NotificationTransport: Send + Sync {
    /// Ask the platform for a device token. The outcome arrives through the
    /// registered / registration-failed subscriptions.
    fn register_for_remote_notifications(&self) -> Result<()>;

    fn on_received_foreground(&self, handler: ForegroundHandler) -> Subscription;

    fn on_opened(&self, handler: OpenedHandler) -> Subscription;

    fn on_registered(&self, handler: RegisteredHandler) -> Subscription;

    fn on_registration_failed(&self, handler: RegistrationFailedHandler) -> Subscription;
}

/// Disposable handle for a transport event subscription.
///
/// Dropping a handle that was never disposed unregisters it as well.
pub struct Subscription {
    label: &'static str,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F>(label: &'static str, cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            label,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    pub fn dispose(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
            debug!("Disposed '{}' subscription", self.label);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Handlers for one event type, keyed by subscription id
struct HandlerSlot<H> {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, H)>>,
}

impl<H: Clone + Send + 'static> HandlerSlot<H> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(Vec::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(u64, H)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(self: &Arc<Self>, label: &'static str, handler: H) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, handler));

        let slot: Weak<Self> = Arc::downgrade(self);
        Subscription::new(label, move || {
            if let Some(slot) = slot.upgrade() {
                slot.lock().retain(|(handler_id, _)| *handler_id != id);
            }
        })
    }

    fn snapshot(&self) -> Vec<H> {
        self.lock().iter().map(|(_, handler)| handler.clone()).collect()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Preset answer to `register_for_remote_notifications`
#[derive(Debug, Clone)]
enum RegistrationOutcome {
    Token(String),
    Failure(RegistrationError),
}

/// In-process transport. Events are injected with the `emit_*` methods and
/// delivered synchronously to the current subscribers on the caller's thread.
pub struct LocalTransport {
    foreground: Arc<HandlerSlot<ForegroundHandler>>,
    opened: Arc<HandlerSlot<OpenedHandler>>,
    registered: Arc<HandlerSlot<RegisteredHandler>>,
    registration_failed: Arc<HandlerSlot<RegistrationFailedHandler>>,
    registration_requests: AtomicUsize,
    outcome: Mutex<Option<RegistrationOutcome>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            foreground: HandlerSlot::new(),
            opened: HandlerSlot::new(),
            registered: HandlerSlot::new(),
            registration_failed: HandlerSlot::new(),
            registration_requests: AtomicUsize::new(0),
            outcome: Mutex::new(None),
        }
    }

    /// Answer registration requests with this device token
    pub fn with_device_token(self, token: impl Into<String>) -> Self {
        self.set_outcome(RegistrationOutcome::Token(token.into()));
        self
    }

    /// Answer registration requests with this failure
    pub fn with_registration_failure(self, error: RegistrationError) -> Self {
        self.set_outcome(RegistrationOutcome::Failure(error));
        self
    }

    fn set_outcome(&self, outcome: RegistrationOutcome) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }

    /// Deliver a foreground notification. Returns the presentation chosen by
    /// the last handler, or `None` when nobody is subscribed.
    pub fn emit_received_foreground(&self, notification: Notification) -> Option<ForegroundPresentation> {
        let handlers = self.foreground.snapshot();
        if handlers.is_empty() {
            log_warn!("Foreground notification dropped, no subscriber: {}", notification.summary());
            return None;
        }

        let mut presentation = None;
        for handler in handlers {
            presentation = Some(handler(notification.clone()));
        }
        presentation
    }

    /// Deliver an opened notification. Returns how many handlers acknowledged it.
    pub fn emit_opened(&self, notification: Notification) -> usize {
        let handlers = self.opened.snapshot();
        if handlers.is_empty() {
            log_warn!("Opened notification dropped, no subscriber: {}", notification.summary());
        }
        for handler in &handlers {
            handler(notification.clone());
        }
        handlers.len()
    }

    pub fn emit_registered(&self, device_token: impl Into<String>) -> usize {
        let event = RegisteredEvent {
            device_token: device_token.into(),
        };
        let handlers = self.registered.snapshot();
        for handler in &handlers {
            handler(event.clone());
        }
        handlers.len()
    }

    pub fn emit_registration_failed(&self, error: RegistrationError) -> usize {
        let handlers = self.registration_failed.snapshot();
        for handler in &handlers {
            handler(error.clone());
        }
        handlers.len()
    }

    /// Number of `register_for_remote_notifications` calls so far
    pub fn registration_requests(&self) -> usize {
        self.registration_requests.load(Ordering::SeqCst)
    }

    /// Live subscriptions across all four event types
    pub fn subscriber_count(&self) -> usize {
        self.foreground.len() + self.opened.len() + self.registered.len() + self.registration_failed.len()
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationTransport for LocalTransport {
    fn register_for_remote_notifications(&self) -> Result<()> {
        self.registration_requests.fetch_add(1, Ordering::SeqCst);
        log_info!("Registering for remote notifications");

        let outcome = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match outcome {
            Some(RegistrationOutcome::Token(token)) => {
                self.emit_registered(token);
            }
            Some(RegistrationOutcome::Failure(error)) => {
                self.emit_registration_failed(error);
            }
            None => debug!("No preset registration outcome, waiting for an external event"),
        }
        Ok(())
    }

    fn on_received_foreground(&self, handler: ForegroundHandler) -> Subscription {
        self.foreground.subscribe("received_foreground", handler)
    }

    fn on_opened(&self, handler: OpenedHandler) -> Subscription {
        self.opened.subscribe("opened", handler)
    }

    fn on_registered(&self, handler: RegisteredHandler) -> Subscription {
        self.registered.subscribe("registered", handler)
    }

    fn on_registration_failed(&self, handler: RegistrationFailedHandler) -> Subscription {
        self.registration_failed.subscribe("registration_failed", handler)
    }
}

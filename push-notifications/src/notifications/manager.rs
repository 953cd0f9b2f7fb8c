use crate::notifications::{
    error::{NotificationError, Result},
    permission::PermissionService,
    registry::{DispatchReport, ListenerRegistry, NotificationListener},
    settings::{validate_settings, NotificationSettings},
    storage::KeyValueStore,
    transport::{NotificationTransport, Subscription},
    types::{
        ForegroundPresentation, Notification, NotificationKind, NotificationState,
        RegisteredEvent, RegistrationError,
    },
};
use log::{debug, error as log_error, info as log_info, warn as log_warn};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::RwLock;

/// Central notification service: mirrors transport events into storage and
/// fans them out to registered listeners.
pub struct NotificationManager {
    core: Arc<ManagerCore>,
    transport: Arc<dyn NotificationTransport>,
    permission: Arc<dyn PermissionService>,
    subscriptions: Mutex<Vec<Subscription>>,
    initialized: RwLock<bool>,
}

/// The part of the manager shared with transport handlers
struct ManagerCore {
    settings: NotificationSettings,
    store: Arc<dyn KeyValueStore>,
    state: Mutex<NotificationState>,
    listeners: ListenerRegistry,
}

impl NotificationManager {
    /// Create a manager and hydrate its state from `store`
    pub fn new(
        settings: NotificationSettings,
        transport: Arc<dyn NotificationTransport>,
        permission: Arc<dyn PermissionService>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        validate_settings(&settings)?;

        let keys = &settings.storage_keys;
        let state = NotificationState {
            notifications: hydrate(store.as_ref(), &keys.notifications).unwrap_or_default(),
            last_notification: hydrate(store.as_ref(), &keys.last_notification),
            device_token: hydrate(store.as_ref(), &keys.device_token),
        };
        log_info!(
            "NotificationManager created ({} stored notifications, device token {})",
            state.notifications.len(),
            if state.device_token.is_some() { "present" } else { "absent" }
        );

        Ok(Self {
            core: Arc::new(ManagerCore {
                settings,
                store,
                state: Mutex::new(state),
                listeners: ListenerRegistry::new(),
            }),
            transport,
            permission,
            subscriptions: Mutex::new(Vec::new()),
            initialized: RwLock::new(false),
        })
    }

    /// Mount: subscribe to the transport, request permission, then register
    /// for remote notifications. Calling it again is a no-op.
    pub async fn initialize(&self) -> Result<()> {
        let mut initialized = self.initialized.write().await;
        if *initialized {
            return Ok(());
        }

        log_info!("Initializing notification system...");
        self.subscribe_transport();

        match self.permission.request().await {
            Ok(true) => log_info!("Notification permission granted"),
            Ok(false) => log_warn!("Notification permission denied, registering anyway"),
            Err(e) => log_error!("Failed to request notification permission: {}", e),
        }

        if let Err(e) = self.transport.register_for_remote_notifications() {
            log_error!("Remote notification registration could not be started: {}", e);
        }

        *initialized = true;
        log_info!("Notification system initialized successfully");
        Ok(())
    }

    fn subscribe_transport(&self) {
        let foreground = {
            let core = self.core.clone();
            self.transport
                .on_received_foreground(Arc::new(move |n: Notification| core.on_received_foreground(n)))
        };
        let opened = {
            let core = self.core.clone();
            self.transport
                .on_opened(Arc::new(move |n: Notification| core.on_opened(n)))
        };
        let registered = {
            let core = self.core.clone();
            self.transport
                .on_registered(Arc::new(move |event: RegisteredEvent| core.on_registered(event)))
        };
        let failed = self.transport.on_registration_failed(Arc::new(|error: RegistrationError| {
            log_warn!("Failed to register for remote notifications: {}", error);
        }));

        let mut subscriptions = self.lock_subscriptions();
        subscriptions.extend([foreground, opened, registered, failed]);
    }

    /// Unmount: dispose every transport subscription. Listeners and state
    /// are kept so the manager can be initialized again.
    pub async fn shutdown(&self) {
        let mut initialized = self.initialized.write().await;

        let subscriptions: Vec<Subscription> = self.lock_subscriptions().drain(..).collect();
        let count = subscriptions.len();
        for subscription in subscriptions {
            subscription.dispose();
        }

        if *initialized {
            log_info!("Notification system shut down ({} subscriptions disposed)", count);
        }
        *initialized = false;
    }

    pub async fn is_ready(&self) -> bool {
        *self.initialized.read().await
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of history, last notification and device token
    pub fn state(&self) -> NotificationState {
        self.core.lock_state().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.core.lock_state().notifications.clone()
    }

    pub fn last_notification(&self) -> Option<Notification> {
        self.core.lock_state().last_notification.clone()
    }

    pub fn device_token(&self) -> Option<String> {
        self.core.lock_state().device_token.clone()
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.core.settings
    }

    pub fn add_listener(&self, listener: NotificationListener) {
        self.core.listeners.add(listener);
    }

    /// Remove every registration of `listener`; returns how many were removed
    pub fn remove_listener(&self, listener: &NotificationListener) -> usize {
        self.core.listeners.remove(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.core.listeners.len()
    }

    /// Forget the stored history and last notification
    pub fn clear_history(&self) {
        let keys = &self.core.settings.storage_keys;
        let mut state = self.core.lock_state();
        state.notifications.clear();
        state.last_notification = None;
        self.core.persist(&keys.notifications, &state.notifications);
        self.core.persist(&keys.last_notification, &state.last_notification);
        log_info!("Notification history cleared");
    }
}

impl ManagerCore {
    fn lock_state(&self) -> MutexGuard<'_, NotificationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_received_foreground(&self, notification: Notification) -> ForegroundPresentation {
        log_info!("Notification received in foreground: {}", notification.summary());

        {
            let keys = &self.settings.storage_keys;
            let mut state = self.lock_state();
            state.last_notification = Some(notification.clone());
            state.notifications.push(notification.clone());
            self.persist(&keys.last_notification, &state.last_notification);
            self.persist(&keys.notifications, &state.notifications);
        }

        self.fan_out(&notification, NotificationKind::Received);
        self.settings.foreground_presentation
    }

    fn on_opened(&self, notification: Notification) {
        log_info!("Notification opened: {}", notification.summary());

        {
            let keys = &self.settings.storage_keys;
            let mut state = self.lock_state();
            state.last_notification = Some(notification.clone());
            self.persist(&keys.last_notification, &state.last_notification);
        }

        self.fan_out(&notification, NotificationKind::Opened);
    }

    fn on_registered(&self, event: RegisteredEvent) {
        {
            let mut state = self.lock_state();
            state.device_token = Some(event.device_token.clone());
            self.persist(&self.settings.storage_keys.device_token, &state.device_token);
        }
        log_info!("Device registered for remote notifications: {}", event.device_token);
    }

    fn fan_out(&self, notification: &Notification, kind: NotificationKind) -> DispatchReport {
        let report = self.listeners.dispatch(notification, kind);
        if report.failed > 0 {
            log_warn!(
                "{} of {} notification listeners failed on '{}' event",
                report.failed,
                report.delivered + report.failed,
                kind
            );
        } else {
            debug!("Delivered '{}' event to {} listeners", kind, report.delivered);
        }
        report
    }

    /// Write-through to the store. Failures are logged; in-memory state and
    /// fan-out are not affected.
    fn persist<T: Serialize>(&self, key: &str, value: &T) {
        let result = serde_json::to_value(value)
            .map_err(NotificationError::from)
            .and_then(|json| self.store.set(key, json));
        if let Err(e) = result {
            log_error!("Failed to persist '{}': {}", key, e);
        }
    }
}

/// Read a stored value; missing, null or unreadable entries yield `None`
fn hydrate<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    match store.get(key) {
        Ok(None) | Ok(Some(Value::Null)) => None,
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                log_warn!("Ignoring unreadable stored value for '{}': {}", key, e);
                None
            }
        },
        Err(e) => {
            log_error!("Failed to read '{}' from store: {}", key, e);
            None
        }
    }
}

// Push notification service module
pub mod commands;
pub mod error;
pub mod manager;
pub mod permission;
pub mod registry;
pub mod settings;
pub mod storage;
pub mod transport;
pub mod types;

// Re-export main types for easy access
pub use error::{NotificationError, Result};
pub use manager::NotificationManager;
pub use permission::{
    AlwaysGranted, GatedPermission, PermissionPrompt, PermissionService, PermissionStatus,
    Platform, StaticPrompt,
};
pub use registry::{listener, DispatchReport, ListenerRegistry, NotificationListener};
pub use settings::{NotificationSettings, StorageKeys};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
pub use transport::{LocalTransport, NotificationTransport, Subscription};
pub use types::{
    ForegroundPresentation, Notification, NotificationKind, NotificationState, RegisteredEvent,
    RegistrationError,
};

pub use commands::{
    add_notification_listener,
    clear_notification_history,
    get_notification_state,
    is_notification_system_ready,
    mount,
    new_manager_state,
    remove_notification_listener,
    unmount,
    use_notification,
    NotificationManagerState,
};

use crate::notifications::{
    error::{NotificationError, Result},
    manager::NotificationManager,
    registry::NotificationListener,
    types::NotificationState,
};

use log::info as log_info;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared notification manager slot. `Some` only between `mount` and `unmount`.
pub type NotificationManagerState = Arc<RwLock<Option<Arc<NotificationManager>>>>;

pub fn new_manager_state() -> NotificationManagerState {
    Arc::new(RwLock::new(None))
}

/// Initialize `manager` and place it in the slot. A manager that was
/// already mounted is shut down first.
///
/// The slot stays write-locked for the whole swap, so concurrent mounts are
/// serialized and readers wait for the new manager instead of seeing an
/// empty slot.
pub async fn mount(
    state: &NotificationManagerState,
    manager: NotificationManager,
) -> Result<Arc<NotificationManager>> {
    log_info!("Mounting notification provider...");

    let mut slot = state.write().await;
    if let Some(previous) = slot.take() {
        log_info!("Replacing previously mounted notification manager");
        previous.shutdown().await;
    }

    manager.initialize().await?;
    let manager = Arc::new(manager);
    *slot = Some(manager.clone());
    drop(slot);

    log_info!("Notification provider mounted");
    Ok(manager)
}

/// Empty the slot and tear the manager down. Returns `false` if nothing was mounted.
pub async fn unmount(state: &NotificationManagerState) -> bool {
    let manager = state.write().await.take();
    match manager {
        Some(manager) => {
            manager.shutdown().await;
            log_info!("Notification provider unmounted");
            true
        }
        None => false,
    }
}

/// Access the mounted manager; fails with a usage error outside the
/// mount/unmount lifecycle.
pub async fn use_notification(state: &NotificationManagerState) -> Result<Arc<NotificationManager>> {
    state
        .read()
        .await
        .as_ref()
        .cloned()
        .ok_or(NotificationError::NotMounted)
}

/// Get the mirrored notification state
pub async fn get_notification_state(state: &NotificationManagerState) -> Result<NotificationState> {
    Ok(use_notification(state).await?.state())
}

pub async fn add_notification_listener(
    listener: NotificationListener,
    state: &NotificationManagerState,
) -> Result<()> {
    use_notification(state).await?.add_listener(listener);
    Ok(())
}

pub async fn remove_notification_listener(
    listener: &NotificationListener,
    state: &NotificationManagerState,
) -> Result<usize> {
    Ok(use_notification(state).await?.remove_listener(listener))
}

pub async fn clear_notification_history(state: &NotificationManagerState) -> Result<()> {
    log_info!("Clearing notification history");
    use_notification(state).await?.clear_history();
    Ok(())
}

/// `false` when no provider is mounted
pub async fn is_notification_system_ready(state: &NotificationManagerState) -> bool {
    match state.read().await.as_ref() {
        Some(manager) => manager.is_ready().await,
        None => false,
    }
}

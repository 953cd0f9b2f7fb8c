pub mod bridge;
pub mod notifications;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error as log_error, info as log_info};

use bridge::{run_bridge, BridgeSummary};
use notifications::{
    GatedPermission, JsonFileStore, LocalTransport, NotificationManager, NotificationSettings,
    PermissionStatus, StaticPrompt,
};

/// Options the host decides outside of the settings file
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Answer given to the notification permission prompt
    pub permission: PermissionStatus,
    /// Token the transport reports when registration is requested
    pub device_token: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            permission: PermissionStatus::Granted,
            device_token: None,
        }
    }
}

/// Wire the service together, mount it, serve the JSON-lines bridge on
/// stdin/stdout until EOF or `shutdown`, then unmount.
pub async fn run(settings: NotificationSettings, options: RunOptions) -> Result<BridgeSummary> {
    let store_path = settings
        .resolved_store_path()
        .context("Failed to resolve notification store path")?;
    let store = Arc::new(
        JsonFileStore::open(&store_path)
            .with_context(|| format!("Failed to open notification store {}", store_path.display()))?,
    );

    let permission = Arc::new(GatedPermission::new(
        settings.platform,
        settings.api_level,
        StaticPrompt(options.permission),
    ));

    let mut transport = LocalTransport::new();
    if let Some(token) = options.device_token {
        transport = transport.with_device_token(token);
    }
    let transport = Arc::new(transport);

    let manager = NotificationManager::new(settings, transport.clone(), permission, store)
        .context("Failed to create notification manager")?;

    let state = notifications::new_manager_state();
    let manager = notifications::mount(&state, manager)
        .await
        .context("Failed to mount notification provider")?;

    log_info!("Serving notification bridge on stdin/stdout");
    let bridge_manager = manager.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut writer = stdout.lock();
        run_bridge(stdin.lock(), &mut writer, &transport, &bridge_manager)
    })
    .await
    .context("Bridge task panicked");

    notifications::unmount(&state).await;

    let summary = match outcome {
        Ok(Ok(summary)) => summary,
        Ok(Err(e)) | Err(e) => {
            log_error!("Notification bridge failed: {:#}", e);
            return Err(e);
        }
    };

    let final_state = manager.state();
    log_info!(
        "Final state: {} notifications, device token {}",
        final_state.notifications.len(),
        final_state.device_token.as_deref().unwrap_or("<none>")
    );
    Ok(summary)
}

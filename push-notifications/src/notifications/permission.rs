// Notification permission handling
use crate::notifications::error::Result;
use async_trait::async_trait;
use log::{info as log_info, warn as log_warn};
use serde::{Deserialize, Serialize};

/// Android permission string for runtime notification consent
pub const POST_NOTIFICATIONS: &str = "android.permission.POST_NOTIFICATIONS";

/// First Android API level (13 / Tiramisu) that gates notifications behind a
/// runtime permission
pub const POST_NOTIFICATIONS_API_LEVEL: u32 = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Desktop,
}

impl Platform {
    #[cfg(target_os = "android")]
    pub fn current() -> Self {
        Platform::Android
    }

    #[cfg(target_os = "ios")]
    pub fn current() -> Self {
        Platform::Ios
    }

    #[cfg(not(any(target_os = "android", target_os = "ios")))]
    pub fn current() -> Self {
        Platform::Desktop
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::current()
    }
}

/// Answer from the OS permission dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    NeverAskAgain,
}

/// Capability query: may this app post notifications?
#[async_trait]
pub trait PermissionService: Send + Sync {
    async fn request(&self) -> Result<bool>;
}

/// Shows the platform permission dialog for a named permission
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    async fn prompt(&self, permission: &str) -> Result<PermissionStatus>;
}

/// For platforms where notification permission is implicit
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

#[async_trait]
impl PermissionService for AlwaysGranted {
    async fn request(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Prompt that always returns the same answer. Used when the host has
/// already collected consent out of band.
#[derive(Debug, Clone, Copy)]
pub struct StaticPrompt(pub PermissionStatus);

#[async_trait]
impl PermissionPrompt for StaticPrompt {
    async fn prompt(&self, _permission: &str) -> Result<PermissionStatus> {
        Ok(self.0)
    }
}

/// Prompts only where the platform requires it (Android 13+); everywhere
/// else permission is reported as granted without asking.
pub struct GatedPermission<P> {
    platform: Platform,
    api_level: u32,
    prompt: P,
}

impl<P: PermissionPrompt> GatedPermission<P> {
    pub fn new(platform: Platform, api_level: u32, prompt: P) -> Self {
        Self {
            platform,
            api_level,
            prompt,
        }
    }

    pub fn requires_prompt(&self) -> bool {
        self.platform == Platform::Android && self.api_level >= POST_NOTIFICATIONS_API_LEVEL
    }
}

#[async_trait]
impl<P: PermissionPrompt> PermissionService for GatedPermission<P> {
    async fn request(&self) -> Result<bool> {
        if !self.requires_prompt() {
            log_info!(
                "Notification permission not required on {:?} (API level {})",
                self.platform, self.api_level
            );
            return Ok(true);
        }

        log_info!("Requesting {} permission", POST_NOTIFICATIONS);
        let status = self.prompt.prompt(POST_NOTIFICATIONS).await?;
        match status {
            PermissionStatus::Granted => {
                log_info!("Notification permission granted");
                Ok(true)
            }
            PermissionStatus::Denied | PermissionStatus::NeverAskAgain => {
                log_warn!("Notification permission not granted: {:?}", status);
                Ok(false)
            }
        }
    }
}

use crate::notifications::error::{NotificationError, Result};
use crate::notifications::permission::Platform;
use crate::notifications::types::ForegroundPresentation;
use log::info as log_info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "push-notifications";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Storage keys for the mirrored state
    pub storage_keys: StorageKeys,

    /// Where the key-value store lives; `None` means the platform data dir
    pub store_path: Option<PathBuf>,

    /// Completion acknowledgement for foreground notifications
    pub foreground_presentation: ForegroundPresentation,

    /// Platform used for permission gating
    pub platform: Platform,

    /// OS API level (Android SDK int); ignored elsewhere
    pub api_level: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    pub notifications: String,
    pub last_notification: String,
    pub device_token: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            storage_keys: StorageKeys::default(),
            store_path: None,
            foreground_presentation: ForegroundPresentation::default(),
            platform: Platform::current(),
            api_level: 0,
        }
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            notifications: "_push_notifications".to_string(),
            last_notification: "_last_push_notification".to_string(),
            device_token: "_device_token".to_string(),
        }
    }
}

impl NotificationSettings {
    /// Store path, falling back to `<data dir>/push-notifications/store.json`
    pub fn resolved_store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => {
                let mut path = dirs::data_dir()
                    .ok_or_else(|| Self::invalid("Could not find data directory"))?;
                path.push(APP_DIR);
                path.push("store.json");
                Ok(path)
            }
        }
    }

    fn invalid(message: impl Into<String>) -> NotificationError {
        NotificationError::InvalidSettings(message.into())
    }
}

/// Default location of the settings file
pub fn default_settings_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| {
        NotificationSettings::invalid("Could not find config directory")
    })?;
    path.push(APP_DIR);
    path.push("settings.json");
    Ok(path)
}

/// Load settings from disk; a missing file yields defaults
pub async fn load_settings(path: &Path) -> Result<NotificationSettings> {
    if !path.exists() {
        log_info!("No notification settings file at {}, using defaults", path.display());
        return Ok(NotificationSettings::default());
    }

    let content = tokio::fs::read_to_string(path).await?;
    let settings: NotificationSettings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    log_info!("Loaded notification settings from {}", path.display());
    Ok(settings)
}

/// Save settings to disk, creating the parent directory
pub async fn save_settings(path: &Path, settings: &NotificationSettings) -> Result<()> {
    validate_settings(settings)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let content = serde_json::to_string_pretty(settings)?;
    tokio::fs::write(path, content).await?;

    log_info!("Saved notification settings to {}", path.display());
    Ok(())
}

/// Storage keys must be non-empty and distinct, or state would overwrite itself
pub fn validate_settings(settings: &NotificationSettings) -> Result<()> {
    let keys = &settings.storage_keys;
    let all = [
        ("notifications", &keys.notifications),
        ("last_notification", &keys.last_notification),
        ("device_token", &keys.device_token),
    ];

    for (name, key) in &all {
        if key.trim().is_empty() {
            return Err(NotificationSettings::invalid(format!("storage key '{}' is empty", name)));
        }
    }

    for (i, (name, key)) in all.iter().enumerate() {
        for (other_name, other_key) in &all[i + 1..] {
            if key == other_key {
                return Err(NotificationSettings::invalid(format!(
                    "storage keys '{}' and '{}' are both '{}'",
                    name, other_name, key
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_keys_are_valid() {
        assert!(validate_settings(&NotificationSettings::default()).is_ok());
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let mut settings = NotificationSettings::default();
        settings.storage_keys.device_token = settings.storage_keys.notifications.clone();
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut settings = NotificationSettings::default();
        settings.storage_keys.last_notification = "  ".to_string();
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: NotificationSettings =
            serde_json::from_str(r#"{"api_level": 34, "platform": "android"}"#).unwrap();
        assert_eq!(settings.api_level, 34);
        assert_eq!(settings.platform, Platform::Android);
        assert_eq!(settings.storage_keys, StorageKeys::default());
    }

    #[test]
    fn test_explicit_store_path_wins() {
        let settings = NotificationSettings {
            store_path: Some(PathBuf::from("/tmp/store.json")),
            ..Default::default()
        };
        assert_eq!(settings.resolved_store_path().unwrap(), PathBuf::from("/tmp/store.json"));
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = load_settings(&dir.path().join("absent.json")).await.unwrap();
        assert_eq!(settings, NotificationSettings::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg").join("settings.json");
        let settings = NotificationSettings {
            api_level: 33,
            platform: Platform::Android,
            ..Default::default()
        };

        save_settings(&path, &settings).await.unwrap();
        let loaded = load_settings(&path).await.unwrap();
        assert_eq!(loaded, settings);
    }
}

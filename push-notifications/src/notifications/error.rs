use thiserror::Error;

/// Errors surfaced by the notification service
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("use_notification must be used within a mounted NotificationProvider")]
    NotMounted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Permission request failed: {0}")]
    Permission(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

pub type Result<T> = std::result::Result<T, NotificationError>;

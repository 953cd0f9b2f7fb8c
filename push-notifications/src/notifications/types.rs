use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A remote notification as delivered by the transport.
///
/// The payload is platform-defined, so it is kept as an opaque JSON object.
/// Once received it is never mutated; history and "last notification" hold
/// clones of the same record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Notification {
    payload: Map<String, Value>,
}

/// Which transport event produced a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Delivered while the app was in the foreground
    Received,
    /// The user tapped the notification
    Opened,
}

/// Completion acknowledgement for a foreground notification: how the OS
/// should present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundPresentation {
    pub alert: bool,
    pub sound: bool,
    pub badge: bool,
}

/// Successful remote registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredEvent {
    pub device_token: String,
}

/// Failed remote registration, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationError {
    pub code: Option<i64>,
    pub message: String,
}

/// Snapshot of everything the service mirrors into storage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationState {
    pub notifications: Vec<Notification>,
    pub last_notification: Option<Notification>,
    pub device_token: Option<String>,
}

impl Notification {
    pub fn new(payload: Map<String, Value>) -> Self {
        Self { payload }
    }

    /// Build a notification from any JSON value. Non-object values are
    /// wrapped under a `"data"` key so the payload is always an object.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(payload) => Self { payload },
            Value::Null => Self::default(),
            other => {
                let mut payload = Map::new();
                payload.insert("data".to_string(), other);
                Self { payload }
            }
        }
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }

    /// Platform identifier, falling back to `id`. Numeric ids are rendered
    /// as strings.
    pub fn identifier(&self) -> Option<String> {
        ["identifier", "id"]
            .iter()
            .find_map(|key| match self.payload.get(*key) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
    }

    pub fn title(&self) -> Option<&str> {
        self.payload.get("title").and_then(Value::as_str)
    }

    pub fn body(&self) -> Option<&str> {
        self.payload.get("body").and_then(Value::as_str)
    }

    /// Short label for log lines
    pub fn summary(&self) -> String {
        match (self.identifier(), self.title()) {
            (Some(id), Some(title)) => format!("{} ({})", title, id),
            (None, Some(title)) => title.to_string(),
            (Some(id), None) => id,
            (None, None) => format!("<{} fields>", self.payload.len()),
        }
    }
}

impl From<Value> for Notification {
    fn from(value: Value) -> Self {
        Notification::from_value(value)
    }
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Received => "received",
            NotificationKind::Opened => "opened",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for ForegroundPresentation {
    fn default() -> Self {
        Self {
            alert: true,
            sound: true,
            badge: false,
        }
    }
}

impl std::fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

impl RegistrationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identifier_accepts_numeric_id() {
        let notification = Notification::from_value(json!({"id": 1}));
        assert_eq!(notification.identifier(), Some("1".to_string()));
    }

    #[test]
    fn test_identifier_prefers_platform_identifier() {
        let notification = Notification::from_value(json!({"identifier": "abc", "id": 7}));
        assert_eq!(notification.identifier(), Some("abc".to_string()));
    }

    #[test]
    fn test_non_object_payload_is_wrapped() {
        let notification = Notification::from_value(json!("hello"));
        assert_eq!(notification.get("data"), Some(&json!("hello")));
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&NotificationKind::Opened).unwrap(), "\"opened\"");
        assert_eq!(NotificationKind::Received.to_string(), "received");
    }

    #[test]
    fn test_state_uses_camel_case_keys() {
        let state = NotificationState {
            notifications: vec![],
            last_notification: None,
            device_token: Some("tok".to_string()),
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["deviceToken"], json!("tok"));
        assert!(value.get("lastNotification").is_some());
    }

    #[test]
    fn test_default_presentation_matches_foreground_ack() {
        let presentation = ForegroundPresentation::default();
        assert!(presentation.alert);
        assert!(presentation.sound);
        assert!(!presentation.badge);
    }
}

// JSON-lines bridge between a host process and the in-process transport.
//
// Each stdin line is one request; each response is one stdout line.

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::notifications::{
    listener, ForegroundPresentation, LocalTransport, Notification, NotificationKind,
    NotificationManager, NotificationState, RegistrationError,
};

// ============================================================================
// Protocol Messages
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Received { payload: Value },
    Opened { payload: Value },
    Registered { device_token: String },
    RegistrationFailed {
        message: String,
        code: Option<i64>,
    },
    State,
    ClearHistory,
    Ping,
    Shutdown,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Delivered { kind: NotificationKind, payload: Notification },
    Presented(ForegroundPresentation),
    Ack { event: String },
    State(NotificationState),
    Pong,
    Goodbye,
    Error { message: String },
}

/// Counters reported when the bridge stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSummary {
    pub requests: usize,
    pub deliveries: usize,
    pub errors: usize,
}

fn send_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let line = serde_json::to_string(response).context("Failed to encode response")?;
    writeln!(writer, "{}", line).context("Failed to write response")?;
    writer.flush().context("Failed to flush response")?;
    Ok(())
}

/// Read requests until EOF or `shutdown`, feeding transport events into
/// `transport` and reporting fan-out deliveries back to the host.
pub fn run_bridge<R: BufRead, W: Write>(
    reader: R,
    writer: &mut W,
    transport: &LocalTransport,
    manager: &NotificationManager,
) -> Result<BridgeSummary> {
    let deliveries: Arc<Mutex<Vec<(Notification, NotificationKind)>>> = Arc::default();
    let collector = {
        let deliveries = deliveries.clone();
        listener(move |notification, kind| {
            deliveries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((notification.clone(), kind));
        })
    };
    manager.add_listener(collector.clone());

    let mut summary = BridgeSummary::default();
    let outcome = bridge_loop(reader, writer, transport, manager, &deliveries, &mut summary);

    manager.remove_listener(&collector);
    outcome?;

    info!(
        "Bridge stopped: {} requests, {} deliveries, {} errors",
        summary.requests, summary.deliveries, summary.errors
    );
    Ok(summary)
}

fn bridge_loop<R: BufRead, W: Write>(
    reader: R,
    writer: &mut W,
    transport: &LocalTransport,
    manager: &NotificationManager,
    deliveries: &Mutex<Vec<(Notification, NotificationKind)>>,
    summary: &mut BridgeSummary,
) -> Result<()> {
    for line in reader.lines() {
        let line = line.context("Failed to read request line")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.requests += 1;

        let request = match serde_json::from_str::<Request>(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Invalid bridge request: {}", e);
                summary.errors += 1;
                send_response(writer, &Response::Error {
                    message: format!("Invalid request: {}", e),
                })?;
                continue;
            }
        };
        debug!("Bridge request: {:?}", request);

        match request {
            Request::Received { payload } | Request::Opened { payload } if !payload.is_object() => {
                warn!("Rejected notification payload that is not a JSON object");
                summary.errors += 1;
                send_response(writer, &Response::Error {
                    message: "Notification payload must be a JSON object".to_string(),
                })?;
            }
            Request::Received { payload } => {
                match transport.emit_received_foreground(Notification::from_value(payload)) {
                    Some(presentation) => {
                        flush_deliveries(writer, deliveries, summary)?;
                        send_response(writer, &Response::Presented(presentation))?;
                    }
                    None => {
                        summary.errors += 1;
                        send_response(writer, &Response::Error {
                            message: "No foreground subscriber".to_string(),
                        })?;
                    }
                }
            }
            Request::Opened { payload } => {
                transport.emit_opened(Notification::from_value(payload));
                flush_deliveries(writer, deliveries, summary)?;
                send_response(writer, &Response::Ack { event: "opened".to_string() })?;
            }
            Request::Registered { device_token } => {
                transport.emit_registered(device_token);
                send_response(writer, &Response::Ack { event: "registered".to_string() })?;
            }
            Request::RegistrationFailed { message, code } => {
                let mut error = RegistrationError::new(message);
                if let Some(code) = code {
                    error = error.with_code(code);
                }
                transport.emit_registration_failed(error);
                send_response(writer, &Response::Ack {
                    event: "registration_failed".to_string(),
                })?;
            }
            Request::State => {
                send_response(writer, &Response::State(manager.state()))?;
            }
            Request::ClearHistory => {
                manager.clear_history();
                send_response(writer, &Response::Ack { event: "clear_history".to_string() })?;
            }
            Request::Ping => send_response(writer, &Response::Pong)?,
            Request::Shutdown => {
                send_response(writer, &Response::Goodbye)?;
                return Ok(());
            }
        }
    }

    debug!("EOF received, stopping bridge");
    Ok(())
}

fn flush_deliveries<W: Write>(
    writer: &mut W,
    deliveries: &Mutex<Vec<(Notification, NotificationKind)>>,
    summary: &mut BridgeSummary,
) -> Result<()> {
    let pending: Vec<_> = deliveries
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain(..)
        .collect();
    for (payload, kind) in pending {
        summary.deliveries += 1;
        send_response(writer, &Response::Delivered { kind, payload })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{AlwaysGranted, MemoryStore, NotificationSettings};
    use serde_json::json;
    use std::io::Cursor;

    async fn mounted_manager(transport: Arc<LocalTransport>) -> NotificationManager {
        let manager = NotificationManager::new(
            NotificationSettings::default(),
            transport,
            Arc::new(AlwaysGranted),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        manager.initialize().await.unwrap();
        manager
    }

    fn run(input: &str, transport: &LocalTransport, manager: &NotificationManager) -> (BridgeSummary, Vec<Value>) {
        let mut output = Vec::new();
        let summary = run_bridge(Cursor::new(input.to_string()), &mut output, transport, manager).unwrap();
        let lines = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap())
            .collect();
        (summary, lines)
    }

    #[tokio::test]
    async fn test_received_produces_delivery_and_presentation() {
        let transport = Arc::new(LocalTransport::new());
        let manager = mounted_manager(transport.clone()).await;

        let (summary, lines) = run(
            "{\"type\":\"received\",\"payload\":{\"id\":1}}\n",
            &transport,
            &manager,
        );

        assert_eq!(summary.deliveries, 1);
        assert_eq!(lines[0], json!({"type": "delivered", "kind": "received", "payload": {"id": 1}}));
        assert_eq!(lines[1], json!({"type": "presented", "alert": true, "sound": true, "badge": false}));
        assert_eq!(manager.notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_line_does_not_stop_bridge() {
        let transport = Arc::new(LocalTransport::new());
        let manager = mounted_manager(transport.clone()).await;

        let input = "not json\n{\"type\":\"ping\"}\n";
        let (summary, lines) = run(input, &transport, &manager);

        assert_eq!(summary.errors, 1);
        assert_eq!(lines[0]["type"], json!("error"));
        assert_eq!(lines[1], json!({"type": "pong"}));
    }

    #[tokio::test]
    async fn test_shutdown_stops_reading() {
        let transport = Arc::new(LocalTransport::new());
        let manager = mounted_manager(transport.clone()).await;

        let input = "{\"type\":\"shutdown\"}\n{\"type\":\"registered\",\"device_token\":\"late\"}\n";
        let (_summary, lines) = run(input, &transport, &manager);

        assert_eq!(lines, vec![json!({"type": "goodbye"})]);
        assert_eq!(manager.device_token(), None);
    }

    #[tokio::test]
    async fn test_state_reports_token_and_history() {
        let transport = Arc::new(LocalTransport::new());
        let manager = mounted_manager(transport.clone()).await;

        let input = concat!(
            "{\"type\":\"registered\",\"device_token\":\"tok\"}\n",
            "{\"type\":\"opened\",\"payload\":{\"id\":4}}\n",
            "{\"type\":\"state\"}\n",
        );
        let (_summary, lines) = run(input, &transport, &manager);

        let state = lines.last().unwrap();
        assert_eq!(state["deviceToken"], json!("tok"));
        assert_eq!(state["lastNotification"], json!({"id": 4}));
        assert_eq!(state["notifications"], json!([]));
    }

    #[tokio::test]
    async fn test_non_object_payload_rejected() {
        let transport = Arc::new(LocalTransport::new());
        let manager = mounted_manager(transport.clone()).await;

        let input = concat!(
            "{\"type\":\"received\",\"payload\":\"hi\"}\n",
            "{\"type\":\"opened\",\"payload\":[1,2]}\n",
            "{\"type\":\"ping\"}\n",
        );
        let (summary, lines) = run(input, &transport, &manager);

        assert_eq!(summary.errors, 2);
        assert_eq!(summary.deliveries, 0);
        assert_eq!(lines[0], json!({"type": "error", "message": "Notification payload must be a JSON object"}));
        assert_eq!(lines[1]["type"], json!("error"));
        assert_eq!(lines[2], json!({"type": "pong"}));
        assert!(manager.notifications().is_empty());
        assert_eq!(manager.last_notification(), None);
    }

    #[tokio::test]
    async fn test_bridge_removes_its_listener() {
        let transport = Arc::new(LocalTransport::new());
        let manager = mounted_manager(transport.clone()).await;

        run("{\"type\":\"ping\"}\n", &transport, &manager);
        assert_eq!(manager.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_received_without_subscriber_reports_error() {
        let transport = LocalTransport::new();
        let manager = NotificationManager::new(
            NotificationSettings::default(),
            Arc::new(LocalTransport::new()),
            Arc::new(AlwaysGranted),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();

        let (summary, lines) = run("{\"type\":\"received\",\"payload\":{}}\n", &transport, &manager);
        assert_eq!(summary.errors, 1);
        assert_eq!(lines[0]["type"], json!("error"));
    }
}

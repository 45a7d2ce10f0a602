//! Socket message protocol between the client and the agent backend.
//!
//! Client -> server: `{"type": "user-message", "data": {...}, "timestamp": 1700000000000}`
//! Server -> client: `{"type": "message-delta", "data": {...}, "timestamp": 1700000000000}`
//!
//! Outbound `type` values are the closed set in [`ClientMessageKind`].
//! Inbound `type` values are an open, versioned vocabulary (several
//! historical names may denote the same semantic event), so [`ServerEvent`]
//! keeps the raw string and leaves canonicalization to the client.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Server rejected the auth token presented in the handshake.
pub const CLOSE_AUTH_FAILED: u16 = 4401;
/// The bound session no longer exists server-side.
pub const CLOSE_SESSION_NOT_FOUND: u16 = 4404;

/// Monotonic-enough wall clock in epoch millis, the unit every wire
/// timestamp in this protocol uses.
pub fn epoch_ms() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
#[ts(rename_all = "kebab-case")]
pub enum ClientMessageKind {
    UserMessage,
    ResumeInterrupt,
    Stop,
    Ping,
    BindSession,
}

/// Client -> server envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    #[ts(rename = "type")]
    pub kind: ClientMessageKind,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    pub timestamp: f64,
}

impl ClientMessage {
    pub fn new(kind: ClientMessageKind, data: Value) -> Self {
        Self {
            kind,
            data,
            timestamp: epoch_ms(),
        }
    }

    pub fn ping() -> Self {
        Self::new(ClientMessageKind::Ping, Value::Null)
    }
}

/// Server -> client envelope. `kind` stays a raw string; the normalizer
/// owns the mapping onto canonical events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export)]
pub struct ServerEvent {
    #[serde(rename = "type")]
    #[ts(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub timestamp: f64,
}

impl ServerEvent {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: epoch_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_message_wire_shape() {
        let msg = ClientMessage::new(
            ClientMessageKind::UserMessage,
            json!({"content": "hello"}),
        );
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(wire["type"], "user-message");
        assert_eq!(wire["data"]["content"], "hello");
        assert!(wire["timestamp"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn client_message_ping_omits_null_data() {
        let wire = serde_json::to_string(&ClientMessage::ping()).unwrap();
        assert!(!wire.contains("\"data\""));
        assert!(wire.contains("\"type\":\"ping\""));
    }

    #[test]
    fn client_message_roundtrip() {
        let msg = ClientMessage::new(
            ClientMessageKind::BindSession,
            json!({"cid": "s2"}),
        );
        let back: ClientMessage = serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn server_event_tolerates_missing_fields() {
        let ev: ServerEvent = serde_json::from_str(r#"{"type": "message-delta"}"#).unwrap();
        assert_eq!(ev.kind, "message-delta");
        assert!(ev.data.is_null());
        assert_eq!(ev.timestamp, 0.0);
    }

    #[test]
    fn server_event_roundtrip() {
        let ev = ServerEvent::new("message-start", json!({"id": "m1"}));
        let back: ServerEvent = serde_json::from_str(&serde_json::to_string(&ev).unwrap()).unwrap();
        assert_eq!(ev, back);
    }
}

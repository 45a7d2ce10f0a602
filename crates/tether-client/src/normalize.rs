//! Event normalization: maps the open, versioned wire vocabulary onto
//! canonical events.
//!
//! The backend has renamed events across protocol revisions without
//! retiring the old names, so several wire types denote the same
//! semantic event. All "guess the shape" logic lives here; the reducer
//! only ever sees [`CanonicalEvent`]. Normalization is total: malformed
//! payloads degrade to defaults and unrecognized types are ignored,
//! never raised.

use serde::Deserialize;
use serde_json::Value;

use tether_shared::schemas::{FileArtifact, InterruptData, Message, Role, TodoItem, ToolCallKind};
use tether_shared::ws_protocol::ServerEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalEvent {
    Connected,
    Snapshot(SnapshotPayload),
    MessageStart(MessageStartPayload),
    MessageDelta(MessageDeltaPayload),
    MessageEnd(MessageEndPayload),
    ToolCallStart(ToolCallStartPayload),
    ToolCallEnd(ToolCallEndPayload),
    SubagentStart(SubagentPayload),
    SubagentEnd(SubagentPayload),
    TodosUpdate(Value),
    FileOperation(FileOperationPayload),
    Interrupt(InterruptData),
    Error(ErrorPayload),
    Done(DonePayload),
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapshotPayload {
    pub messages: Vec<Message>,
    pub todos: Option<Vec<TodoItem>>,
    pub files: Vec<FileArtifact>,
    pub interrupt: Option<InterruptData>,
    pub is_loading: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageStartPayload {
    #[serde(alias = "messageId", alias = "message_id")]
    pub id: String,
    pub role: Role,
    #[serde(alias = "session_id", alias = "sid")]
    pub session_id: String,
    #[serde(alias = "parent_message_id")]
    pub parent_message_id: Option<String>,
    #[serde(alias = "subagent_name", alias = "subagent")]
    pub subagent_name: Option<String>,
    #[serde(alias = "created_at", alias = "timestamp")]
    pub created_at: f64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageDeltaPayload {
    #[serde(alias = "messageId", alias = "message_id")]
    pub id: String,
    #[serde(alias = "text", alias = "content", alias = "chunk")]
    pub delta: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageEndPayload {
    #[serde(alias = "messageId", alias = "message_id")]
    pub id: String,
    /// Fully-authoritative message, when the server sends one.
    pub message: Option<Message>,
    /// Direct content override (older servers).
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolCallStartPayload {
    #[serde(
        alias = "toolCallId",
        alias = "tool_call_id",
        alias = "toolUseId",
        alias = "tool_use_id",
        alias = "callId"
    )]
    pub id: String,
    #[serde(alias = "toolName", alias = "tool_name", alias = "tool")]
    pub name: String,
    pub kind: ToolCallKind,
    #[serde(alias = "input", alias = "arguments", alias = "parameters")]
    pub args: Value,
    #[serde(alias = "message_id", alias = "parentMessageId", alias = "parent_message_id")]
    pub message_id: Option<String>,
    #[serde(alias = "subagent_name")]
    pub subagent_name: Option<String>,
    #[serde(alias = "started_at", alias = "timestamp")]
    pub started_at: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolCallEndPayload {
    #[serde(
        alias = "toolCallId",
        alias = "tool_call_id",
        alias = "toolUseId",
        alias = "tool_use_id",
        alias = "callId"
    )]
    pub id: String,
    #[serde(alias = "output", alias = "response")]
    pub result: Value,
    pub status: Option<String>,
    pub error: Option<String>,
    #[serde(alias = "duration_ms", alias = "duration")]
    pub duration_ms: Option<f64>,
    #[serde(alias = "completed_at", alias = "timestamp")]
    pub completed_at: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SubagentPayload {
    #[serde(alias = "subagentId", alias = "subagent_id", alias = "callId")]
    pub id: String,
    #[serde(alias = "subagent_name", alias = "subagent")]
    pub name: String,
    #[serde(alias = "message_id")]
    pub message_id: Option<String>,
    pub result: Value,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FileOperationPayload {
    #[serde(alias = "file_path", alias = "filePath")]
    pub path: String,
    pub content: String,
    pub language: Option<String>,
    /// create | update | delete; defaults to update.
    #[serde(alias = "op")]
    pub operation: String,
    #[serde(alias = "old_content")]
    pub old_content: Option<String>,
    #[serde(alias = "line_start")]
    pub line_start: Option<u32>,
    #[serde(alias = "line_end")]
    pub line_end: Option<u32>,
    #[serde(alias = "last_modified", alias = "timestamp")]
    pub last_modified: f64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: Option<String>,
    #[serde(alias = "error", alias = "detail")]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DonePayload {
    pub reason: Option<String>,
}

enum Kind {
    Connected,
    Snapshot,
    MessageStart,
    MessageDelta,
    MessageEnd,
    ToolCallStart,
    ToolCallEnd,
    SubagentStart,
    SubagentEnd,
    TodosUpdate,
    FileOperation,
    Interrupt,
    Error,
    Done,
}

/// One canonical tag per semantic event; every historical wire name the
/// backend has used maps here.
fn canonical_kind(kind: &str) -> Option<Kind> {
    Some(match kind {
        "connected" | "ready" | "session-ready" | "session_ready" => Kind::Connected,
        "session-state" | "session_state" | "state-snapshot" | "state_snapshot" | "snapshot" => {
            Kind::Snapshot
        }
        "message-start" | "message_start" | "assistant-message-start"
        | "assistant_message_start" => Kind::MessageStart,
        "message-delta" | "message_delta" | "message-chunk" | "message_chunk"
        | "assistant-message-delta" | "assistant_message_delta" => Kind::MessageDelta,
        "message-end" | "message_end" | "message-complete" | "message_complete"
        | "assistant-message-end" | "assistant_message_end" => Kind::MessageEnd,
        "tool-call-start" | "tool_call_start" | "tool-start" | "tool_start" => Kind::ToolCallStart,
        "tool-call-end" | "tool_call_end" | "tool-call-result" | "tool_call_result"
        | "tool-end" | "tool_end" | "tool-result" | "tool_result" => Kind::ToolCallEnd,
        "subagent-start" | "subagent_start" => Kind::SubagentStart,
        "subagent-end" | "subagent_end" => Kind::SubagentEnd,
        "todos-update" | "todos_update" | "todo-update" | "todo_update" | "task-list-update"
        | "task_list_update" => Kind::TodosUpdate,
        "file-operation" | "file_operation" | "file-update" | "file_update" => Kind::FileOperation,
        "interrupt" | "interrupt-request" | "interrupt_request" | "human-interrupt"
        | "human_interrupt" => Kind::Interrupt,
        "error" | "stream-error" | "stream_error" => Kind::Error,
        "done" | "complete" | "turn-end" | "turn_end" | "finished" => Kind::Done,
        _ => return None,
    })
}

/// True when the wire type is the server's ready acknowledgment.
pub fn is_ready_ack(kind: &str) -> bool {
    matches!(canonical_kind(kind), Some(Kind::Connected))
}

/// Best-effort payload parse: unknown fields are ignored and shape
/// mismatches degrade to the default payload rather than erroring.
fn parse<T: serde::de::DeserializeOwned + Default>(data: &Value) -> T {
    serde_json::from_value(data.clone()).unwrap_or_default()
}

/// Map a wire frame onto its canonical event. Returns `None` for
/// unrecognized event types; never fails.
pub fn normalize(frame: &ServerEvent) -> Option<CanonicalEvent> {
    let event = match canonical_kind(&frame.kind)? {
        Kind::Connected => CanonicalEvent::Connected,
        Kind::Snapshot => CanonicalEvent::Snapshot(parse(&frame.data)),
        Kind::MessageStart => {
            let mut payload: MessageStartPayload = parse(&frame.data);
            if payload.created_at == 0.0 {
                payload.created_at = frame.timestamp;
            }
            CanonicalEvent::MessageStart(payload)
        }
        Kind::MessageDelta => CanonicalEvent::MessageDelta(parse(&frame.data)),
        Kind::MessageEnd => CanonicalEvent::MessageEnd(parse(&frame.data)),
        Kind::ToolCallStart => {
            let mut payload: ToolCallStartPayload = parse(&frame.data);
            if payload.started_at.is_none() && frame.timestamp > 0.0 {
                payload.started_at = Some(frame.timestamp);
            }
            CanonicalEvent::ToolCallStart(payload)
        }
        Kind::ToolCallEnd => {
            let mut payload: ToolCallEndPayload = parse(&frame.data);
            if payload.completed_at.is_none() && frame.timestamp > 0.0 {
                payload.completed_at = Some(frame.timestamp);
            }
            CanonicalEvent::ToolCallEnd(payload)
        }
        Kind::SubagentStart => CanonicalEvent::SubagentStart(parse(&frame.data)),
        Kind::SubagentEnd => CanonicalEvent::SubagentEnd(parse(&frame.data)),
        Kind::TodosUpdate => CanonicalEvent::TodosUpdate(frame.data.clone()),
        Kind::FileOperation => {
            let mut payload: FileOperationPayload = parse(&frame.data);
            if payload.operation.is_empty() {
                payload.operation = "update".into();
            }
            if payload.last_modified == 0.0 {
                payload.last_modified = frame.timestamp;
            }
            CanonicalEvent::FileOperation(payload)
        }
        Kind::Interrupt => CanonicalEvent::Interrupt(parse(&frame.data)),
        Kind::Error => CanonicalEvent::Error(parse(&frame.data)),
        Kind::Done => CanonicalEvent::Done(parse(&frame.data)),
    };
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(kind: &str, data: Value) -> ServerEvent {
        ServerEvent {
            kind: kind.into(),
            data,
            timestamp: 1000.0,
        }
    }

    #[test]
    fn historical_aliases_map_to_one_event() {
        let data = json!({"id": "m1", "delta": "hi"});
        for kind in ["message-delta", "message_delta", "message-chunk"] {
            match normalize(&frame(kind, data.clone())) {
                Some(CanonicalEvent::MessageDelta(p)) => {
                    assert_eq!(p.id, "m1");
                    assert_eq!(p.delta, "hi");
                }
                other => panic!("{kind} normalized to {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_types_are_ignored() {
        assert_eq!(normalize(&frame("telemetry-blob", json!({}))), None);
        assert_eq!(normalize(&frame("", json!(null))), None);
    }

    #[test]
    fn malformed_payload_degrades_to_default() {
        let ev = normalize(&frame("message-delta", json!("not an object"))).unwrap();
        assert_eq!(
            ev,
            CanonicalEvent::MessageDelta(MessageDeltaPayload::default())
        );
    }

    #[test]
    fn delta_accepts_text_alias() {
        let ev = normalize(&frame("message_delta", json!({"messageId": "m1", "text": "lo"})));
        match ev {
            Some(CanonicalEvent::MessageDelta(p)) => {
                assert_eq!(p.id, "m1");
                assert_eq!(p.delta, "lo");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tool_call_start_accepts_legacy_field_names() {
        let ev = normalize(&frame(
            "tool_call_start",
            json!({"toolUseId": "t1", "toolName": "bash", "input": {"command": "ls"}}),
        ));
        match ev {
            Some(CanonicalEvent::ToolCallStart(p)) => {
                assert_eq!(p.id, "t1");
                assert_eq!(p.name, "bash");
                assert_eq!(p.args, json!({"command": "ls"}));
                // Backfilled from the frame timestamp
                assert_eq!(p.started_at, Some(1000.0));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tool_call_result_is_an_end_alias() {
        let ev = normalize(&frame(
            "tool_call_result",
            json!({"id": "t1", "output": {"ok": true}}),
        ));
        match ev {
            Some(CanonicalEvent::ToolCallEnd(p)) => {
                assert_eq!(p.id, "t1");
                assert_eq!(p.result, json!({"ok": true}));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ready_ack_recognized_across_aliases() {
        assert!(is_ready_ack("connected"));
        assert!(is_ready_ack("ready"));
        assert!(is_ready_ack("session_ready"));
        assert!(!is_ready_ack("message-start"));
    }

    #[test]
    fn message_start_backfills_created_at_from_frame() {
        let ev = normalize(&frame("message-start", json!({"id": "m1"})));
        match ev {
            Some(CanonicalEvent::MessageStart(p)) => assert_eq!(p.created_at, 1000.0),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn error_event_accepts_message_aliases() {
        let ev = normalize(&frame("stream_error", json!({"error": "backend exploded"})));
        match ev {
            Some(CanonicalEvent::Error(p)) => assert_eq!(p.message, "backend exploded"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn todos_update_keeps_raw_payload() {
        let raw = json!({"todos": [{"content": "a"}]});
        let ev = normalize(&frame("todos-update", raw.clone()));
        assert_eq!(ev, Some(CanonicalEvent::TodosUpdate(raw)));
    }
}

//! State projection: a pure reducer folding canonical events into
//! [`SessionState`].
//!
//! The reducer runs synchronously on the event-delivery path, one event
//! at a time, and never suspends. Extraction failures leave the prior
//! state untouched; nothing in here throws.

pub mod extract;
pub mod state;

pub use state::SessionState;

use serde_json::Value;
use tracing::warn;

use tether_shared::schemas::{FileArtifact, Message, ToolCall, ToolCallKind, ToolCallStatus};

use crate::normalize::{
    CanonicalEvent, DonePayload, FileOperationPayload, MessageDeltaPayload, MessageEndPayload,
    MessageStartPayload, SnapshotPayload, SubagentPayload, ToolCallEndPayload,
    ToolCallStartPayload,
};

/// Fold one canonical event into the session state.
pub fn apply(state: &mut SessionState, event: CanonicalEvent) {
    match event {
        CanonicalEvent::Connected => {}
        CanonicalEvent::Snapshot(payload) => apply_snapshot(state, payload),
        CanonicalEvent::MessageStart(payload) => apply_message_start(state, payload),
        CanonicalEvent::MessageDelta(payload) => apply_message_delta(state, payload),
        CanonicalEvent::MessageEnd(payload) => apply_message_end(state, payload),
        CanonicalEvent::ToolCallStart(payload) => apply_tool_call_start(state, payload),
        CanonicalEvent::ToolCallEnd(payload) => apply_tool_call_end(state, payload),
        CanonicalEvent::SubagentStart(payload) => apply_subagent_start(state, payload),
        CanonicalEvent::SubagentEnd(payload) => apply_subagent_end(state, payload),
        CanonicalEvent::TodosUpdate(raw) => apply_todos_update(state, &raw),
        CanonicalEvent::FileOperation(payload) => apply_file_operation(state, payload),
        CanonicalEvent::Interrupt(data) => {
            state.interrupt = Some(data);
            state.is_loading = false;
        }
        CanonicalEvent::Error(payload) => {
            // Errors never roll back partial progress.
            state.last_error = Some(payload);
        }
        CanonicalEvent::Done(payload) => apply_done(state, payload),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn parse_tool_status(raw: &str) -> Option<ToolCallStatus> {
    match raw {
        "pending" => Some(ToolCallStatus::Pending),
        "running" | "in_progress" | "in-progress" => Some(ToolCallStatus::Running),
        "success" | "ok" => Some(ToolCallStatus::Success),
        "error" | "failed" | "failure" => Some(ToolCallStatus::Error),
        "interrupted" | "cancelled" | "canceled" => Some(ToolCallStatus::Interrupted),
        "completed" | "complete" | "done" => Some(ToolCallStatus::Completed),
        _ => None,
    }
}

fn apply_snapshot(state: &mut SessionState, payload: SnapshotPayload) {
    state.replace_messages(payload.messages);
    if let Some(todos) = payload.todos {
        state.todos = todos;
    }
    for file in payload.files {
        state.files.insert(file.path.clone(), file);
    }
    state.interrupt = payload.interrupt;
    state.is_loading = payload.is_loading;
}

fn apply_message_start(state: &mut SessionState, payload: MessageStartPayload) {
    if payload.id.is_empty() {
        return;
    }
    // A duplicate start for a live message id is a no-op.
    if state.has_message(&payload.id) {
        state.is_loading = true;
        return;
    }
    state.push_message(Message {
        id: payload.id,
        session_id: payload.session_id,
        role: payload.role,
        content: String::new(),
        created_at: payload.created_at,
        parent_message_id: payload.parent_message_id,
        subagent_name: payload.subagent_name,
        tool_calls: Vec::new(),
        metadata: None,
    });
    state.is_loading = true;
}

fn apply_message_delta(state: &mut SessionState, payload: MessageDeltaPayload) {
    // Finalized messages are terminal; late deltas are dropped.
    if state.is_finalized(&payload.id) {
        return;
    }
    if let Some(msg) = state.message_mut(&payload.id) {
        msg.content.push_str(&payload.delta);
    }
}

fn apply_message_end(state: &mut SessionState, payload: MessageEndPayload) {
    let id = if !payload.id.is_empty() {
        payload.id.clone()
    } else if let Some(ref msg) = payload.message {
        msg.id.clone()
    } else {
        return;
    };
    // An end for an unknown id never fabricates a message; a repeated
    // end never revisits a finalized one.
    if !state.has_message(&id) || state.is_finalized(&id) {
        return;
    }

    if let Some(authoritative) = payload.message {
        // Summaries embedded in the final payload may carry truncated
        // previews; data tracked via dedicated tool-call events wins.
        let mut order: Vec<String> = state
            .message(&id)
            .map(|m| m.tool_calls.iter().map(|t| t.id.clone()).collect())
            .unwrap_or_default();
        for preview in &authoritative.tool_calls {
            if preview.id.is_empty() {
                continue;
            }
            let tracked = state
                .tool_calls
                .entry(preview.id.clone())
                .or_insert_with(|| ToolCall {
                    id: preview.id.clone(),
                    ..Default::default()
                });
            tracked.merge_preview(preview);
            if !order.contains(&preview.id) {
                order.push(preview.id.clone());
            }
        }

        // Task-list snapshot in message metadata is a todos source only
        // until an explicit todos update has been seen.
        if !state.todos_from_update
            && let Some(todos) = authoritative
                .metadata
                .as_ref()
                .and_then(|m| m.todos.as_ref())
            && !todos.is_empty()
        {
            state.todos = todos.clone();
        }

        let embedded: Vec<ToolCall> = order
            .iter()
            .filter_map(|tid| state.tool_calls.get(tid).cloned())
            .collect();
        for tid in &order {
            state.tool_call_owner.insert(tid.clone(), id.clone());
        }

        if let Some(msg) = state.message_mut(&id) {
            if !authoritative.content.is_empty() {
                msg.content = authoritative.content;
            }
            if msg.created_at == 0.0 && authoritative.created_at > 0.0 {
                msg.created_at = authoritative.created_at;
            }
            if msg.session_id.is_empty() {
                msg.session_id = authoritative.session_id;
            }
            if authoritative.metadata.is_some() {
                msg.metadata = authoritative.metadata;
            }
            msg.tool_calls = embedded;
        }
    } else if let Some(content) = payload.content
        && !content.is_empty()
        && let Some(msg) = state.message_mut(&id)
    {
        msg.content = content;
    }

    state.finalize(&id);
}

fn apply_tool_call_start(state: &mut SessionState, payload: ToolCallStartPayload) {
    if payload.id.is_empty() {
        return;
    }
    let call = state
        .tool_calls
        .entry(payload.id.clone())
        .or_insert_with(|| ToolCall {
            id: payload.id.clone(),
            ..Default::default()
        });
    if !call.status.is_terminal() {
        call.status = ToolCallStatus::Running;
        call.kind = payload.kind;
        if call.name.is_empty() {
            call.name = payload.name;
        }
        if is_blank(&call.args) && !is_blank(&payload.args) {
            call.args = payload.args;
        }
        if call.started_at.is_none() {
            call.started_at = payload.started_at;
        }
        if call.subagent_name.is_none() {
            call.subagent_name = payload.subagent_name;
        }
    }
    let snapshot = call.clone();

    if let Some(message_id) = payload.message_id
        && state.has_message(&message_id)
    {
        state
            .tool_call_owner
            .insert(payload.id.clone(), message_id.clone());
        if let Some(msg) = state.message_mut(&message_id)
            && !msg.tool_calls.iter().any(|t| t.id == payload.id)
        {
            msg.tool_calls.push(snapshot);
        }
    }
}

fn apply_tool_call_end(state: &mut SessionState, payload: ToolCallEndPayload) {
    if payload.id.is_empty() {
        return;
    }
    let call = state
        .tool_calls
        .entry(payload.id.clone())
        .or_insert_with(|| ToolCall {
            id: payload.id.clone(),
            ..Default::default()
        });

    if !is_blank(&payload.result) {
        call.result = payload.result.clone();
    }
    if payload.error.is_some() {
        call.error = payload.error.clone();
    }
    call.status = payload
        .status
        .as_deref()
        .and_then(parse_tool_status)
        .unwrap_or(if payload.error.is_some() {
            ToolCallStatus::Error
        } else {
            ToolCallStatus::Success
        });
    if payload.completed_at.is_some() {
        call.completed_at = payload.completed_at;
    }
    call.duration_ms = payload.duration_ms.or_else(|| match (call.started_at, call.completed_at) {
        (Some(started), Some(completed)) if completed >= started => Some(completed - started),
        _ => None,
    });
    let snapshot = call.clone();

    mirror_into_message(state, &snapshot);
    run_result_extraction(state, &snapshot);
}

fn apply_subagent_start(state: &mut SessionState, payload: SubagentPayload) {
    if payload.id.is_empty() {
        return;
    }
    let call = state
        .tool_calls
        .entry(payload.id.clone())
        .or_insert_with(|| ToolCall {
            id: payload.id.clone(),
            ..Default::default()
        });
    if !call.status.is_terminal() {
        call.kind = ToolCallKind::Subagent;
        call.status = ToolCallStatus::Running;
        if call.name.is_empty() {
            call.name = payload.name.clone();
        }
        if call.subagent_name.is_none() && !payload.name.is_empty() {
            call.subagent_name = Some(payload.name);
        }
    }
    let snapshot = call.clone();

    if let Some(message_id) = payload.message_id
        && state.has_message(&message_id)
    {
        state
            .tool_call_owner
            .insert(payload.id.clone(), message_id.clone());
        if let Some(msg) = state.message_mut(&message_id)
            && !msg.tool_calls.iter().any(|t| t.id == payload.id)
        {
            msg.tool_calls.push(snapshot);
        }
    }
}

fn apply_subagent_end(state: &mut SessionState, payload: SubagentPayload) {
    if payload.id.is_empty() {
        return;
    }
    let call = state
        .tool_calls
        .entry(payload.id.clone())
        .or_insert_with(|| ToolCall {
            id: payload.id.clone(),
            kind: ToolCallKind::Subagent,
            ..Default::default()
        });
    if !is_blank(&payload.result) {
        call.result = payload.result.clone();
    }
    if payload.error.is_some() {
        call.error = payload.error.clone();
    }
    call.status = if payload.error.is_some() {
        ToolCallStatus::Error
    } else {
        ToolCallStatus::Completed
    };
    let snapshot = call.clone();

    mirror_into_message(state, &snapshot);
    run_result_extraction(state, &snapshot);
}

/// Keep the message's embedded copy in sync with the tracked call.
fn mirror_into_message(state: &mut SessionState, call: &ToolCall) {
    let Some(owner) = state.tool_call_owner.get(&call.id).cloned() else {
        return;
    };
    if let Some(msg) = state.message_mut(&owner) {
        match msg.tool_calls.iter_mut().find(|t| t.id == call.id) {
            Some(embedded) => *embedded = call.clone(),
            None => msg.tool_calls.push(call.clone()),
        }
    }
}

/// Scan a terminal tool call for file and todo payloads. Idempotent:
/// re-running the same call converges to the same state.
fn run_result_extraction(state: &mut SessionState, call: &ToolCall) {
    let succeeded = matches!(
        call.status,
        ToolCallStatus::Success | ToolCallStatus::Completed
    );

    let files = extract::extract_files(&call.result);
    if !files.is_empty() {
        for mut file in files {
            if file.last_modified == 0.0 {
                file.last_modified = call.completed_at.unwrap_or_default();
            }
            state.files.insert(file.path.clone(), file);
        }
    } else if succeeded
        && let Some(mut file) = extract::file_from_write_args(&call.name, &call.args)
    {
        file.last_modified = call.completed_at.unwrap_or_default();
        state.files.insert(file.path.clone(), file);
    }

    if !state.todos_from_update
        && let Some(todos) = extract::extract_todos(&call.result)
        && !todos.is_empty()
    {
        state.todos = todos;
    }
}

fn apply_todos_update(state: &mut SessionState, raw: &Value) {
    match extract::extract_todos(raw) {
        Some(todos) => {
            state.todos = todos;
            state.todos_from_update = true;
        }
        // Unrecognized shapes leave the list unchanged.
        None => {}
    }
}

fn apply_file_operation(state: &mut SessionState, payload: FileOperationPayload) {
    if payload.path.is_empty() {
        return;
    }
    if payload.operation == "delete" {
        state.files.remove(&payload.path);
        return;
    }
    let mut artifact = FileArtifact::new(payload.path, payload.content);
    artifact.language = payload.language;
    artifact.last_modified = payload.last_modified;
    artifact.old_content = payload.old_content;
    artifact.line_start = payload.line_start;
    artifact.line_end = payload.line_end;
    state.files.insert(artifact.path.clone(), artifact);
}

fn apply_done(state: &mut SessionState, payload: DonePayload) {
    state.is_loading = false;
    state.interrupt = None;
    if payload.reason.as_deref() == Some("error") {
        warn!("stream finished with an error reason");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_shared::schemas::{MessageMetadata, TodoItem, TodoStatus};
    use tether_shared::ws_protocol::ServerEvent;

    use crate::normalize::normalize;

    fn feed(state: &mut SessionState, kind: &str, data: Value) {
        let frame = ServerEvent {
            kind: kind.into(),
            data,
            timestamp: 1000.0,
        };
        if let Some(event) = normalize(&frame) {
            apply(state, event);
        }
    }

    #[test]
    fn deltas_concatenate_in_order() {
        let mut state = SessionState::default();
        feed(&mut state, "message_start", json!({"id": "m1"}));
        feed(&mut state, "message_delta", json!({"id": "m1", "delta": "Hel"}));
        feed(&mut state, "message_delta", json!({"id": "m1", "delta": "lo"}));
        feed(&mut state, "message_end", json!({"id": "m1"}));

        assert_eq!(state.message("m1").unwrap().content, "Hello");
    }

    #[test]
    fn authoritative_end_content_overrides_deltas() {
        let mut state = SessionState::default();
        feed(&mut state, "message_start", json!({"id": "m1"}));
        feed(&mut state, "message_delta", json!({"id": "m1", "delta": "partial"}));
        feed(
            &mut state,
            "message_end",
            json!({"id": "m1", "message": {"id": "m1", "content": "final text"}}),
        );

        assert_eq!(state.message("m1").unwrap().content, "final text");
    }

    #[test]
    fn deltas_after_finalize_are_dropped() {
        let mut state = SessionState::default();
        feed(&mut state, "message_start", json!({"id": "m1"}));
        feed(&mut state, "message_delta", json!({"id": "m1", "delta": "Hello"}));
        feed(&mut state, "message_end", json!({"id": "m1"}));
        feed(&mut state, "message_delta", json!({"id": "m1", "delta": " late"}));

        assert_eq!(state.message("m1").unwrap().content, "Hello");
    }

    #[test]
    fn end_for_unknown_id_is_a_noop() {
        let mut state = SessionState::default();
        feed(&mut state, "message_end", json!({"id": "ghost"}));
        assert!(state.messages().is_empty());
    }

    #[test]
    fn duplicate_start_never_duplicates_a_message() {
        let mut state = SessionState::default();
        feed(&mut state, "message_start", json!({"id": "m1"}));
        feed(&mut state, "message_delta", json!({"id": "m1", "delta": "x"}));
        feed(&mut state, "message_start", json!({"id": "m1"}));

        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.message("m1").unwrap().content, "x");
    }

    #[test]
    fn tool_call_lifecycle_start_to_end() {
        let mut state = SessionState::default();
        feed(&mut state, "message_start", json!({"id": "m1"}));
        feed(
            &mut state,
            "tool_call_start",
            json!({"id": "t1", "name": "bash", "args": {"command": "ls"}, "messageId": "m1"}),
        );
        assert_eq!(
            state.tool_calls["t1"].status,
            ToolCallStatus::Running
        );
        assert_eq!(state.message("m1").unwrap().tool_calls.len(), 1);

        feed(
            &mut state,
            "tool_call_end",
            json!({"id": "t1", "result": {"stdout": "ok"}, "completedAt": 1500.0}),
        );
        let call = &state.tool_calls["t1"];
        assert_eq!(call.status, ToolCallStatus::Success);
        assert_eq!(call.result, json!({"stdout": "ok"}));
        assert_eq!(call.duration_ms, Some(500.0));
        // Mirrored into the message's embedded copy, never duplicated
        let msg = state.message("m1").unwrap();
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].status, ToolCallStatus::Success);
    }

    #[test]
    fn replaying_tool_events_is_idempotent() {
        let start = json!({"id": "t1", "args": {"x": 1}, "name": "bash"});
        let end = json!({"id": "t1", "result": {"ok": true}, "completedAt": 1500.0});

        let mut once = SessionState::default();
        feed(&mut once, "tool_call_start", start.clone());
        feed(&mut once, "tool_call_end", end.clone());

        let mut twice = SessionState::default();
        feed(&mut twice, "tool_call_start", start.clone());
        feed(&mut twice, "tool_call_end", end.clone());
        feed(&mut twice, "tool_call_start", start);
        feed(&mut twice, "tool_call_end", end);

        assert_eq!(once.tool_calls["t1"], twice.tool_calls["t1"]);
    }

    #[test]
    fn end_merge_prefers_tracked_data_over_previews() {
        let mut state = SessionState::default();
        feed(&mut state, "message_start", json!({"id": "m1"}));
        feed(
            &mut state,
            "tool_call_start",
            json!({"id": "t1", "name": "bash", "args": {"command": "ls -la"}, "messageId": "m1"}),
        );
        feed(
            &mut state,
            "tool_call_end",
            json!({"id": "t1", "result": {"stdout": "full output"}}),
        );
        // Summary in the final payload carries truncated previews
        feed(
            &mut state,
            "message_end",
            json!({"id": "m1", "message": {"id": "m1", "toolCalls": [
                {"id": "t1", "name": "bash", "args": {"command": "ls…"}, "result": "full…"}
            ]}}),
        );

        let msg = state.message("m1").unwrap();
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].args, json!({"command": "ls -la"}));
        assert_eq!(msg.tool_calls[0].result, json!({"stdout": "full output"}));
        assert_eq!(state.tool_calls["t1"].args, json!({"command": "ls -la"}));
    }

    #[test]
    fn end_merge_adopts_previews_for_untracked_calls() {
        let mut state = SessionState::default();
        feed(&mut state, "message_start", json!({"id": "m1"}));
        feed(
            &mut state,
            "message_end",
            json!({"id": "m1", "message": {"id": "m1", "toolCalls": [
                {"id": "t9", "name": "search", "args": {"q": "rust"}}
            ]}}),
        );

        assert_eq!(state.tool_calls["t9"].name, "search");
        assert_eq!(state.message("m1").unwrap().tool_calls.len(), 1);
    }

    #[test]
    fn file_extraction_from_tool_result() {
        let mut state = SessionState::default();
        feed(&mut state, "tool_call_start", json!({"id": "t1", "args": {}}));
        feed(
            &mut state,
            "tool_call_end",
            json!({"id": "t1", "result": {"files": {"/a.md": {"content": "X"}}}}),
        );

        let file = &state.files["/a.md"];
        assert_eq!(file.content, "X");
        assert!(file.editable);
    }

    #[test]
    fn file_extraction_from_write_tool_args() {
        let mut state = SessionState::default();
        feed(
            &mut state,
            "tool_call_start",
            json!({"id": "t1", "name": "write_file", "args": {"path": "/b.md", "content": "Y"}}),
        );
        feed(&mut state, "tool_call_end", json!({"id": "t1", "result": {"ok": true}}));

        assert_eq!(state.files["/b.md"].content, "Y");
        assert!(state.files["/b.md"].editable);
    }

    #[test]
    fn failed_write_tool_does_not_extract_from_args() {
        let mut state = SessionState::default();
        feed(
            &mut state,
            "tool_call_start",
            json!({"id": "t1", "name": "write_file", "args": {"path": "/b.md", "content": "Y"}}),
        );
        feed(
            &mut state,
            "tool_call_end",
            json!({"id": "t1", "error": "permission denied"}),
        );

        assert!(state.files.is_empty());
        assert_eq!(state.tool_calls["t1"].status, ToolCallStatus::Error);
    }

    #[test]
    fn duplicate_file_sources_converge_to_latest_content() {
        let mut state = SessionState::default();
        feed(
            &mut state,
            "file_operation",
            json!({"path": "/a.md", "content": "v1"}),
        );
        feed(&mut state, "tool_call_start", json!({"id": "t1", "args": {}}));
        feed(
            &mut state,
            "tool_call_end",
            json!({"id": "t1", "result": {"files": {"/a.md": {"content": "v2"}}}}),
        );

        assert_eq!(state.files.len(), 1);
        assert_eq!(state.files["/a.md"].content, "v2");
    }

    #[test]
    fn file_operation_delete_removes_artifact() {
        let mut state = SessionState::default();
        feed(&mut state, "file_operation", json!({"path": "/a.md", "content": "X"}));
        feed(
            &mut state,
            "file_operation",
            json!({"path": "/a.md", "operation": "delete"}),
        );
        assert!(state.files.is_empty());
    }

    #[test]
    fn todos_update_replaces_wholesale() {
        let mut state = SessionState::default();
        state.todos = vec![TodoItem {
            id: "old".into(),
            content: "old".into(),
            ..Default::default()
        }];
        feed(
            &mut state,
            "todos-update",
            json!({"todos": [{"content": "new", "status": "in_progress"}]}),
        );

        assert_eq!(state.todos.len(), 1);
        assert_eq!(state.todos[0].content, "new");
        assert_eq!(state.todos[0].status, TodoStatus::InProgress);
    }

    #[test]
    fn unrecognized_todos_payload_leaves_list_unchanged() {
        let mut state = SessionState::default();
        state.todos = vec![TodoItem {
            id: "keep".into(),
            content: "keep".into(),
            ..Default::default()
        }];
        feed(&mut state, "todos-update", json!({"stdout": "noise"}));
        assert_eq!(state.todos[0].id, "keep");
    }

    #[test]
    fn textual_todos_update_parses() {
        let mut state = SessionState::default();
        feed(
            &mut state,
            "todos_update",
            json!("Updated todo list to [{'content':'a','status':'pending'}]"),
        );
        assert_eq!(state.todos.len(), 1);
        assert_eq!(state.todos[0].content, "a");
        assert_eq!(state.todos[0].status, TodoStatus::Pending);
    }

    #[test]
    fn metadata_todos_only_apply_before_explicit_update() {
        let mut state = SessionState::default();
        feed(
            &mut state,
            "todos-update",
            json!([{"content": "explicit"}]),
        );

        feed(&mut state, "message_start", json!({"id": "m1"}));
        let meta = MessageMetadata {
            todos: Some(vec![TodoItem {
                id: "meta".into(),
                content: "from metadata".into(),
                ..Default::default()
            }]),
            ..Default::default()
        };
        feed(
            &mut state,
            "message_end",
            json!({"id": "m1", "message": {"id": "m1", "metadata": meta}}),
        );

        assert_eq!(state.todos[0].content, "explicit");
    }

    #[test]
    fn metadata_todos_apply_when_no_explicit_update_exists() {
        let mut state = SessionState::default();
        feed(&mut state, "message_start", json!({"id": "m1"}));
        feed(
            &mut state,
            "message_end",
            json!({"id": "m1", "message": {"id": "m1", "metadata": {"todos": [{"content": "from metadata"}]}}}),
        );

        assert_eq!(state.todos[0].content, "from metadata");
    }

    #[test]
    fn interrupt_sets_and_done_clears() {
        let mut state = SessionState::default();
        state.is_loading = true;
        feed(
            &mut state,
            "interrupt",
            json!({"id": "i1", "reason": "approval", "value": {"tool": "bash"}}),
        );
        assert!(!state.is_loading);
        assert_eq!(state.interrupt.as_ref().unwrap().id, "i1");

        feed(&mut state, "done", json!({}));
        assert!(state.interrupt.is_none());
        assert!(!state.is_loading);
    }

    #[test]
    fn error_event_records_without_rollback() {
        let mut state = SessionState::default();
        feed(&mut state, "message_start", json!({"id": "m1"}));
        feed(&mut state, "message_delta", json!({"id": "m1", "delta": "keep"}));
        feed(&mut state, "error", json!({"code": "E42", "message": "backend failure"}));

        assert_eq!(state.last_error.as_ref().unwrap().message, "backend failure");
        assert_eq!(state.message("m1").unwrap().content, "keep");
        // Mid-stream errors do not end the turn by themselves
        assert!(state.is_loading);
    }

    #[test]
    fn done_with_error_reason_clears_loading() {
        let mut state = SessionState::default();
        state.is_loading = true;
        feed(&mut state, "done", json!({"reason": "error"}));
        assert!(!state.is_loading);
    }

    #[test]
    fn snapshot_seeds_state_wholesale() {
        let mut state = SessionState::default();
        feed(&mut state, "message_start", json!({"id": "stale"}));
        feed(
            &mut state,
            "session-state",
            json!({
                "messages": [{"id": "m1", "content": "restored", "toolCalls": [{"id": "t1", "name": "bash"}]}],
                "todos": [{"content": "carry on"}],
                "files": [{"path": "/a.md", "content": "X"}],
            }),
        );

        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.message("m1").unwrap().content, "restored");
        assert_eq!(state.tool_calls["t1"].name, "bash");
        assert_eq!(state.todos[0].content, "carry on");
        assert_eq!(state.files["/a.md"].content, "X");
    }

    #[test]
    fn subagent_lifecycle_tracks_as_tool_call() {
        let mut state = SessionState::default();
        feed(&mut state, "message_start", json!({"id": "m1"}));
        feed(
            &mut state,
            "subagent-start",
            json!({"id": "sa1", "name": "researcher", "messageId": "m1"}),
        );
        assert_eq!(state.tool_calls["sa1"].kind, ToolCallKind::Subagent);
        assert_eq!(state.tool_calls["sa1"].status, ToolCallStatus::Running);

        feed(
            &mut state,
            "subagent-end",
            json!({"id": "sa1", "result": {"summary": "done"}}),
        );
        assert_eq!(state.tool_calls["sa1"].status, ToolCallStatus::Completed);
        let msg = state.message("m1").unwrap();
        assert_eq!(msg.tool_calls[0].status, ToolCallStatus::Completed);
    }
}

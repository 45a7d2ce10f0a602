pub mod file;
pub mod interrupt;
pub mod message;
pub mod session;
pub mod todo;
pub mod tool_call;

pub use file::*;
pub use interrupt::*;
pub use message::*;
pub use session::*;
pub use todo::*;
pub use tool_call::*;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_serde_roundtrip() {
        let msg = Message {
            id: "m1".into(),
            session_id: "s1".into(),
            role: Role::Assistant,
            content: "hello".into(),
            created_at: 1000.0,
            parent_message_id: None,
            subagent_name: None,
            tool_calls: vec![ToolCall {
                id: "t1".into(),
                name: "bash".into(),
                args: json!({"command": "ls"}),
                status: ToolCallStatus::Running,
                started_at: Some(1000.0),
                ..Default::default()
            }],
            metadata: Some(MessageMetadata {
                model: Some("sonnet".into()),
                usage: Some(TokenUsage {
                    input_tokens: 10.0,
                    output_tokens: 20.0,
                }),
                todos: None,
                citations: None,
            }),
        };
        let wire = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&wire).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn message_parses_from_partial_payload() {
        let back: Message = serde_json::from_value(json!({"id": "m1"})).unwrap();
        assert_eq!(back.id, "m1");
        assert_eq!(back.role, Role::Assistant);
        assert!(back.content.is_empty());
        assert!(back.tool_calls.is_empty());
    }

    #[test]
    fn tool_call_serde_roundtrip() {
        let call = ToolCall {
            id: "t1".into(),
            name: "write_file".into(),
            kind: ToolCallKind::Tool,
            args: json!({"path": "/a.md"}),
            result: json!({"ok": true}),
            status: ToolCallStatus::Success,
            started_at: Some(1000.0),
            completed_at: Some(1500.0),
            duration_ms: Some(500.0),
            error: None,
            subagent_name: None,
        };
        let wire = serde_json::to_string(&call).unwrap();
        let back: ToolCall = serde_json::from_str(&wire).unwrap();
        assert_eq!(call, back);
    }

    #[test]
    fn tool_call_status_wire_names() {
        assert_eq!(
            serde_json::to_value(ToolCallStatus::Running).unwrap(),
            json!("running")
        );
        assert_eq!(
            serde_json::to_value(ToolCallStatus::Interrupted).unwrap(),
            json!("interrupted")
        );
    }

    #[test]
    fn todo_item_serde_roundtrip() {
        let todo = TodoItem {
            id: "todo-1".into(),
            content: "Fix bug".into(),
            status: TodoStatus::InProgress,
            started_at: Some(1000.0),
            completed_at: None,
            duration_ms: None,
            error: None,
        };
        let wire = serde_json::to_string(&todo).unwrap();
        let back: TodoItem = serde_json::from_str(&wire).unwrap();
        assert_eq!(todo, back);
    }

    #[test]
    fn todo_status_uses_snake_case() {
        assert_eq!(
            serde_json::to_value(TodoStatus::InProgress).unwrap(),
            json!("in_progress")
        );
        assert_eq!(
            serde_json::to_value(TodoStatus::Failed).unwrap(),
            json!("failed")
        );
    }

    #[test]
    fn file_artifact_defaults_to_editable() {
        let file: FileArtifact =
            serde_json::from_value(json!({"path": "/a.md", "content": "X"})).unwrap();
        assert!(file.editable);
        assert!(file.language.is_none());
    }

    #[test]
    fn interrupt_serde_roundtrip() {
        let interrupt = InterruptData {
            id: "i1".into(),
            value: json!({"tool": "bash"}),
            reason: Some("approval".into()),
            action_requests: vec![ActionRequest {
                action: "bash".into(),
                args: json!({"command": "rm -rf /tmp/x"}),
            }],
            review_configs: vec![ReviewConfig {
                allow_accept: true,
                allow_edit: false,
                allow_respond: true,
            }],
        };
        let wire = serde_json::to_string(&interrupt).unwrap();
        let back: InterruptData = serde_json::from_str(&wire).unwrap();
        assert_eq!(interrupt, back);
    }

    #[test]
    fn interrupt_decision_wire_names() {
        assert_eq!(
            serde_json::to_value(InterruptDecision::Approve).unwrap(),
            json!("approve")
        );
        assert_eq!(
            serde_json::to_value(InterruptDecision::Edit).unwrap(),
            json!("edit")
        );
    }

    #[test]
    fn session_summary_serde_roundtrip() {
        let summary = SessionSummary {
            id: "s1".into(),
            title: Some("refactor".into()),
            created_at: 1000.0,
            updated_at: 2000.0,
            model: Some("sonnet".into()),
        };
        let wire = serde_json::to_string(&summary).unwrap();
        let back: SessionSummary = serde_json::from_str(&wire).unwrap();
        assert_eq!(summary, back);
    }
}

//! Tool invocation types.
//!
//! A tool call has two wire representations: the dedicated
//! `tool-call-start` / `tool-call-end` events carry full arguments and
//! results, while the summary embedded in a finalized message may only
//! carry truncated previews. [`ToolCall::merge_preview`] reconciles the
//! two, always preferring the full data.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
#[ts(rename_all = "lowercase")]
pub enum ToolCallKind {
    #[default]
    Tool,
    Subagent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
#[ts(rename_all = "snake_case")]
pub enum ToolCallStatus {
    #[default]
    Pending,
    Running,
    Success,
    Error,
    Interrupted,
    Completed,
}

impl ToolCallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Error | Self::Interrupted | Self::Completed
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
#[ts(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub kind: ToolCallKind,
    pub args: Value,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub result: Value,
    pub status: ToolCallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subagent_name: Option<String>,
}

/// Null, `{}`, `[]`, and `""` all count as "nothing to merge".
fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

impl ToolCall {
    /// Fold a possibly-truncated summary of the same call (merge key is
    /// the id) into this one. Data already tracked here wins; the preview
    /// only fills gaps.
    pub fn merge_preview(&mut self, preview: &ToolCall) {
        if self.name.is_empty() && !preview.name.is_empty() {
            self.name = preview.name.clone();
        }
        if is_empty_payload(&self.args) && !is_empty_payload(&preview.args) {
            self.args = preview.args.clone();
        }
        if is_empty_payload(&self.result) && !is_empty_payload(&preview.result) {
            self.result = preview.result.clone();
        }
        if !self.status.is_terminal() && preview.status.is_terminal() {
            self.status = preview.status;
        }
        if self.started_at.is_none() {
            self.started_at = preview.started_at;
        }
        if self.completed_at.is_none() {
            self.completed_at = preview.completed_at;
        }
        if self.duration_ms.is_none() {
            self.duration_ms = preview.duration_ms;
        }
        if self.error.is_none() {
            self.error = preview.error.clone();
        }
        if self.subagent_name.is_none() {
            self.subagent_name = preview.subagent_name.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tracked() -> ToolCall {
        ToolCall {
            id: "t1".into(),
            name: "bash".into(),
            args: json!({"command": "ls -la"}),
            result: json!({"stdout": "total 0"}),
            status: ToolCallStatus::Success,
            started_at: Some(1000.0),
            completed_at: Some(1200.0),
            duration_ms: Some(200.0),
            ..Default::default()
        }
    }

    #[test]
    fn preview_never_overwrites_full_data() {
        let mut call = tracked();
        let preview = ToolCall {
            id: "t1".into(),
            name: "bash".into(),
            args: json!({"command": "ls…"}),
            result: json!("total…"),
            status: ToolCallStatus::Completed,
            ..Default::default()
        };
        call.merge_preview(&preview);
        assert_eq!(call.args, json!({"command": "ls -la"}));
        assert_eq!(call.result, json!({"stdout": "total 0"}));
        assert_eq!(call.status, ToolCallStatus::Success);
    }

    #[test]
    fn preview_fills_empty_fields() {
        let mut call = ToolCall {
            id: "t1".into(),
            status: ToolCallStatus::Running,
            ..Default::default()
        };
        let preview = tracked();
        call.merge_preview(&preview);
        assert_eq!(call.name, "bash");
        assert_eq!(call.args, json!({"command": "ls -la"}));
        assert_eq!(call.status, ToolCallStatus::Success);
        assert_eq!(call.duration_ms, Some(200.0));
    }

    #[test]
    fn merge_preview_is_idempotent() {
        let mut once = ToolCall {
            id: "t1".into(),
            ..Default::default()
        };
        let preview = tracked();
        once.merge_preview(&preview);
        let mut twice = once.clone();
        twice.merge_preview(&preview);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_object_counts_as_empty() {
        let mut call = ToolCall {
            id: "t1".into(),
            args: json!({}),
            ..Default::default()
        };
        call.merge_preview(&ToolCall {
            id: "t1".into(),
            args: json!({"path": "/a"}),
            ..Default::default()
        });
        assert_eq!(call.args, json!({"path": "/a"}));
    }
}

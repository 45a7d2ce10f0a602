//! Heuristic extraction of todos and file artifacts from heterogeneous
//! tool-result shapes.
//!
//! Backends disagree on how task lists and file payloads are encoded:
//! bare arrays, `{todos}` / `{items}` wrappers, structured `files` maps,
//! or a textual summary with a bracketed, single-quoted list inside.
//! These functions are total and side-effect-free; an unrecognized shape
//! returns `None` / empty and the caller keeps its prior state.

use serde::Deserialize;
use serde_json::Value;

use tether_shared::schemas::{FileArtifact, TodoItem, TodoStatus};

/// Tool names whose arguments directly describe a file write. Used as a
/// fallback when the result carries no structured `files` payload.
const WRITE_TOOL_NAMES: &[&str] = &["write_file", "file-write", "file_write", "create_file", "write"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTodo {
    id: Option<String>,
    #[serde(alias = "task", alias = "title")]
    content: Option<String>,
    #[serde(alias = "state")]
    status: Option<String>,
    #[serde(alias = "startedAt", alias = "started_at")]
    started_at: Option<f64>,
    #[serde(alias = "completedAt", alias = "completed_at")]
    completed_at: Option<f64>,
    #[serde(alias = "durationMs", alias = "duration_ms")]
    duration_ms: Option<f64>,
    error: Option<String>,
}

fn parse_todo_status(raw: Option<&str>) -> TodoStatus {
    match raw.unwrap_or_default() {
        "in_progress" | "in-progress" | "active" => TodoStatus::InProgress,
        "completed" | "complete" | "done" => TodoStatus::Completed,
        "failed" | "error" => TodoStatus::Failed,
        _ => TodoStatus::Pending,
    }
}

/// Extract a full replacement todo list, or `None` when the payload is
/// not a recognizable todos shape.
pub fn extract_todos(raw: &Value) -> Option<Vec<TodoItem>> {
    todos_from_value(raw).or_else(|| raw.get("result").and_then(todos_from_value))
}

fn todos_from_value(value: &Value) -> Option<Vec<TodoItem>> {
    match value {
        Value::Array(_) => parse_todo_array(value),
        Value::String(text) => parse_todo_text(text),
        Value::Object(obj) => obj
            .get("todos")
            .and_then(todos_from_value)
            .or_else(|| obj.get("items").and_then(todos_from_value)),
        _ => None,
    }
}

fn parse_todo_array(value: &Value) -> Option<Vec<TodoItem>> {
    let entries = value.as_array()?;
    let mut todos = Vec::new();

    for entry in entries {
        let todo = match entry {
            Value::String(text) if !text.is_empty() => TodoItem {
                content: text.clone(),
                ..Default::default()
            },
            Value::Object(_) => {
                let raw: RawTodo = serde_json::from_value(entry.clone()).unwrap_or_default();
                let Some(content) = raw.content.filter(|c| !c.is_empty()) else {
                    continue;
                };
                TodoItem {
                    id: raw.id.unwrap_or_default(),
                    content,
                    status: parse_todo_status(raw.status.as_deref()),
                    started_at: raw.started_at,
                    completed_at: raw.completed_at,
                    duration_ms: raw.duration_ms,
                    error: raw.error,
                }
            }
            _ => continue,
        };
        todos.push(todo);
    }

    for (index, todo) in todos.iter_mut().enumerate() {
        if todo.id.is_empty() {
            todo.id = format!("todo-{}", index + 1);
        }
    }

    Some(todos)
}

/// Best-effort parse of a textual payload containing a bracketed list,
/// e.g. `Updated todo list to [{'content': 'a', 'status': 'pending'}]`.
/// Single-quoted entries are normalized to JSON before parsing.
fn parse_todo_text(text: &str) -> Option<Vec<TodoItem>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    let slice = &text[start..=end];

    let parsed: Value = serde_json::from_str(slice)
        .or_else(|_| serde_json::from_str(&slice.replace('\'', "\"")))
        .ok()?;
    parse_todo_array(&parsed)
}

/// Merge-ready file artifacts from a tool result shaped as
/// `{files: {path: {content, language}}}`, directly or nested one level
/// under `result`. Empty when no structured payload is present.
pub fn extract_files(raw: &Value) -> Vec<FileArtifact> {
    files_from_value(raw)
        .or_else(|| raw.get("result").and_then(files_from_value))
        .unwrap_or_default()
}

fn files_from_value(value: &Value) -> Option<Vec<FileArtifact>> {
    let files = value.get("files")?.as_object()?;
    let mut out = Vec::new();

    for (path, entry) in files {
        if path.is_empty() {
            continue;
        }
        let mut artifact = match entry {
            Value::String(content) => FileArtifact::new(path, content.clone()),
            Value::Object(obj) => {
                let content = obj
                    .get("content")
                    .and_then(|c| c.as_str())
                    .unwrap_or_default();
                let mut artifact = FileArtifact::new(path, content);
                artifact.language = obj
                    .get("language")
                    .and_then(|l| l.as_str())
                    .map(String::from);
                artifact
            }
            _ => continue,
        };
        artifact.editable = true;
        out.push(artifact);
    }

    if out.is_empty() { None } else { Some(out) }
}

/// Fallback for write-shaped tools: lift path/content straight from the
/// call's arguments. Only used when the call succeeded and the result
/// carried no structured `files` payload; converges to the same
/// [`FileArtifact`] shape either way.
pub fn file_from_write_args(tool_name: &str, args: &Value) -> Option<FileArtifact> {
    let name = tool_name.to_ascii_lowercase();
    if !WRITE_TOOL_NAMES.contains(&name.as_str()) {
        return None;
    }

    let path = args
        .get("path")
        .or_else(|| args.get("file_path"))
        .or_else(|| args.get("filePath"))
        .or_else(|| args.get("filename"))
        .and_then(|p| p.as_str())
        .filter(|p| !p.is_empty())?;
    let content = args
        .get("content")
        .or_else(|| args.get("text"))
        .or_else(|| args.get("body"))
        .and_then(|c| c.as_str())
        .unwrap_or_default();

    let mut artifact = FileArtifact::new(path, content);
    artifact.language = args
        .get("language")
        .and_then(|l| l.as_str())
        .map(String::from);
    Some(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn todos_from_bare_array() {
        let todos = extract_todos(&json!([
            {"content": "a", "status": "pending"},
            {"content": "b", "status": "in_progress"},
        ]))
        .unwrap();
        assert_eq!(todos.len(), 2);
        assert_eq!(todos[0].content, "a");
        assert_eq!(todos[0].id, "todo-1");
        assert_eq!(todos[1].status, TodoStatus::InProgress);
    }

    #[test]
    fn todos_from_wrapper_objects() {
        let wrapped = extract_todos(&json!({"todos": [{"content": "a"}]})).unwrap();
        assert_eq!(wrapped.len(), 1);

        let items = extract_todos(&json!({"items": [{"task": "b", "state": "done"}]})).unwrap();
        assert_eq!(items[0].content, "b");
        assert_eq!(items[0].status, TodoStatus::Completed);
    }

    #[test]
    fn todos_from_nested_result() {
        let todos =
            extract_todos(&json!({"result": {"todos": [{"content": "deep"}]}})).unwrap();
        assert_eq!(todos[0].content, "deep");
    }

    #[test]
    fn todos_from_quoted_text_payload() {
        let raw = json!("Updated todo list to [{'content':'a','status':'pending'}]");
        let todos = extract_todos(&raw).unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].content, "a");
        assert_eq!(todos[0].status, TodoStatus::Pending);
    }

    #[test]
    fn todos_from_string_entries() {
        let todos = extract_todos(&json!(["first", "second"])).unwrap();
        assert_eq!(todos[1].content, "second");
        assert_eq!(todos[1].id, "todo-2");
    }

    #[test]
    fn unrecognized_todo_shapes_return_none() {
        assert!(extract_todos(&json!({"stdout": "ok"})).is_none());
        assert!(extract_todos(&json!(42)).is_none());
        assert!(extract_todos(&json!("no brackets here")).is_none());
        assert!(extract_todos(&json!("mismatched ] [")).is_none());
    }

    #[test]
    fn explicit_empty_list_is_recognized() {
        assert_eq!(extract_todos(&json!([])), Some(vec![]));
    }

    #[test]
    fn todo_ids_are_kept_when_present() {
        let todos = extract_todos(&json!([{"id": "keep", "content": "a"}])).unwrap();
        assert_eq!(todos[0].id, "keep");
    }

    #[test]
    fn files_from_structured_map() {
        let files = extract_files(&json!({
            "files": {"/a.md": {"content": "X", "language": "markdown"}}
        }));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "/a.md");
        assert_eq!(files[0].content, "X");
        assert_eq!(files[0].language.as_deref(), Some("markdown"));
        assert!(files[0].editable);
    }

    #[test]
    fn files_from_nested_result() {
        let files = extract_files(&json!({"result": {"files": {"/b.rs": {"content": "fn"}}}}));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "/b.rs");
    }

    #[test]
    fn files_accept_bare_string_content() {
        let files = extract_files(&json!({"files": {"/c.txt": "plain"}}));
        assert_eq!(files[0].content, "plain");
    }

    #[test]
    fn empty_or_missing_files_map_yields_nothing() {
        assert!(extract_files(&json!({"files": {}})).is_empty());
        assert!(extract_files(&json!({"stdout": "ok"})).is_empty());
        assert!(extract_files(&json!(null)).is_empty());
    }

    #[test]
    fn write_args_fallback() {
        let artifact =
            file_from_write_args("write_file", &json!({"path": "/a.md", "content": "X"})).unwrap();
        assert_eq!(artifact.path, "/a.md");
        assert_eq!(artifact.content, "X");
        assert!(artifact.editable);

        // Case-insensitive tool match, alternate arg names
        let artifact =
            file_from_write_args("Write", &json!({"file_path": "/b.md", "text": "Y"})).unwrap();
        assert_eq!(artifact.path, "/b.md");
        assert_eq!(artifact.content, "Y");
    }

    #[test]
    fn non_write_tools_never_fallback() {
        assert!(file_from_write_args("bash", &json!({"path": "/a"})).is_none());
        assert!(file_from_write_args("write_file", &json!({"content": "no path"})).is_none());
    }
}

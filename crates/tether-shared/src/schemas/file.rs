//! File artifacts produced by the agent (writes, edits, diffs).

use serde::{Deserialize, Serialize};
use ts_rs::TS;

fn default_editable() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
#[ts(rename_all = "camelCase")]
pub struct FileArtifact {
    pub path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default = "default_editable")]
    pub editable: bool,
    #[serde(default)]
    pub last_modified: f64,
    /// Previous content, when the operation was an edit (diff display).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_end: Option<u32>,
}

impl FileArtifact {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            language: None,
            editable: true,
            last_modified: 0.0,
            old_content: None,
            line_start: None,
            line_end: None,
        }
    }
}

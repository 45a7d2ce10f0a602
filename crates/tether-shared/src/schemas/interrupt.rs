//! Human-in-the-loop interrupt types. At most one interrupt is active
//! per session; the backend pauses until the client resumes it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
#[ts(rename_all = "camelCase")]
pub struct InterruptData {
    pub id: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub action_requests: Vec<ActionRequest>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub review_configs: Vec<ReviewConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
#[ts(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action: String,
    pub args: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
#[ts(rename_all = "camelCase")]
pub struct ReviewConfig {
    pub allow_accept: bool,
    pub allow_edit: bool,
    pub allow_respond: bool,
}

/// The human's decision when resuming an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
#[ts(rename_all = "lowercase")]
pub enum InterruptDecision {
    Approve,
    Reject,
    Edit,
}

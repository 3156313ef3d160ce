//! Stream event types
//!
//! The atomic units of the persisted conversation log. The event set is
//! closed: the backend only ever emits these discriminators, and anything
//! outside them makes the codec fall back to plain-text interpretation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One atomic unit of assistant output in the persisted log.
///
/// Events are strictly ordered: append order is causal order, and past
/// events are never edited, only appended to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Assistant text delta
    #[serde(rename = "assistant_text")]
    AssistantText { text: String },

    /// Extended thinking content
    #[serde(rename = "assistant_thinking")]
    AssistantThinking { thinking: String },

    /// Text the user typed (user messages share the same log format)
    #[serde(rename = "user_text")]
    UserText { text: String },

    /// Tool call started
    #[serde(rename = "tool_started")]
    ToolStarted { tool: ToolPayload },

    /// Tool call finished successfully
    #[serde(rename = "tool_completed")]
    ToolCompleted { tool: ToolPayload },

    /// Tool call finished with an error
    #[serde(rename = "tool_failed")]
    ToolFailed { tool: ToolPayload },

    /// Inline code review comments attached by the user
    #[serde(rename = "code_review")]
    CodeReview { reviews: Vec<LineReview> },

    /// Opaque system payload
    #[serde(rename = "system")]
    System {
        #[serde(default)]
        data: Value,
    },

    /// The assistant is waiting on a tool permission decision
    #[serde(rename = "permission_request")]
    PermissionRequest {
        #[serde(default)]
        request_id: String,
        #[serde(default)]
        tool_name: String,
        #[serde(default)]
        tool_input: Value,
    },
}

/// Lifecycle status carried by tool events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Started,
    Completed,
    Failed,
}

impl ToolStatus {
    /// Completed and failed are terminal: no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ToolStatus::Started)
    }
}

/// Payload shared by the three tool lifecycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPayload {
    pub id: String,
    pub name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolStatus>,
    /// Nesting declaration: this call runs under the named parent call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolPayload {
    pub fn new(id: impl Into<String>, name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            title: title.into(),
            status: None,
            parent_id: None,
            input: None,
            result: None,
            error: None,
        }
    }
}

/// One line-range review comment, persisted with the camelCase keys the
/// web client wrote historically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineReview {
    pub file_path: String,
    #[serde(default)]
    pub line_start: u32,
    #[serde(default)]
    pub line_end: u32,
    #[serde(default)]
    pub selected_code: String,
    pub comment: String,
}

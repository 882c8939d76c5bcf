use serde::{Deserialize, Serialize};

use crate::tool_call::ToolCallId;

/// The outcome of executing a tool call, as it is shown back to the model.
///
/// A `ToolResult` is never fatal to the request — `is_error` just tells the
/// model (and the UI) that it should treat `content` as an error description
/// rather than a normal result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: ToolCallId,
    pub content: String,
    pub is_error: bool,
    pub is_cancelled: bool,
}

impl ToolResult {
    pub fn success(tool_call_id: ToolCallId, content: impl Into<String>) -> Self {
        Self { tool_call_id, content: content.into(), is_error: false, is_cancelled: false }
    }

    /// Formats as `"{ErrorType}: {message}"`.
    pub fn failure(tool_call_id: ToolCallId, error_type: &str, message: impl AsRef<str>) -> Self {
        Self {
            tool_call_id,
            content: format!("{error_type}: {}", message.as_ref()),
            is_error: true,
            is_cancelled: false,
        }
    }

    pub fn cancelled(tool_call_id: ToolCallId, tool_name: &str) -> Self {
        Self {
            tool_call_id,
            content: format!("Tool '{tool_name}' was cancelled before it completed."),
            is_error: true,
            is_cancelled: true,
        }
    }
}

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool_name::ToolName;

/// Identifies a single invocation of a tool within a conversation.
///
/// `tool_call_id` is unique within a conversation; [`ToolCallId::generate`]
/// is used by the dispatcher's text-fallback parser to mint ids for calls
/// the model didn't structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolCallId(String);

impl ToolCallId {
    pub fn new(value: impl ToString) -> Self {
        Self(value.to_string())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The fully-structured call a model turn asked the dispatcher to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFull {
    pub tool_call_id: ToolCallId,
    pub tool_name: ToolName,
    pub args: serde_json::Value,
}

impl ToolCallFull {
    pub fn new(tool_call_id: ToolCallId, tool_name: ToolName, args: serde_json::Value) -> Self {
        Self { tool_call_id, tool_name, args }
    }
}

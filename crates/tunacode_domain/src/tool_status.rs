use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool_name::ToolName;

/// Lifecycle state of one registered tool call. The registry that keys
/// records of this shape by [`crate::tool_call::ToolCallId`] lives in
/// `tunacode_core::dispatch` — it needs the worker pool and cancellation
/// plumbing this crate doesn't depend on — but the state shape itself is
/// pure data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Registered,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ToolCallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ToolCallStatus::Completed | ToolCallStatus::Failed | ToolCallStatus::Cancelled)
    }
}

/// One entry of an ephemeral per-request tool call registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: ToolName,
    pub args: serde_json::Value,
    pub status: ToolCallStatus,
    pub result: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ToolCallRecord {
    pub fn registered(tool_name: ToolName, args: serde_json::Value) -> Self {
        Self { tool_name, args, status: ToolCallStatus::Registered, result: None, started_at: None, ended_at: None }
    }

    pub fn start(&mut self) {
        self.status = ToolCallStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, result: impl Into<String>) {
        self.status = ToolCallStatus::Completed;
        self.result = Some(result.into());
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, result: impl Into<String>) {
        self.status = ToolCallStatus::Failed;
        self.result = Some(result.into());
        self.ended_at = Some(Utc::now());
    }

    pub fn cancel(&mut self, result: impl Into<String>) {
        self.status = ToolCallStatus::Cancelled;
        self.result = Some(result.into());
        self.ended_at = Some(Utc::now());
    }
}

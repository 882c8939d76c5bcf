use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool_call::{ToolCallFull, ToolCallId};
use crate::tool_name::ToolName;
use crate::usage::Usage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

/// One unit of content within a [`Message`]. Variants are tagged so the wire
/// format round-trips without ambiguity.
///
/// Role constraints are not encoded in the type system — a `Message` can in
/// principle carry a `Part` the sanitizer would reject for its role —
/// because the model stream is the only producer of these and a malformed
/// combination is a sanitizer-detectable bug, not a type error a caller
/// could trigger. [`crate::sanitize::sanitize`] is the enforcement point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { content: String },
    /// ASSISTANT only. The model's private reasoning trace.
    Thought { content: String },
    /// SYSTEM only.
    SystemPrompt { content: String },
    /// ASSISTANT only.
    ToolCall {
        tool_call_id: ToolCallId,
        tool_name: ToolName,
        args: serde_json::Value,
    },
    /// TOOL only — a TOOL message carries exactly one of these.
    ToolReturn { tool_call_id: ToolCallId, content: String },
}

impl Part {
    pub fn tool_call_id(&self) -> Option<&ToolCallId> {
        match self {
            Part::ToolCall { tool_call_id, .. } => Some(tool_call_id),
            Part::ToolReturn { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }

    /// Character-based token approximation (~4 chars/token).
    fn char_count(&self) -> usize {
        match self {
            Part::Text { content } | Part::Thought { content } | Part::SystemPrompt { content } => {
                content.chars().count()
            }
            Part::ToolCall { tool_name, args, .. } => {
                tool_name.as_str().chars().count() + args.to_string().chars().count()
            }
            Part::ToolReturn { content, .. } => content.chars().count(),
        }
    }
}

/// The unit of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Sentinel marking a synthetic compaction preamble so the compactor
    /// never folds it back into a subsequent boundary.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_compaction_summary: bool,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            role,
            parts,
            timestamp: Some(Utc::now()),
            usage: None,
            is_compaction_summary: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::Text { content: content.into() }])
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, vec![Part::SystemPrompt { content: content.into() }])
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![Part::Text { content: content.into() }])
    }

    pub fn assistant(
        content: Option<String>,
        thought: Option<String>,
        tool_calls: Vec<ToolCallFull>,
    ) -> Self {
        let mut parts = Vec::new();
        if let Some(thought) = thought {
            parts.push(Part::Thought { content: thought });
        }
        if let Some(content) = content {
            parts.push(Part::Text { content });
        }
        for call in tool_calls {
            parts.push(Part::ToolCall {
                tool_call_id: call.tool_call_id,
                tool_name: call.tool_name,
                args: call.args,
            });
        }
        Self::new(Role::Assistant, parts)
    }

    pub fn tool_return(tool_call_id: ToolCallId, content: impl Into<String>) -> Self {
        Self::new(Role::Tool, vec![Part::ToolReturn { tool_call_id, content: content.into() }])
    }

    /// The synthetic preamble spliced in at a compaction boundary. Carries
    /// the sentinel so a later compaction pass recognizes and skips over it
    /// rather than summarizing it again.
    pub fn compaction_summary(content: impl Into<String>) -> Self {
        let mut message = Self::user(content);
        message.is_compaction_summary = true;
        message
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn is_empty_assistant(&self) -> bool {
        self.role == Role::Assistant && self.parts.is_empty()
    }

    /// Text content concatenated across TEXT parts.
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallFull> + '_ {
        self.parts.iter().filter_map(|part| match part {
            Part::ToolCall { tool_call_id, tool_name, args } => Some(ToolCallFullRef {
                tool_call_id,
                tool_name,
                args,
            }),
            _ => None,
        }).map(|r| r.into())
    }

    pub fn has_tool_calls(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::ToolCall { .. }))
    }

    pub fn token_count_approx(&self) -> usize {
        self.parts.iter().map(Part::char_count).sum::<usize>().div_ceil(4)
    }
}

/// Borrowed view used by [`Message::tool_calls`] to avoid cloning on every
/// iteration; converts into an owned [`ToolCallFull`] on demand.
struct ToolCallFullRef<'a> {
    tool_call_id: &'a ToolCallId,
    tool_name: &'a ToolName,
    args: &'a serde_json::Value,
}

impl From<ToolCallFullRef<'_>> for ToolCallFull {
    fn from(r: ToolCallFullRef<'_>) -> Self {
        ToolCallFull::new(r.tool_call_id.clone(), r.tool_name.clone(), r.args.clone())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn assistant_message_collects_tool_calls() {
        let call = ToolCallFull::new(
            ToolCallId::new("tc_1"),
            ToolName::new("read_file"),
            serde_json::json!({"path": "foo.txt"}),
        );
        let message = Message::assistant(None, None, vec![call.clone()]);

        let collected: Vec<_> = message.tool_calls().collect();
        assert_eq!(collected, vec![call]);
        assert!(message.has_tool_calls());
    }

    #[test]
    fn empty_assistant_message_is_empty() {
        let message = Message::new(Role::Assistant, vec![]);
        assert!(message.is_empty_assistant());
    }

    #[test]
    fn text_content_concatenates_text_parts() {
        let message = Message::new(
            Role::Assistant,
            vec![
                Part::Text { content: "Hello, ".into() },
                Part::ToolCall {
                    tool_call_id: ToolCallId::new("tc_1"),
                    tool_name: ToolName::new("noop"),
                    args: serde_json::json!({}),
                },
                Part::Text { content: "world".into() },
            ],
        );
        assert_eq!(message.text_content(), "Hello, world");
    }

    #[test]
    fn token_count_is_character_based_approximation() {
        let message = Message::user("abcd");
        assert_eq!(message.token_count_approx(), 1);
    }
}

//! Persistence shapes for session storage. These mirror the exact JSON the
//! session store reads and writes — distinct from the canonical
//! [`crate::message::Message`]/[`crate::message::Part`] shapes used
//! in-process — and round-trip unknown keys via a `#[serde(flatten)]`
//! catch-all.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::message::{Message, Part, Role};
use crate::tool_call::{ToolCallFull, ToolCallId};
use crate::tool_name::ToolName;
use crate::usage::Usage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WirePart {
    Text { text: String },
    Thinking { thinking: String },
    ToolCall { id: String, name: String, arguments: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum WireMessage {
    User {
        content: Vec<WirePart>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        compaction_summary: bool,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Assistant {
        content: Vec<WirePart>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    ToolResult {
        tool_call_id: String,
        content: Vec<WirePart>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("tool_result message must carry exactly one content part, found {0}")]
    NotExactlyOneToolReturnPart(usize),
    #[error("assistant message part is not representable on the wire: {0:?}")]
    UnrepresentablePart(Part),
}

/// System messages are never persisted (the system prompt is injected at
/// call time); there is no `WireMessage::System` variant to convert to.
pub fn to_wire(message: &Message) -> Result<WireMessage, WireError> {
    match message.role {
        Role::User => {
            let content = message.parts.iter().map(part_to_wire).collect::<Result<_, _>>()?;
            Ok(WireMessage::User { content, compaction_summary: message.is_compaction_summary, extra: Map::new() })
        }
        Role::Assistant => {
            let content = message.parts.iter().map(part_to_wire).collect::<Result<_, _>>()?;
            Ok(WireMessage::Assistant { content, usage: message.usage, extra: Map::new() })
        }
        Role::Tool => {
            let tool_return = message
                .parts
                .iter()
                .find(|p| matches!(p, Part::ToolReturn { .. }));
            match tool_return {
                Some(Part::ToolReturn { tool_call_id, content }) if message.parts.len() == 1 => {
                    Ok(WireMessage::ToolResult {
                        tool_call_id: tool_call_id.as_str().to_string(),
                        content: vec![WirePart::Text { text: content.clone() }],
                        extra: Map::new(),
                    })
                }
                _ => Err(WireError::NotExactlyOneToolReturnPart(message.parts.len())),
            }
        }
        Role::System => Err(WireError::UnrepresentablePart(Part::SystemPrompt { content: String::new() })),
    }
}

fn part_to_wire(part: &Part) -> Result<WirePart, WireError> {
    match part {
        Part::Text { content } => Ok(WirePart::Text { text: content.clone() }),
        Part::Thought { content } => Ok(WirePart::Thinking { thinking: content.clone() }),
        Part::ToolCall { tool_call_id, tool_name, args } => Ok(WirePart::ToolCall {
            id: tool_call_id.as_str().to_string(),
            name: tool_name.as_str().to_string(),
            arguments: args.clone(),
        }),
        other @ (Part::SystemPrompt { .. } | Part::ToolReturn { .. }) => {
            Err(WireError::UnrepresentablePart(other.clone()))
        }
    }
}

pub fn from_wire(wire: WireMessage) -> Message {
    match wire {
        WireMessage::User { content, compaction_summary, .. } => {
            let parts = content.into_iter().map(part_from_wire).collect();
            let mut message = Message::new(Role::User, parts);
            message.is_compaction_summary = compaction_summary;
            message
        }
        WireMessage::Assistant { content, usage, .. } => {
            let parts = content.into_iter().map(part_from_wire).collect();
            let mut message = Message::new(Role::Assistant, parts);
            message.usage = usage;
            message
        }
        WireMessage::ToolResult { tool_call_id, content, .. } => {
            let text = content
                .into_iter()
                .map(|p| match p {
                    WirePart::Text { text } => text,
                    WirePart::Thinking { thinking } => thinking,
                    WirePart::ToolCall { arguments, .. } => arguments.to_string(),
                })
                .collect::<Vec<_>>()
                .join("");
            Message::tool_return(ToolCallId::new(tool_call_id), text)
        }
    }
}

fn part_from_wire(part: WirePart) -> Part {
    match part {
        WirePart::Text { text } => Part::Text { content: text },
        WirePart::Thinking { thinking } => Part::Thought { content: thinking },
        WirePart::ToolCall { id, name, arguments } => Part::ToolCall {
            tool_call_id: ToolCallId::new(id),
            tool_name: ToolName::new(name),
            args: arguments,
        },
    }
}

/// Convenience used by the dispatcher when it reconstructs an assistant
/// message from structured + fallback-parsed calls.
pub fn assistant_from_calls(text: Option<String>, thought: Option<String>, calls: Vec<ToolCallFull>) -> Message {
    Message::assistant(text, thought, calls)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn user_message_round_trips_through_wire_json() {
        let message = Message::user("hello");
        let wire = to_wire(&message).unwrap();
        let json = serde_json::to_string(&wire).unwrap();
        let parsed: WireMessage = serde_json::from_str(&json).unwrap();
        let back = from_wire(parsed);
        assert_eq!(back.text_content(), "hello");
        assert_eq!(back.role, Role::User);
    }

    #[test]
    fn compaction_summary_sentinel_round_trips() {
        let message = Message::compaction_summary("summary of the earlier conversation");
        let wire = to_wire(&message).unwrap();
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["compaction_summary"], Value::Bool(true));

        let parsed: WireMessage = serde_json::from_value(json).unwrap();
        let back = from_wire(parsed);
        assert!(back.is_compaction_summary);
    }

    #[test]
    fn unknown_keys_round_trip_through_the_flatten_catch_all() {
        let mut json = serde_json::to_value(&WireMessage::User {
            content: vec![WirePart::Text { text: "hi".into() }],
            compaction_summary: false,
            extra: Map::new(),
        })
        .unwrap();
        json.as_object_mut().unwrap().insert("client_id".into(), Value::String("abc".into()));

        let parsed: WireMessage = serde_json::from_value(json.clone()).unwrap();
        let re_serialized = serde_json::to_value(&parsed).unwrap();
        assert_eq!(re_serialized["client_id"], Value::String("abc".into()));
    }

    #[test]
    fn tool_result_message_must_carry_exactly_one_part() {
        let message = Message::new(
            Role::Tool,
            vec![
                Part::ToolReturn { tool_call_id: ToolCallId::new("tc_1"), content: "a".into() },
                Part::ToolReturn { tool_call_id: ToolCallId::new("tc_1"), content: "b".into() },
            ],
        );
        assert!(to_wire(&message).is_err());
    }
}

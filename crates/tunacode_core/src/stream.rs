use std::collections::BTreeMap;

use futures::{Stream, StreamExt};
use tracing::debug;
use tunacode_domain::tool_call::{ToolCallFull, ToolCallId};
use tunacode_domain::tool_name::ToolName;
use tunacode_domain::{Message, Role, Usage};

/// One event of the provider-agnostic model stream.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    AgentStart,
    TurnStart,
    MessageStart { role: Role, id: String },
    MessageUpdate { delta: Delta },
    MessageEnd { message: Option<Message>, usage: Option<Usage> },
    TurnEnd { message: Message, tool_results: Vec<Message> },
    AgentEnd,
}

/// A partial content fragment delivered by `message_update`. `ToolCallPart`
/// fragments are grouped by `call_id` and their `arguments_part` strings
/// concatenated before being parsed as JSON once the turn completes —
/// providers stream tool-call arguments incrementally, not as one chunk.
#[derive(Debug, Clone)]
pub enum Delta {
    Text(String),
    Thinking(String),
    ToolCallPart { call_id: String, name: Option<String>, arguments_part: String },
}

/// Truncation heuristic: trailing "..." with no sentence terminator, or an
/// assistant turn that is empty after trimming. A tunable predicate — swap
/// this function out behind a different heuristic without touching the
/// interpreter.
pub trait TruncationPolicy: Send + Sync {
    fn looks_truncated(&self, text: &str, has_tool_calls: bool) -> bool;
}

#[derive(Debug, Default)]
pub struct DefaultTruncationPolicy;

impl TruncationPolicy for DefaultTruncationPolicy {
    fn looks_truncated(&self, text: &str, has_tool_calls: bool) -> bool {
        if has_tool_calls {
            return false;
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return true;
        }
        let ends_without_terminator = !matches!(trimmed.chars().last(), Some('.' | '!' | '?' | '"' | '\'' | ')'));
        trimmed.ends_with("...") || ends_without_terminator
    }
}

/// The result of consuming one model turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub message: Message,
    pub usage: Option<Usage>,
    pub truncated: bool,
}

/// Consumes a model event stream, reconstituting complete messages from
/// incremental deltas and forwarding them to the caller one turn at a time.
pub struct StreamInterpreter<'a> {
    truncation_policy: &'a dyn TruncationPolicy,
}

impl<'a> StreamInterpreter<'a> {
    pub fn new(truncation_policy: &'a dyn TruncationPolicy) -> Self {
        Self { truncation_policy }
    }

    fn finish(&self, message: Message, usage: Option<Usage>) -> TurnOutcome {
        let truncated = self.truncation_policy.looks_truncated(&message.text_content(), message.has_tool_calls());
        if truncated {
            debug!("Turn looks truncated");
        }
        TurnOutcome { message, usage, truncated }
    }

    /// Drives `stream` to its next `turn_end` (or `agent_end`, for a stream
    /// with no further turns), forwarding text/thinking deltas via
    /// `on_delta` as they arrive. Returns `Ok(None)` once the stream is
    /// exhausted with no further turn produced.
    pub async fn next_turn<S>(
        &self,
        stream: &mut S,
        mut on_delta: impl FnMut(&str),
    ) -> anyhow::Result<Option<TurnOutcome>>
    where
        S: Stream<Item = ModelEvent> + Unpin,
    {
        let mut text = String::new();
        let mut thought = String::new();
        let mut tool_call_parts: BTreeMap<String, (Option<String>, String)> = BTreeMap::new();
        let mut tool_call_order: Vec<String> = Vec::new();
        let mut usage: Option<Usage> = None;
        let mut finalized: Option<Message> = None;

        while let Some(event) = stream.next().await {
            match event {
                ModelEvent::AgentStart | ModelEvent::TurnStart => {}
                ModelEvent::MessageStart { .. } => {}
                ModelEvent::MessageUpdate { delta } => match delta {
                    Delta::Text(chunk) => {
                        on_delta(&chunk);
                        text.push_str(&chunk);
                    }
                    Delta::Thinking(chunk) => thought.push_str(&chunk),
                    Delta::ToolCallPart { call_id, name, arguments_part } => {
                        let entry = tool_call_parts.entry(call_id.clone()).or_insert_with(|| {
                            tool_call_order.push(call_id.clone());
                            (None, String::new())
                        });
                        if entry.0.is_none() {
                            entry.0 = name;
                        }
                        entry.1.push_str(&arguments_part);
                    }
                },
                ModelEvent::MessageEnd { message, usage: event_usage } => {
                    if let Some(u) = event_usage {
                        usage = Some(usage.map(|mut total: Usage| {
                            total += u;
                            total
                        }).unwrap_or(u));
                    }
                    if let Some(m) = message {
                        finalized = Some(m);
                    }
                }
                ModelEvent::TurnEnd { message, .. } => {
                    return Ok(Some(self.finish(message, usage)));
                }
                ModelEvent::AgentEnd => break,
            }
        }

        if let Some(message) = finalized {
            return Ok(Some(self.finish(message, usage)));
        }

        if text.is_empty() && thought.is_empty() && tool_call_order.is_empty() {
            return Ok(None);
        }

        let calls = assemble_tool_calls(tool_call_order, tool_call_parts);
        let message = Message::assistant(
            if text.is_empty() { None } else { Some(text) },
            if thought.is_empty() { None } else { Some(thought) },
            calls,
        );
        Ok(Some(self.finish(message, usage)))
    }
}

fn assemble_tool_calls(
    order: Vec<String>,
    mut parts: BTreeMap<String, (Option<String>, String)>,
) -> Vec<ToolCallFull> {
    order
        .into_iter()
        .filter_map(|call_id| {
            let (name, arguments_raw) = parts.remove(&call_id)?;
            let name = name.unwrap_or_default();
            let args = serde_json::from_str(&arguments_raw).unwrap_or(serde_json::json!({}));
            Some(ToolCallFull::new(ToolCallId::new(call_id), ToolName::new(name), args))
        })
        .collect()
}

use std::collections::HashSet;

use crate::message::{Message, Part, Role};
use crate::tool_call::ToolCallId;

/// Safety bound on the fixed-point loop.
const MAX_ITERATIONS: usize = 10;

/// Cleans artifacts that can poison the next request: dangling tool calls,
/// empty assistant messages, consecutive user/system runs, and any SYSTEM
/// message at all. Runs to a fixed point, pure with respect to content — it
/// only ever removes.
pub fn sanitize(history: Vec<Message>) -> Vec<Message> {
    let mut current = history;
    for _ in 0..MAX_ITERATIONS {
        let next = pass(current.clone());
        if next == current {
            return next;
        }
        current = next;
    }
    current
}

fn pass(messages: Vec<Message>) -> Vec<Message> {
    let messages = remove_dangling_tool_calls(messages);
    let messages = remove_empty_assistant_messages(messages);
    let messages = collapse_consecutive_request_runs(messages);
    strip_system_messages(messages)
}

/// Operation 1: delete TOOL_CALL parts with no matching TOOL_RETURN anywhere
/// in history; drop the assistant message entirely if that empties it.
fn remove_dangling_tool_calls(messages: Vec<Message>) -> Vec<Message> {
    let return_ids: HashSet<&ToolCallId> = messages
        .iter()
        .flat_map(|m| m.parts.iter())
        .filter_map(|p| match p {
            Part::ToolReturn { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        })
        .collect();

    messages
        .into_iter()
        .filter_map(|mut message| {
            message.parts.retain(|part| match part {
                Part::ToolCall { tool_call_id, .. } => return_ids.contains(tool_call_id),
                _ => true,
            });
            if message.role == Role::Assistant && message.parts.is_empty() {
                None
            } else {
                Some(message)
            }
        })
        .collect()
}

/// Operation 2: drop messages with no meaningful parts left at all (not just
/// assistant ones — an empty TOOL/USER/SYSTEM message is equally inert).
fn remove_empty_assistant_messages(messages: Vec<Message>) -> Vec<Message> {
    messages.into_iter().filter(|m| !m.parts.is_empty()).collect()
}

/// Operation 3: in any run of ≥2 adjacent USER/SYSTEM messages, keep only
/// the last. Must run before operation 4 strips SYSTEM outright, since a
/// trailing SYSTEM message in a run still needs to "win" the collapse before
/// it is stripped.
fn collapse_consecutive_request_runs(messages: Vec<Message>) -> Vec<Message> {
    let mut result: Vec<Message> = Vec::with_capacity(messages.len());
    for message in messages {
        if is_request_role(message.role) {
            if let Some(last) = result.last() {
                if is_request_role(last.role) {
                    result.pop();
                }
            }
        }
        result.push(message);
    }
    result
}

fn is_request_role(role: Role) -> bool {
    matches!(role, Role::User | Role::System)
}

/// Operation 4: the system prompt is injected at call time, never carried in
/// history.
fn strip_system_messages(messages: Vec<Message>) -> Vec<Message> {
    messages.into_iter().filter(|m| m.role != Role::System).collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tool_name::ToolName;

    fn dangling_call(id: &str) -> Message {
        Message::new(
            Role::Assistant,
            vec![Part::ToolCall {
                tool_call_id: ToolCallId::new(id),
                tool_name: ToolName::new("read_file"),
                args: serde_json::json!({}),
            }],
        )
    }

    #[test]
    fn removes_dangling_tool_call_and_drops_now_empty_message() {
        let history = vec![Message::user("what's in foo.txt?"), dangling_call("tc_9")];
        let sanitized = sanitize(history);
        assert_eq!(sanitized.len(), 1);
        assert_eq!(sanitized[0].role, Role::User);
    }

    #[test]
    fn keeps_tool_call_with_matching_return() {
        let id = ToolCallId::new("tc_1");
        let history = vec![
            Message::user("what's in foo.txt?"),
            Message::new(
                Role::Assistant,
                vec![Part::ToolCall { tool_call_id: id.clone(), tool_name: ToolName::new("read_file"), args: serde_json::json!({}) }],
            ),
            Message::tool_return(id, "contents"),
        ];
        let sanitized = sanitize(history.clone());
        assert_eq!(sanitized, history);
    }

    #[test]
    fn collapses_consecutive_user_runs_to_the_last() {
        let history = vec![Message::user("first"), Message::user("second"), Message::system("sys")];
        let sanitized = sanitize(history);
        // the run collapses to the system message, which operation 4 then strips
        assert!(sanitized.is_empty());
    }

    #[test]
    fn is_idempotent() {
        let history = vec![Message::user("hi"), Message::assistant_text("hello")];
        let once = sanitize(history);
        let twice = sanitize(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_and_all_system_histories_reduce_to_empty() {
        assert!(sanitize(vec![]).is_empty());
        assert!(sanitize(vec![Message::system("a"), Message::system("b")]).is_empty());
    }
}

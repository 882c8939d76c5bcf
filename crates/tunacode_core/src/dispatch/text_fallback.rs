use serde_json::Value;
use tunacode_domain::tool_call::{ToolCallFull, ToolCallId};
use tunacode_domain::tool_name::ToolName;

/// Substrings that suggest free text might be carrying an un-structured
/// tool call, checked case-insensitively before we bother scanning for JSON.
const INDICATORS: &[&str] = &["tool_call", "function_call", "<tool_call>"];

/// Parses zero or more tool calls out of raw assistant text when the model
/// didn't emit structured `TOOL_CALL` parts. Each synthesized call gets a
/// freshly generated id, since nothing in free text identifies one.
///
/// Scans for balanced `{...}` JSON objects containing both a name field
/// (`name` or `tool_name`) and an arguments field (`arguments` or `args`);
/// anything else in the text is ignored.
pub fn parse(text: &str) -> Vec<ToolCallFull> {
    let lower = text.to_lowercase();
    if !INDICATORS.iter().any(|marker| lower.contains(marker)) {
        return Vec::new();
    }

    json_objects(text)
        .into_iter()
        .filter_map(|object| {
            let name = object.get("name").or_else(|| object.get("tool_name"))?.as_str()?.to_string();
            let args = object.get("arguments").or_else(|| object.get("args")).cloned().unwrap_or(Value::Null);
            Some(ToolCallFull::new(ToolCallId::generate(), ToolName::new(name), args))
        })
        .collect()
}

/// Finds top-level balanced-brace substrings and parses each as JSON,
/// discarding anything that doesn't parse as a JSON object.
fn json_objects(text: &str) -> Vec<serde_json::Map<String, Value>> {
    let bytes = text.as_bytes();
    let mut objects = Vec::new();
    let mut depth = 0i32;
    let mut start = None;

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        if let Ok(Value::Object(map)) = serde_json::from_str(&text[s..=i]) {
                            objects.push(map);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    objects
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn returns_nothing_without_an_indicator_substring() {
        assert!(parse("just a normal reply, no calls here").is_empty());
    }

    #[test]
    fn parses_a_single_synthesized_call() {
        let text = r#"I'll use a tool_call: {"name": "read_file", "arguments": {"path": "foo.txt"}}"#;
        let calls = parse(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name.as_str(), "read_file");
        assert_eq!(calls[0].args, serde_json::json!({"path": "foo.txt"}));
    }

    #[test]
    fn parses_multiple_calls_in_one_reply() {
        let text = r#"tool_call {"name": "a", "arguments": {}} and also {"name": "b", "args": {"x": 1}}"#;
        let calls = parse(text);
        assert_eq!(calls.len(), 2);
    }
}

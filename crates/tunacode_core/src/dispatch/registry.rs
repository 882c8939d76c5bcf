use std::collections::HashMap;

use tunacode_domain::tool_call::ToolCallId;
use tunacode_domain::tool_name::ToolName;
use tunacode_domain::tool_status::{ToolCallRecord, ToolCallStatus};

/// Ephemeral per-request registry. Created fresh for each `process_request`
/// call and dropped at request end — it never outlives one request.
#[derive(Debug, Default)]
pub struct ToolCallRegistry {
    entries: HashMap<ToolCallId, ToolCallRecord>,
}

impl ToolCallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails if `id` is already present — `tool_call_id` is unique within a
    /// conversation, so a duplicate insert is a caller bug, not a runtime
    /// condition to paper over.
    pub fn register(&mut self, id: ToolCallId, tool_name: ToolName, args: serde_json::Value) -> Result<(), ToolCallId> {
        if self.entries.contains_key(&id) {
            return Err(id);
        }
        self.entries.insert(id, ToolCallRecord::registered(tool_name, args));
        Ok(())
    }

    pub fn get_mut(&mut self, id: &ToolCallId) -> Option<&mut ToolCallRecord> {
        self.entries.get_mut(id)
    }

    pub fn get(&self, id: &ToolCallId) -> Option<&ToolCallRecord> {
        self.entries.get(id)
    }

    pub fn is_drained(&self) -> bool {
        self.entries.values().all(|r| r.status.is_terminal())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Used by the sanitizer's dangling-call cleanup: drops any entry whose
    /// id is no longer present in history.
    pub fn retain(&mut self, keep: impl Fn(&ToolCallId) -> bool) {
        self.entries.retain(|id, _| keep(id));
    }
}

/// Tracks consecutive failures of the same tool within a single turn. Once a
/// tool trips `max_consecutive_failures`, the orchestrator is forced to
/// yield rather than let a tool fail silently forever within one iteration
/// budget.
#[derive(Debug, Default)]
pub struct ToolErrorTracker {
    consecutive_failures: HashMap<ToolName, u32>,
}

impl ToolErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, tool_name: &ToolName) {
        self.consecutive_failures.remove(tool_name);
    }

    /// Returns the new consecutive-failure count for `tool_name`.
    pub fn record_failure(&mut self, tool_name: &ToolName) -> u32 {
        let count = self.consecutive_failures.entry(tool_name.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn exceeded(&self, tool_name: &ToolName, limit: u32) -> bool {
        self.consecutive_failures.get(tool_name).is_some_and(|&count| count >= limit)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn register_rejects_duplicate_ids() {
        let mut registry = ToolCallRegistry::new();
        let id = ToolCallId::new("tc_1");
        assert!(registry.register(id.clone(), ToolName::new("read_file"), serde_json::json!({})).is_ok());
        assert!(registry.register(id, ToolName::new("read_file"), serde_json::json!({})).is_err());
    }

    #[test]
    fn tracker_resets_on_success_and_trips_at_the_limit() {
        let mut tracker = ToolErrorTracker::new();
        let name = ToolName::new("grep");
        assert_eq!(tracker.record_failure(&name), 1);
        assert_eq!(tracker.record_failure(&name), 2);
        assert!(!tracker.exceeded(&name, 3));
        assert_eq!(tracker.record_failure(&name), 3);
        assert!(tracker.exceeded(&name, 3));

        tracker.record_success(&name);
        assert!(!tracker.exceeded(&name, 3));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bookkeeping the compaction controller leaves behind on a [`crate::conversation::Conversation`]
/// after it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionRecord {
    pub summary: String,
    pub compacted_message_count: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub compaction_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_summary: Option<String>,
    pub last_compacted_at: DateTime<Utc>,
}

impl CompactionRecord {
    pub fn first(
        summary: String,
        compacted_message_count: usize,
        tokens_before: usize,
        tokens_after: usize,
    ) -> Self {
        Self {
            summary,
            compacted_message_count,
            tokens_before,
            tokens_after,
            compaction_count: 1,
            previous_summary: None,
            last_compacted_at: Utc::now(),
        }
    }

    /// Folds a new pass on top of a prior record, keeping the old summary
    /// around as `previous_summary` for one generation.
    pub fn next(&self, summary: String, compacted_message_count: usize, tokens_before: usize, tokens_after: usize) -> Self {
        Self {
            summary,
            compacted_message_count,
            tokens_before,
            tokens_after,
            compaction_count: self.compaction_count + 1,
            previous_summary: Some(self.summary.clone()),
            last_compacted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn next_carries_forward_previous_summary_and_increments_count() {
        let first = CompactionRecord::first("summary one".into(), 10, 5_000, 1_200);
        let second = first.next("summary two".into(), 14, 6_000, 1_400);

        assert_eq!(second.compaction_count, 2);
        assert_eq!(second.previous_summary, Some("summary one".into()));
        assert_eq!(second.summary, "summary two");
    }
}

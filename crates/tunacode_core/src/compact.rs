use std::collections::HashSet;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tunacode_domain::tool_call::ToolCallId;
use tunacode_domain::{CompactionRecord, Conversation, Message, Part, Usage};

/// Produces the summary text during a compaction pass. Kept distinct from
/// [`crate::model_client::ModelClient`] since a summarization call has a
/// different shape (a plain prompt/response, not a tool-using stream) and
/// may legitimately be served by a cheaper model.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        previous_summary: Option<&str>,
        rendered_prefix: &str,
        cancel: CancellationToken,
    ) -> anyhow::Result<(String, Usage)>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompactionSkipReason {
    AlreadyCompacted,
    BelowThreshold,
    NoValidBoundary,
    SummarizationFailed(String),
    UnsupportedProvider,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompactionOutcome {
    Applied { tokens_before: usize, tokens_after: usize },
    Skipped(CompactionSkipReason),
}

pub struct Compactor<'a, S: Summarizer> {
    summarizer: &'a S,
}

impl<'a, S: Summarizer> Compactor<'a, S> {
    pub fn new(summarizer: &'a S) -> Self {
        Self { summarizer }
    }

    /// Runs one compaction pass if the threshold is crossed. `keep_recent_tokens`
    /// is the caller's choice of budget — the forced-retry path on context
    /// overflow passes a lower value than the ordinary pre-request check.
    pub async fn maybe_compact(
        &self,
        conversation: &mut Conversation,
        keep_recent_tokens: usize,
        reserve_tokens: usize,
        max_context_window: usize,
        already_compacted_this_request: bool,
        cancel: CancellationToken,
    ) -> CompactionOutcome {
        if already_compacted_this_request {
            return CompactionOutcome::Skipped(CompactionSkipReason::AlreadyCompacted);
        }

        let tokens_before = conversation.token_count_approx();
        if tokens_before + keep_recent_tokens + reserve_tokens <= max_context_window {
            return CompactionOutcome::Skipped(CompactionSkipReason::BelowThreshold);
        }

        let boundary = match select_boundary(&conversation.history, keep_recent_tokens) {
            Some(b) => b,
            None => {
                warn!(tokens_before, keep_recent_tokens, "No valid compaction boundary found");
                return CompactionOutcome::Skipped(CompactionSkipReason::NoValidBoundary);
            }
        };

        let previous_summary = conversation.compaction.as_ref().map(|c| c.summary.as_str());
        let rendered_prefix = render_prefix(&conversation.history[..boundary]);

        let (summary, usage) = match self.summarizer.summarize(previous_summary, &rendered_prefix, cancel).await {
            Ok((summary, _)) if summary.trim().is_empty() => {
                warn!("Summarizer returned an empty summary, skipping compaction");
                return CompactionOutcome::Skipped(CompactionSkipReason::SummarizationFailed(
                    "summarizer returned an empty summary".to_string(),
                ));
            }
            Ok(pair) => pair,
            Err(error) => {
                warn!(error = ?error, "Summarization call failed, skipping compaction");
                return CompactionOutcome::Skipped(CompactionSkipReason::SummarizationFailed(error.to_string()));
            }
        };

        info!(boundary, tokens_before, "Created context compaction summary");

        let tokens_in_suffix: usize = conversation.history[boundary..].iter().map(Message::token_count_approx).sum();
        let summary_message = Message::compaction_summary(summary.clone());
        let tokens_after = summary_message.token_count_approx() + tokens_in_suffix;

        let mut new_history = Vec::with_capacity(1 + conversation.history.len() - boundary);
        new_history.push(summary_message);
        new_history.extend(conversation.history.drain(boundary..));
        conversation.history = new_history;

        conversation.compaction = Some(match &conversation.compaction {
            Some(previous) => previous.next(summary, boundary, tokens_before, tokens_after),
            None => CompactionRecord::first(summary, boundary, tokens_before, tokens_after),
        });
        conversation.metrics.record(usage);

        CompactionOutcome::Applied { tokens_before, tokens_after }
    }
}

/// Finds the largest index such that `history[index:]` fits within
/// `keep_recent_tokens` and does not split a tool-call/return pair — no
/// `ToolReturn` in the kept suffix may reference a `ToolCall` left behind in
/// the dropped prefix.
fn select_boundary(history: &[Message], keep_recent_tokens: usize) -> Option<usize> {
    let mut suffix_tokens = 0usize;
    let mut best: Option<usize> = None;

    for index in (0..history.len()).rev() {
        suffix_tokens += history[index].token_count_approx();
        if suffix_tokens > keep_recent_tokens {
            break;
        }
        if is_valid_boundary(history, index) {
            best = Some(index);
        }
    }

    best
}

/// A boundary at `index` is valid when no message in `history[index..]`
/// returns a tool call whose matching call lives in `history[..index]`, and
/// when `index` does not land inside an already-present compaction summary.
fn is_valid_boundary(history: &[Message], index: usize) -> bool {
    if history.get(index).is_some_and(|m| m.is_compaction_summary) {
        return true;
    }

    let calls_in_prefix: HashSet<&ToolCallId> = history[..index]
        .iter()
        .flat_map(|m| m.parts.iter())
        .filter_map(|part| match part {
            Part::ToolCall { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        })
        .collect();

    if calls_in_prefix.is_empty() {
        return true;
    }

    !history[index..].iter().flat_map(|m| m.parts.iter()).any(|part| match part {
        Part::ToolReturn { tool_call_id, .. } => calls_in_prefix.contains(tool_call_id),
        _ => false,
    })
}

fn render_prefix(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|message| format!("{:?}: {}", message.role, message.text_content()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tunacode_domain::tool_name::ToolName;

    use super::*;

    struct StubSummarizer {
        summary: &'static str,
    }

    #[async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(
            &self,
            _previous_summary: Option<&str>,
            _rendered_prefix: &str,
            _cancel: CancellationToken,
        ) -> anyhow::Result<(String, Usage)> {
            Ok((self.summary.to_string(), Usage { prompt_tokens: 100, completion_tokens: 20, cached_tokens: 0, cost: Some(0.001) }))
        }
    }

    fn long_user_message(repeat: usize) -> Message {
        Message::user("x".repeat(repeat))
    }

    #[tokio::test]
    async fn skips_below_threshold() {
        let mut conversation = Conversation::new();
        conversation.push(Message::user("hi"));
        let summarizer = StubSummarizer { summary: "summary" };
        let compactor = Compactor::new(&summarizer);

        let outcome = compactor.maybe_compact(&mut conversation, 20_000, 16_384, 128_000, false, CancellationToken::new()).await;
        assert_eq!(outcome, CompactionOutcome::Skipped(CompactionSkipReason::BelowThreshold));
    }

    fn conversation_needing_compaction() -> Conversation {
        let mut conversation = Conversation::new();
        for _ in 0..6 {
            conversation.push(long_user_message(100_000));
        }
        conversation.push(Message::user("continue"));
        conversation
    }

    #[tokio::test]
    async fn applies_and_replaces_prefix_with_a_sentinel_message() {
        let mut conversation = conversation_needing_compaction();
        let summarizer = StubSummarizer { summary: "the user discussed several topics" };
        let compactor = Compactor::new(&summarizer);

        let outcome = compactor.maybe_compact(&mut conversation, 1_000, 16_384, 128_000, false, CancellationToken::new()).await;
        assert!(matches!(outcome, CompactionOutcome::Applied { .. }));
        assert!(conversation.history[0].is_compaction_summary);
        assert_eq!(conversation.history.last().unwrap().text_content(), "continue");
        assert_eq!(conversation.compaction.as_ref().unwrap().compaction_count, 1);
    }

    #[tokio::test]
    async fn already_compacted_guard_short_circuits() {
        let mut conversation = conversation_needing_compaction();
        let summarizer = StubSummarizer { summary: "summary" };
        let compactor = Compactor::new(&summarizer);

        let outcome = compactor.maybe_compact(&mut conversation, 1_000, 16_384, 128_000, true, CancellationToken::new()).await;
        assert_eq!(outcome, CompactionOutcome::Skipped(CompactionSkipReason::AlreadyCompacted));
    }

    #[test]
    fn boundary_never_splits_a_tool_call_from_its_return() {
        let call_id = ToolCallId::new("tc_1");
        let history = vec![
            Message::user("x".repeat(80_000)),
            Message::assistant(None, None, vec![tunacode_domain::tool_call::ToolCallFull::new(
                call_id.clone(),
                ToolName::new("grep"),
                serde_json::json!({}),
            )]),
            Message::tool_return(call_id, "result"),
        ];

        let boundary = select_boundary(&history, 1_000);
        assert_eq!(boundary, Some(1));
    }
}

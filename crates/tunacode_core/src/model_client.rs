use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use tunacode_domain::{Message, ModelId, ToolSpec};

use crate::stream::ModelEvent;

/// The service boundary to the language model. Only the event stream
/// contract is specified; the HTTP transport and provider protocol live
/// entirely on the implementer's side.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn stream(
        &self,
        system_prompt: &str,
        history: &[Message],
        tools: &[ToolSpec],
        model: &ModelId,
        cancel: CancellationToken,
    ) -> anyhow::Result<BoxStream<'static, ModelEvent>>;
}

/// A substring the provider is expected to surface on a context-overflow
/// error, matched case-insensitively against the error's display text.
pub fn looks_like_context_overflow(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("context_length_exceeded") || lower.contains("maximum context length")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn recognizes_either_overflow_pattern_case_insensitively() {
        assert!(looks_like_context_overflow("Error: CONTEXT_LENGTH_EXCEEDED"));
        assert!(looks_like_context_overflow("This request exceeds the Maximum Context Length allowed"));
        assert_eq!(looks_like_context_overflow("some other failure"), false);
    }
}

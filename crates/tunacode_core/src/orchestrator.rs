use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tunacode_domain::{Conversation, CoreError, Message, ModelId, OrchestratorConfig, ToolSpec};

use crate::callbacks::CallbackSet;
use crate::compact::{CompactionOutcome, Compactor, Summarizer};
use crate::dispatch::registry::{ToolCallRegistry, ToolErrorTracker};
use crate::dispatch::{InterruptionReason, ToolDispatcher, ToolInvoker};
use crate::model_client::{looks_like_context_overflow, ModelClient};
use crate::retry::{retry_transient, RetryConfig};
use crate::stream::{DefaultTruncationPolicy, StreamInterpreter};

const INTERRUPTED_MARKER: &str = "[INTERRUPTED]";
const EMPTY_RESPONSE_NOTICE: &str = "The previous turn produced no output. State what you intend to do next, or call a tool.";

#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    Complete,
    Aborted,
    MaxIterations,
    EmptyResponse,
    ContextOverflow { estimated_tokens: usize, max_tokens: usize },
}

pub struct AssistantOutcome {
    pub final_message: Message,
    pub stop_reason: StopReason,
}

/// Drives one user message to a terminal state. Generic over the three
/// service boundaries so the whole loop can run against mocks in tests —
/// only `Conversation`/`OrchestratorConfig` are owned state.
pub struct Orchestrator<M: ModelClient, T: ToolInvoker, S: Summarizer> {
    conversation: Conversation,
    config: OrchestratorConfig,
    model_client: M,
    tool_invoker: T,
    tool_specs: Vec<ToolSpec>,
    system_prompt: String,
    retry_config: RetryConfig,
    _summarizer: std::marker::PhantomData<S>,
}

impl<M: ModelClient, T: ToolInvoker, S: Summarizer> Orchestrator<M, T, S> {
    pub fn new(
        conversation: Conversation,
        config: OrchestratorConfig,
        model_client: M,
        tool_invoker: T,
        tool_specs: Vec<ToolSpec>,
        system_prompt: String,
    ) -> Self {
        Self {
            conversation,
            config,
            model_client,
            tool_invoker,
            tool_specs,
            system_prompt,
            retry_config: RetryConfig::default(),
            _summarizer: std::marker::PhantomData,
        }
    }

    /// Overrides the backoff knobs used to retry a transient model-stream
    /// error (network blip, rate limit) before opening a turn's stream.
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub async fn process_request(
        &mut self,
        user_message: String,
        model: ModelId,
        summarizer: &S,
        callbacks: CallbackSet,
        cancel: CancellationToken,
    ) -> Result<AssistantOutcome, CoreError> {
        if user_message.trim().is_empty() {
            return Err(CoreError::InvalidInput);
        }

        debug!(conversation_id = %self.conversation.id, model = %model, "Processing request");

        let body = async {
            self.conversation.history = tunacode_domain::sanitize::sanitize(std::mem::take(&mut self.conversation.history));
            self.conversation.push(Message::user(user_message.clone()));

            self.run_with_context_overflow_retry(&model, summarizer, &callbacks, &cancel).await
        };

        match self.config.global_request_timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), body).await {
                Ok(result) => result,
                Err(_elapsed) => Err(self.finish_with_timeout()),
            },
            None => body.await,
        }
    }

    async fn run_with_context_overflow_retry(
        &mut self,
        model: &ModelId,
        summarizer: &S,
        callbacks: &CallbackSet,
        cancel: &CancellationToken,
    ) -> Result<AssistantOutcome, CoreError> {
        let already_compacted = self.maybe_compact(summarizer, false, false, callbacks, cancel).await;

        match self.drive_turns(model, callbacks, cancel).await {
            Err(CoreError::ContextOverflow { estimated, limit, model: overflowing_model }) => {
                warn!(estimated, limit, model = %overflowing_model, "Context overflow, forcing compaction and retrying once");
                callbacks.notice("Context overflow detected, compacting history and retrying.");
                self.maybe_compact(summarizer, true, already_compacted, callbacks, cancel).await;
                self.drive_turns(model, callbacks, cancel).await.map_err(|error| match error {
                    CoreError::ContextOverflow { .. } => {
                        warn!(estimated, limit, model = %overflowing_model, "Context overflow persisted after forced compaction");
                        CoreError::ContextOverflow { estimated, limit, model: overflowing_model }
                    }
                    other => other,
                })
            }
            other => other,
        }
    }

    /// Runs one compaction pass and returns whether it actually applied.
    /// `already_compacted_this_request` is the idempotence guard: the caller
    /// passes `true` once a compaction has already been applied earlier in
    /// the same `process_request` call, so a forced retry right behind an
    /// already-applied compaction skips rather than summarizing the same
    /// prefix twice.
    async fn maybe_compact(
        &mut self,
        summarizer: &S,
        forced: bool,
        already_compacted_this_request: bool,
        callbacks: &CallbackSet,
        cancel: &CancellationToken,
    ) -> bool {
        let keep_recent = if forced { self.config.forced_keep_recent_tokens } else { self.config.keep_recent_tokens };
        let compactor = Compactor::new(summarizer);
        callbacks.compaction_status(true);
        let outcome = compactor
            .maybe_compact(
                &mut self.conversation,
                keep_recent,
                self.config.reserve_tokens,
                self.config.max_context_window,
                already_compacted_this_request,
                cancel.clone(),
            )
            .await;
        callbacks.compaction_status(false);

        let applied = matches!(outcome, CompactionOutcome::Applied { .. });
        match outcome {
            CompactionOutcome::Applied { tokens_before, tokens_after } => {
                info!(tokens_before, tokens_after, forced, "Compacted conversation history");
                callbacks.notice(&format!("Compacted history: {tokens_before} -> {tokens_after} estimated tokens."));
            }
            CompactionOutcome::Skipped(reason) => {
                debug!(?reason, forced, "Compaction skipped");
                if forced {
                    callbacks.notice(&format!("Compaction skipped: {reason:?}"));
                }
            }
        }
        applied
    }

    async fn drive_turns(
        &mut self,
        model: &ModelId,
        callbacks: &CallbackSet,
        cancel: &CancellationToken,
    ) -> Result<AssistantOutcome, CoreError> {
        let mut iterations = 0u32;
        let mut consecutive_empty = 0u32;
        let mut registry = ToolCallRegistry::new();
        let mut error_tracker = ToolErrorTracker::new();
        let dispatcher = ToolDispatcher::new(
            self.config.worker_pool_width,
            Duration::from_secs(self.config.tool_timeout_secs),
            self.config.max_consecutive_tool_failures,
        );
        let interpreter = StreamInterpreter::new(&DefaultTruncationPolicy);

        loop {
            if cancel.is_cancelled() {
                return Ok(self.finish_aborted());
            }

            if let Some(max_requests) = self.config.max_requests_per_turn {
                if iterations >= max_requests {
                    return Err(self.finish_with_max_iterations());
                }
            }

            let model_client = &self.model_client;
            let system_prompt = &self.system_prompt;
            let history = &self.conversation.history;
            let tool_specs = &self.tool_specs;
            let stream_result = retry_transient(&self.retry_config, || {
                let cancel = cancel.clone();
                async move { model_client.stream(system_prompt, history, tool_specs, model, cancel).await }
            })
            .await;
            let mut stream = stream_result.map_err(|error| self.classify_stream_error(error, model))?;

            let Some(turn) = interpreter
                .next_turn(&mut stream, |chunk| callbacks.delta(chunk))
                .await
                .map_err(|error| self.classify_stream_error(error, model))?
            else {
                return Ok(self.finish_aborted());
            };

            let mut assistant_message = turn.message;
            if let Some(usage) = turn.usage {
                self.conversation.metrics.record(usage);
                assistant_message = assistant_message.with_usage(usage);
            }

            let calls = dispatcher.extract_calls(&mut assistant_message);
            self.conversation.push(assistant_message.clone());
            iterations += 1;
            debug!(iterations, tool_call_count = calls.len(), "Turn ended");

            if cancel.is_cancelled() {
                return Ok(self.finish_aborted());
            }

            if !calls.is_empty() {
                consecutive_empty = 0;
                let outcome = dispatcher
                    .dispatch(calls, &self.tool_invoker, &mut registry, &mut error_tracker, cancel.clone(), callbacks)
                    .await;
                for tool_return in outcome.tool_returns {
                    self.conversation.push(tool_return);
                }

                if let Some(InterruptionReason::ToolFailureLimitReached { tool_name, limit }) = outcome.interruption {
                    warn!(%tool_name, limit, "Tool failed repeatedly in a row, yielding to the model");
                    callbacks.notice(&format!("Tool '{tool_name}' failed {limit} times in a row; yielding to the model."));
                }

                if iterations >= self.config.max_iterations {
                    return Err(self.finish_with_max_iterations());
                }
                continue;
            }

            if !turn.truncated {
                info!(iterations, "Request complete");
                return Ok(AssistantOutcome { final_message: assistant_message, stop_reason: StopReason::Complete });
            }

            consecutive_empty += 1;
            if consecutive_empty >= 2 {
                warn!(iterations, "Two consecutive empty turns, giving up");
                let notice = Message::user(EMPTY_RESPONSE_NOTICE);
                self.conversation.push(notice);
                return Err(CoreError::EmptyResponse);
            }

            debug!(iterations, "Empty turn, nudging the model and retrying");
            callbacks.notice(EMPTY_RESPONSE_NOTICE);
            self.conversation.push(Message::user(EMPTY_RESPONSE_NOTICE));

            if iterations >= self.config.max_iterations {
                return Err(self.finish_with_max_iterations());
            }
        }
    }

    fn classify_stream_error(&self, error: anyhow::Error, model: &ModelId) -> CoreError {
        let message = error.to_string();
        if looks_like_context_overflow(&message) {
            let estimated = self.conversation.token_count_approx();
            CoreError::ContextOverflow { estimated, limit: self.config.max_context_window, model: model.as_str().to_string() }
        } else {
            CoreError::ModelStreamError(error)
        }
    }

    fn finish_aborted(&mut self) -> AssistantOutcome {
        warn!(conversation_id = %self.conversation.id, "Request aborted");
        let marked = mark_interrupted(self.conversation.history.last().cloned());
        let final_message = marked.unwrap_or_else(|| Message::assistant_text(INTERRUPTED_MARKER));
        if let Some(last) = self.conversation.history.last_mut() {
            *last = final_message.clone();
        } else {
            self.conversation.push(final_message.clone());
        }
        AssistantOutcome { final_message, stop_reason: StopReason::Aborted }
    }

    fn finish_with_timeout(&mut self) -> CoreError {
        warn!(conversation_id = %self.conversation.id, "Request exceeded global timeout");
        CoreError::GlobalTimeout
    }

    fn finish_with_max_iterations(&mut self) -> CoreError {
        warn!(max_iterations = self.config.max_iterations, "Request exceeded max_iterations");
        CoreError::MaxIterations(self.config.max_iterations)
    }
}

fn mark_interrupted(message: Option<Message>) -> Option<Message> {
    message.map(|mut message| {
        if message.role == tunacode_domain::Role::Assistant {
            let text = message.text_content();
            let marked = if text.is_empty() { INTERRUPTED_MARKER.to_string() } else { format!("{text} {INTERRUPTED_MARKER}") };
            message.parts.push(tunacode_domain::Part::Text { content: marked });
        }
        message
    })
}

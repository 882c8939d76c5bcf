use thiserror::Error;

/// The fatal error taxonomy for the orchestration core. Tool failures and
/// timeouts never surface through this type — they are folded into a
/// `ToolResult` and shown to the model instead; this enum only covers the
/// outcomes that end a request.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("user message must not be empty")]
    InvalidInput,

    #[error("request aborted by user")]
    UserAbort,

    #[error("request exceeded global timeout")]
    GlobalTimeout,

    #[error("request exceeded max_iterations ({0})")]
    MaxIterations(u32),

    #[error("context overflow: estimated {estimated} tokens against a limit of {limit} for model {model}")]
    ContextOverflow { estimated: usize, limit: usize, model: String },

    #[error("model produced no text and no tool calls across two consecutive turns")]
    EmptyResponse,

    #[error("model stream error: {0}")]
    ModelStreamError(#[source] anyhow::Error),

    #[error("sanitizer received a history it cannot normalize: {0}")]
    SanitizerUnsupported(String),
}

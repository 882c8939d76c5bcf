use serde::{Deserialize, Serialize};

/// The terminal state of a single `process_request` call, as the CLI layer
/// would match on it. Exit codes themselves are the CLI's concern; this
/// only names the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Exit {
    Complete,
    Aborted,
    ContextOverflow { estimated_tokens: usize, max_tokens: usize, model: String },
    Fatal { reason: String },
}

impl Exit {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Exit::ContextOverflow { .. } | Exit::Fatal { .. })
    }
}

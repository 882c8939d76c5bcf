use derive_setters::Setters;

/// Tunables the embedding application supplies at session start. The config
/// wizard that produces these values lives outside this crate; only the
/// shape of what it produces is modeled here.
#[derive(Debug, Clone, Setters)]
#[setters(strip_option, into)]
pub struct OrchestratorConfig {
    pub max_iterations: u32,
    /// Wall-clock cutoff for the whole request.
    pub global_request_timeout_secs: Option<u64>,
    /// Per-tool default.
    pub tool_timeout_secs: u64,
    /// Default width of the read-phase worker pool.
    pub worker_pool_width: usize,
    /// Tokens reserved for the reply itself.
    pub reserve_tokens: usize,
    /// Tokens the recent-history suffix is allowed to keep before a
    /// compaction pass is triggered.
    pub keep_recent_tokens: usize,
    /// Lower `keep_recent_tokens` used on the forced-compaction retry path.
    pub forced_keep_recent_tokens: usize,
    pub max_context_window: usize,
    /// Secondary request budget below `max_iterations` — a single
    /// iteration can correspond to more than one retried request.
    pub max_requests_per_turn: Option<u32>,
    /// Consecutive failures of the same tool within one turn before the
    /// orchestrator is forced to yield.
    pub max_consecutive_tool_failures: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            global_request_timeout_secs: None,
            tool_timeout_secs: 30,
            worker_pool_width: 8,
            reserve_tokens: 16_384,
            keep_recent_tokens: 20_000,
            forced_keep_recent_tokens: 8_000,
            max_context_window: 128_000,
            max_requests_per_turn: None,
            max_consecutive_tool_failures: 3,
        }
    }
}

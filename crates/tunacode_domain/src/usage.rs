use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Per-call usage, as reported on a `message_end`/`turn_end` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub cost: Option<f64>,
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
        self.cached_tokens += rhs.cached_tokens;
        self.cost = match (self.cost, rhs.cost) {
            (Some(a), Some(b)) => Some(a + b),
            (a, None) => a,
            (None, b) => b,
        };
    }
}

/// Session-wide running total. Compaction summarization calls contribute to
/// this the same way ordinary assistant turns do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total: Usage,
    pub call_count: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, usage: Usage) {
        self.total += usage;
        self.call_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn metrics_accumulate_session_totals() {
        let mut metrics = Metrics::new();
        metrics.record(Usage { prompt_tokens: 10, completion_tokens: 5, cached_tokens: 0, cost: Some(0.01) });
        metrics.record(Usage { prompt_tokens: 20, completion_tokens: 8, cached_tokens: 2, cost: Some(0.02) });

        assert_eq!(metrics.total.prompt_tokens, 30);
        assert_eq!(metrics.total.completion_tokens, 13);
        assert_eq!(metrics.total.cached_tokens, 2);
        assert_eq!(metrics.call_count, 2);
        assert!((metrics.total.cost.unwrap() - 0.03).abs() < 1e-9);
    }
}

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use crate::model_client::looks_like_context_overflow;

/// Backoff knobs for transient model-stream retries. Context-overflow and
/// empty-response handling live in the orchestrator's own retry-once
/// policies and never go through this helper.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub min_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_retry_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { min_delay_ms: 200, backoff_factor: 2.0, max_retry_attempts: 2 }
    }
}

/// Retries `operation` under an exponential backoff strategy, but only for
/// errors [`is_transient`] recognizes — context overflow, malformed history,
/// and tool failures are never retried here.
pub async fn retry_transient<F, Fut, T>(config: &RetryConfig, operation: F) -> anyhow::Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let strategy = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_delay_ms))
        .with_factor(config.backoff_factor as f32)
        .with_max_times(config.max_retry_attempts)
        .with_jitter();

    operation
        .retry(&strategy)
        .when(is_transient)
        .notify(|error: &anyhow::Error, duration: Duration| {
            warn!(error = %error, backoff_secs = duration.as_secs_f64(), "Transient model stream error, retrying...");
        })
        .await
}

/// A stream error is worth retrying when it looks like a network blip or a
/// provider-side rate limit rather than a context-overflow or a caller bug.
/// Context overflow has its own force-compact-and-replay path in the
/// orchestrator and must never be retried here, or the two policies would
/// race each other.
fn is_transient(error: &anyhow::Error) -> bool {
    let message = error.to_string().to_lowercase();
    if looks_like_context_overflow(&message) {
        return false;
    }
    ["timeout", "connection reset", "connection closed", "rate limit", "503", "502", "overloaded"]
        .iter()
        .any(|marker| message.contains(marker))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn retries_a_transient_error_until_it_succeeds() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig { min_delay_ms: 1, backoff_factor: 1.0, max_retry_attempts: 3 };

        let result = retry_transient(&config, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    anyhow::bail!("connection reset by peer")
                } else {
                    Ok::<_, anyhow::Error>(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_a_context_overflow_error() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig { min_delay_ms: 1, backoff_factor: 1.0, max_retry_attempts: 3 };

        let result: anyhow::Result<()> = retry_transient(&config, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { anyhow::bail!("context_length_exceeded: too many tokens") }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}

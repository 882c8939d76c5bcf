pub mod normalize;
pub mod registry;
pub mod text_fallback;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use tunacode_domain::tool_call::ToolCallFull;
use tunacode_domain::tool_name::ToolName;
use tunacode_domain::{Message, ToolResult, ToolSpec};

use crate::callbacks::{CallbackSet, ToolLifecycleEvent, ToolResultNotice};
use registry::{ToolCallRegistry, ToolErrorTracker};

/// Implemented by the embedding application's tool collection. The
/// dispatcher asks it for a tool's classification before deciding where the
/// call lands (read phase vs. write phase) and then for the actual
/// execution; it never interprets the returned bytes beyond storing them.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    fn tool_spec(&self, name: &ToolName) -> Option<ToolSpec>;

    async fn invoke(&self, name: &ToolName, args: serde_json::Value, cancel: CancellationToken) -> anyhow::Result<String>;
}

/// Why the dispatcher had to stop handing work to the model this turn
/// without exhausting every emitted call.
#[derive(Debug, Clone, PartialEq)]
pub enum InterruptionReason {
    ToolFailureLimitReached { tool_name: ToolName, limit: u32 },
}

pub struct DispatchOutcome {
    pub tool_returns: Vec<Message>,
    pub interruption: Option<InterruptionReason>,
}

pub struct ToolDispatcher {
    worker_pool_width: usize,
    tool_timeout: Duration,
    max_consecutive_failures: u32,
}

impl ToolDispatcher {
    pub fn new(worker_pool_width: usize, tool_timeout: Duration, max_consecutive_failures: u32) -> Self {
        Self { worker_pool_width, tool_timeout, max_consecutive_failures }
    }

    /// Extracts tool calls from `message` (structured parts first, then the
    /// free-text fallback parser if none were structured) and splices any
    /// fallback calls back into the message as if they had been structured
    /// all along.
    pub fn extract_calls(&self, message: &mut Message) -> Vec<ToolCallFull> {
        let structured: Vec<ToolCallFull> = message.tool_calls().collect();
        if !structured.is_empty() {
            return structured;
        }

        let fallback = text_fallback::parse(&message.text_content());
        for call in &fallback {
            message.parts.push(tunacode_domain::Part::ToolCall {
                tool_call_id: call.tool_call_id.clone(),
                tool_name: call.tool_name.clone(),
                args: call.args.clone(),
            });
        }
        fallback
    }

    /// Runs one turn's calls to completion: normalize, partition read/write,
    /// run the read phase concurrently on a bounded pool, run the write
    /// phase serially, and return `TOOL_RETURN` messages in
    /// `(read-phase, write-phase)` emission order.
    pub async fn dispatch(
        &self,
        calls: Vec<ToolCallFull>,
        invoker: &(dyn ToolInvoker),
        registry: &mut ToolCallRegistry,
        error_tracker: &mut ToolErrorTracker,
        cancel: CancellationToken,
        callbacks: &CallbackSet,
    ) -> DispatchOutcome {
        let mut reads = Vec::new();
        let mut writes = Vec::new();

        for call in calls {
            match normalize::normalize(call.tool_name.as_str()) {
                Err(reason) => {
                    writes.push(PlacedCall { call, classification: Classification::Malformed(reason) });
                }
                Ok(normalized_name) => {
                    let is_mutating = invoker.tool_spec(&normalized_name).map(|spec| spec.is_mutating).unwrap_or(true);
                    let placed = PlacedCall { call, classification: Classification::Normal };
                    if is_mutating {
                        writes.push(placed);
                    } else {
                        reads.push(placed);
                    }
                }
            }
        }

        debug!(read_count = reads.len(), write_count = writes.len(), "Dispatching turn's tool calls");

        let mut tool_returns = Vec::with_capacity(reads.len() + writes.len());
        let mut interruption = None;

        let read_results = self.run_read_phase(reads, invoker, registry, &cancel, callbacks).await;
        for (call, result) in read_results {
            self.settle(&call, &result, error_tracker);
            tool_returns.push(to_tool_return(&call, &result));
        }

        for placed in writes {
            if interruption.is_some() {
                let result = ToolResult::cancelled(placed.call.tool_call_id.clone(), placed.call.tool_name.as_str());
                let _ = registry.register(placed.call.tool_call_id.clone(), placed.call.tool_name.clone(), placed.call.args.clone());
                if let Some(record) = registry.get_mut(&placed.call.tool_call_id) {
                    record.start();
                    apply_result(record, &result);
                }
                tool_returns.push(to_tool_return(&placed.call, &result));
                continue;
            }
            let result = self.run_one(&placed, invoker, registry, &cancel, callbacks).await;
            self.settle(&placed.call, &result, error_tracker);
            if result.is_error {
                if error_tracker.exceeded(&placed.call.tool_name, self.max_consecutive_failures) {
                    error!(tool_name = %placed.call.tool_name, limit = self.max_consecutive_failures, "Tool exceeded consecutive failure limit");
                    interruption = Some(InterruptionReason::ToolFailureLimitReached {
                        tool_name: placed.call.tool_name.clone(),
                        limit: self.max_consecutive_failures,
                    });
                }
            }
            tool_returns.push(to_tool_return(&placed.call, &result));
        }

        DispatchOutcome { tool_returns, interruption }
    }

    async fn run_read_phase(
        &self,
        reads: Vec<PlacedCall>,
        invoker: &(dyn ToolInvoker),
        registry: &mut ToolCallRegistry,
        cancel: &CancellationToken,
        callbacks: &CallbackSet,
    ) -> Vec<(ToolCallFull, ToolResult)> {
        if reads.is_empty() {
            return Vec::new();
        }

        for placed in &reads {
            let _ = registry.register(placed.call.tool_call_id.clone(), placed.call.tool_name.clone(), placed.call.args.clone());
            if let Some(record) = registry.get_mut(&placed.call.tool_call_id) {
                record.start();
            }
            callbacks.fire(ToolLifecycleEvent::Start { name: placed.call.tool_name.as_str() });
        }

        let semaphore = Arc::new(Semaphore::new(self.worker_pool_width));
        let futures = reads.into_iter().map(|placed| {
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                let result = execute_one(&placed, invoker, &cancel, self.tool_timeout).await;
                (placed.call, result)
            }
        });

        let results = futures::future::join_all(futures).await;
        for (call, result) in &results {
            if let Some(record) = registry.get_mut(&call.tool_call_id) {
                apply_result(record, result);
            }
            callbacks.fire(ToolLifecycleEvent::Result(ToolResultNotice {
                name: call.tool_name.as_str(),
                status: if result.is_error { tunacode_domain::tool_status::ToolCallStatus::Failed } else { tunacode_domain::tool_status::ToolCallStatus::Completed },
                args: &call.args,
                result: &result.content,
                duration_ms: 0,
            }));
        }
        results
    }

    async fn run_one(
        &self,
        placed: &PlacedCall,
        invoker: &(dyn ToolInvoker),
        registry: &mut ToolCallRegistry,
        cancel: &CancellationToken,
        callbacks: &CallbackSet,
    ) -> ToolResult {
        let _ = registry.register(placed.call.tool_call_id.clone(), placed.call.tool_name.clone(), placed.call.args.clone());
        if let Some(record) = registry.get_mut(&placed.call.tool_call_id) {
            record.start();
        }
        callbacks.fire(ToolLifecycleEvent::Start { name: placed.call.tool_name.as_str() });
        let started = Instant::now();
        let result = execute_one(placed, invoker, cancel, self.tool_timeout).await;
        if let Some(record) = registry.get_mut(&placed.call.tool_call_id) {
            apply_result(record, &result);
        }
        callbacks.fire(ToolLifecycleEvent::Result(ToolResultNotice {
            name: placed.call.tool_name.as_str(),
            status: if result.is_error { tunacode_domain::tool_status::ToolCallStatus::Failed } else { tunacode_domain::tool_status::ToolCallStatus::Completed },
            args: &placed.call.args,
            result: &result.content,
            duration_ms: started.elapsed().as_millis() as u64,
        }));
        result
    }

    fn settle(&self, call: &ToolCallFull, result: &ToolResult, error_tracker: &mut ToolErrorTracker) {
        if result.is_error {
            error_tracker.record_failure(&call.tool_name);
        } else {
            error_tracker.record_success(&call.tool_name);
        }
    }
}

/// Drives a registered record from `Running` to its terminal state,
/// matching whichever branch `result` actually took.
fn apply_result(record: &mut tunacode_domain::tool_status::ToolCallRecord, result: &ToolResult) {
    if result.is_cancelled {
        record.cancel(result.content.clone());
    } else if result.is_error {
        record.fail(result.content.clone());
    } else {
        record.complete(result.content.clone());
    }
}

enum Classification {
    Normal,
    Malformed(String),
}

struct PlacedCall {
    call: ToolCallFull,
    classification: Classification,
}

async fn execute_one(
    placed: &PlacedCall,
    invoker: &(dyn ToolInvoker),
    cancel: &CancellationToken,
    timeout: Duration,
) -> ToolResult {
    if let Classification::Malformed(reason) = &placed.classification {
        return ToolResult::failure(placed.call.tool_call_id.clone(), "MalformedToolCall", reason);
    }

    if cancel.is_cancelled() {
        return ToolResult::cancelled(placed.call.tool_call_id.clone(), placed.call.tool_name.as_str());
    }

    let invocation = invoker.invoke(&placed.call.tool_name, placed.call.args.clone(), cancel.clone());
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(tool_name = %placed.call.tool_name, "Tool invocation cancelled");
            ToolResult::cancelled(placed.call.tool_call_id.clone(), placed.call.tool_name.as_str())
        }
        outcome = tokio::time::timeout(timeout, invocation) => match outcome {
            Ok(Ok(content)) => ToolResult::success(placed.call.tool_call_id.clone(), content),
            Ok(Err(error)) => {
                error!(tool_name = %placed.call.tool_name, error = ?error, "Tool execution failed");
                ToolResult::failure(placed.call.tool_call_id.clone(), "ToolExecutionError", error.to_string())
            }
            Err(_elapsed) => {
                error!(tool_name = %placed.call.tool_name, timeout_secs = timeout.as_secs(), "Tool execution timed out");
                ToolResult::failure(placed.call.tool_call_id.clone(), "ToolTimeout", format!("exceeded {}s", timeout.as_secs()))
            }
        },
    }
}

fn to_tool_return(call: &ToolCallFull, result: &ToolResult) -> Message {
    Message::tool_return(call.tool_call_id.clone(), result.content.clone())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    struct StubInvoker {
        mutating: bool,
        fail: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ToolInvoker for StubInvoker {
        fn tool_spec(&self, name: &ToolName) -> Option<ToolSpec> {
            Some(ToolSpec::new(name.as_str(), "stub", serde_json::json!({}), self.mutating))
        }

        async fn invoke(&self, _name: &ToolName, _args: serde_json::Value, _cancel: CancellationToken) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom")
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn call(id: &str, name: &str) -> ToolCallFull {
        ToolCallFull::new(
            tunacode_domain::tool_call::ToolCallId::new(id),
            ToolName::new(name),
            serde_json::json!({}),
        )
    }

    #[tokio::test]
    async fn read_only_calls_all_execute_and_return_success() {
        let dispatcher = ToolDispatcher::new(8, Duration::from_secs(30), 3);
        let invoker = StubInvoker { mutating: false, fail: false, calls: AtomicU32::new(0) };
        let mut registry = ToolCallRegistry::new();
        let mut tracker = ToolErrorTracker::new();
        let callbacks = CallbackSet::default();

        let outcome = dispatcher
            .dispatch(
                vec![call("tc_1", "grep"), call("tc_2", "read_file")],
                &invoker,
                &mut registry,
                &mut tracker,
                CancellationToken::new(),
                &callbacks,
            )
            .await;

        assert_eq!(outcome.tool_returns.len(), 2);
        assert!(outcome.interruption.is_none());
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 2);
        assert!(registry.is_drained());
        assert_eq!(
            registry.get(&tunacode_domain::tool_call::ToolCallId::new("tc_1")).unwrap().status,
            tunacode_domain::tool_status::ToolCallStatus::Completed
        );
    }

    #[tokio::test]
    async fn malformed_tool_name_never_executes() {
        let dispatcher = ToolDispatcher::new(8, Duration::from_secs(30), 3);
        let invoker = StubInvoker { mutating: true, fail: false, calls: AtomicU32::new(0) };
        let mut registry = ToolCallRegistry::new();
        let mut tracker = ToolErrorTracker::new();
        let callbacks = CallbackSet::default();

        let outcome = dispatcher
            .dispatch(vec![call("tc_1", "<script>")], &invoker, &mut registry, &mut tracker, CancellationToken::new(), &callbacks)
            .await;

        assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.tool_returns.len(), 1);
        assert_eq!(
            registry.get(&tunacode_domain::tool_call::ToolCallId::new("tc_1")).unwrap().status,
            tunacode_domain::tool_status::ToolCallStatus::Failed
        );
    }

    #[tokio::test]
    async fn repeated_failures_trip_the_interruption_and_skip_remaining_writes() {
        let dispatcher = ToolDispatcher::new(8, Duration::from_secs(30), 2);
        let invoker = StubInvoker { mutating: true, fail: true, calls: AtomicU32::new(0) };
        let mut registry = ToolCallRegistry::new();
        let mut tracker = ToolErrorTracker::new();
        let callbacks = CallbackSet::default();

        let outcome = dispatcher
            .dispatch(
                vec![call("tc_1", "write_file"), call("tc_2", "write_file"), call("tc_3", "write_file")],
                &invoker,
                &mut registry,
                &mut tracker,
                CancellationToken::new(),
                &callbacks,
            )
            .await;

        assert!(outcome.interruption.is_some());
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.tool_returns.len(), 3);
        // tc_3 never actually ran (the limit tripped on tc_2), but it still gets
        // registered and cancelled so the registry fully drains.
        assert!(registry.is_drained());
        assert_eq!(
            registry.get(&tunacode_domain::tool_call::ToolCallId::new("tc_3")).unwrap().status,
            tunacode_domain::tool_status::ToolCallStatus::Cancelled
        );
    }
}

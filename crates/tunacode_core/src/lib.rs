//! Agent orchestration core: the request/response driver loop, the
//! provider-agnostic event stream interpreter, the tool dispatcher, and the
//! context compaction controller. Depends on [`tunacode_domain`] for the
//! canonical message model and never touches a terminal, a file system, or a
//! network socket directly — those live behind the [`model_client::ModelClient`]
//! and [`dispatch::ToolInvoker`] trait boundaries.

pub mod callbacks;
pub mod compact;
pub mod dispatch;
pub mod model_client;
pub mod orchestrator;
pub mod retry;
pub mod stream;

pub use callbacks::{CallbackSet, ToolLifecycleEvent, ToolResultNotice};
pub use compact::{CompactionOutcome, CompactionSkipReason, Compactor, Summarizer};
pub use dispatch::{DispatchOutcome, InterruptionReason, ToolDispatcher, ToolInvoker};
pub use model_client::{looks_like_context_overflow, ModelClient};
pub use orchestrator::{AssistantOutcome, Orchestrator, StopReason};
pub use retry::{retry_transient, RetryConfig};
pub use stream::{Delta, ModelEvent, StreamInterpreter, TruncationPolicy, TurnOutcome};

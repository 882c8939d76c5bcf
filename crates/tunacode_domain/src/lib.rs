//! Canonical data model for the agent orchestration core: conversation
//! messages, usage accounting, compaction bookkeeping, and the sanitizer
//! that restores invariants between requests. No I/O, no async runtime.

pub mod compaction;
pub mod config;
pub mod conversation;
pub mod error;
pub mod exit;
pub mod message;
pub mod model_id;
pub mod sanitize;
pub mod tool_call;
pub mod tool_definition;
pub mod tool_name;
pub mod tool_result;
pub mod tool_status;
pub mod usage;
pub mod wire;

pub use compaction::CompactionRecord;
pub use config::OrchestratorConfig;
pub use conversation::{Conversation, ConversationId, MetaData};
pub use error::CoreError;
pub use exit::Exit;
pub use message::{Message, Part, Role};
pub use model_id::ModelId;
pub use tool_call::{ToolCallFull, ToolCallId};
pub use tool_definition::ToolSpec;
pub use tool_name::ToolName;
pub use tool_result::ToolResult;
pub use tool_status::{ToolCallRecord, ToolCallStatus};
pub use usage::{Metrics, Usage};

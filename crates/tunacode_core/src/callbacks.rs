use tunacode_domain::tool_status::ToolCallStatus;

/// UI-facing hooks the orchestrator fires during a request. All are
/// optional and default to no-op; implementations must not block the
/// orchestrator — buffer internally if slow work is needed.
#[derive(Default)]
pub struct CallbackSet {
    pub on_tool_start: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub on_tool_result: Option<Box<dyn Fn(ToolResultNotice) + Send + Sync>>,
    pub on_stream_delta: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub on_notice: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub on_compaction_status: Option<Box<dyn Fn(bool) + Send + Sync>>,
}

pub struct ToolResultNotice<'a> {
    pub name: &'a str,
    pub status: ToolCallStatus,
    pub args: &'a serde_json::Value,
    pub result: &'a str,
    pub duration_ms: u64,
}

/// Internal lifecycle event the dispatcher publishes; the only thing that
/// actually fans out to the individual callback fields above. Keeps the
/// dispatcher's call sites to a single `fire` instead of five scattered
/// `if let Some(cb) = ...` blocks.
pub enum ToolLifecycleEvent<'a> {
    Start { name: &'a str },
    Result(ToolResultNotice<'a>),
}

impl CallbackSet {
    pub fn fire(&self, event: ToolLifecycleEvent<'_>) {
        match event {
            ToolLifecycleEvent::Start { name } => {
                if let Some(cb) = &self.on_tool_start {
                    cb(name);
                }
            }
            ToolLifecycleEvent::Result(notice) => {
                if let Some(cb) = &self.on_tool_result {
                    cb(notice);
                }
            }
        }
    }

    pub fn delta(&self, text: &str) {
        if let Some(cb) = &self.on_stream_delta {
            cb(text);
        }
    }

    pub fn notice(&self, text: &str) {
        if let Some(cb) = &self.on_notice {
            cb(text);
        }
    }

    pub fn compaction_status(&self, active: bool) {
        if let Some(cb) = &self.on_compaction_status {
            cb(active);
        }
    }
}

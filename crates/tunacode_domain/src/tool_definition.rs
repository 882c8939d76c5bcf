use serde::{Deserialize, Serialize};

use crate::tool_name::ToolName;

/// A tool as the dispatcher's static registry knows it. The `execute` side
/// of the contract is a trait (`tunacode_core::dispatch::Tool`) rather than
/// a field here, since execution needs the async runtime and a cancellation
/// token this crate doesn't depend on.
///
/// `parameters_schema` is kept as a plain `serde_json::Value` rather than a
/// `schemars`-typed `RootSchema`: this core never validates tool arguments
/// itself, so a structured schema type would buy nothing beyond what the
/// embedding application's own tool crate already needs to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: ToolName,
    pub description: String,
    pub parameters_schema: serde_json::Value,
    pub is_mutating: bool,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<ToolName>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
        is_mutating: bool,
    ) -> Self {
        Self { name: name.into(), description: description.into(), parameters_schema, is_mutating }
    }
}

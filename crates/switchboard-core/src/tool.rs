//! Tool definitions and call request/response types.

use serde::{Deserialize, Serialize};

/// Separator between the server id and the tool name in a qualified name.
pub const QUALIFIER_SEPARATOR: char = ':';

/// Build the qualified name `"{server_id}:{tool_name}"`.
pub fn qualified_name(server_id: &str, tool_name: &str) -> String {
    format!("{server_id}{QUALIFIER_SEPARATOR}{tool_name}")
}

/// Split a qualified name into `(server_id, tool_name)`, if qualified.
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    name.split_once(QUALIFIER_SEPARATOR)
}

/// A tool as declared by a backend service at discovery time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Bare tool name, unique within its service.
    pub name: String,
    /// Human-readable description of what the tool does.
    #[serde(default)]
    pub description: String,
    /// JSON-Schema-style parameter declaration, if the service provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
    /// Example argument sets, if the service provides any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<serde_json::Value>,
}

impl ToolDefinition {
    /// Create a definition with just a name and description.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: None,
            examples: Vec::new(),
        }
    }

    /// Attach a parameter schema.
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

/// A request to execute one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Tool name, qualified (`server:tool`) or bare.
    pub tool_name: String,
    /// Argument map passed to the tool.
    pub arguments: serde_json::Map<String, serde_json::Value>,
    /// Caller-supplied request id, used for abort tracking.
    pub request_id: String,
    /// Per-request timeout override, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ToolCallRequest {
    /// Create a request with the given id and no timeout override.
    pub fn new(
        tool_name: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            request_id: request_id.into(),
            timeout_ms: None,
        }
    }

    /// Set a per-request timeout, in milliseconds.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// The structured outcome of a successful tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    /// The fully qualified name the request resolved to.
    pub qualified_name: String,
    /// Result payload as returned by the service.
    pub result: serde_json::Value,
    /// Echo of the request id.
    pub request_id: String,
    /// Wall-clock execution time.
    pub execution_time_ms: u64,
}

//! Error taxonomy for the tool coordination layer.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::validation::ValidationFailure;

/// Errors produced by the coordinator and the conversation loop.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Bad or missing service configuration. Fatal to that service only.
    #[error("Configuration error for server '{server_id}': {reason}")]
    Configuration { server_id: String, reason: String },

    /// A service connection could not be established or was lost.
    #[error("Connection error for server '{server_id}': {reason}")]
    Connection { server_id: String, reason: String },

    /// The tool name did not resolve to any registered tool.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Call arguments did not match the tool's declared schema.
    #[error("Invalid arguments for tool '{tool}': {}", format_failures(.failures))]
    ToolValidation {
        tool: String,
        failures: Vec<ValidationFailure>,
    },

    /// The tool's circuit breaker is open; no call was attempted.
    #[error("Circuit open for tool '{tool}' after {failure_count} failures")]
    CircuitOpen {
        tool: String,
        failure_count: u32,
        last_failure: Option<DateTime<Utc>>,
    },

    /// The underlying service call failed (including timeout/cancellation).
    #[error("Tool '{tool}' on server '{server_id}' failed (request {request_id}): {reason}")]
    ToolExecution {
        tool: String,
        server_id: String,
        request_id: String,
        arguments: serde_json::Map<String, serde_json::Value>,
        reason: String,
    },

    /// The generation interface failed.
    #[error("Generation failed on attempt {attempt}: {reason}")]
    Generation { attempt: u32, reason: String },

    /// The request was cancelled before completion.
    #[error("Request {request_id} cancelled")]
    Cancelled { request_id: String },

    /// Payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn format_failures(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl CoordinatorError {
    /// Whether retrying the same call could plausibly succeed.
    ///
    /// NotFound, validation, and circuit-open are caller-input or protective
    /// policy failures and must not be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Connection { .. }
                | CoordinatorError::ToolExecution { .. }
                | CoordinatorError::Generation { .. }
        )
    }

    /// Stable code for logging and reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoordinatorError::Configuration { .. } => "CONFIGURATION_ERROR",
            CoordinatorError::Connection { .. } => "CONNECTION_ERROR",
            CoordinatorError::ToolNotFound(_) => "TOOL_NOT_FOUND",
            CoordinatorError::ToolValidation { .. } => "TOOL_VALIDATION_ERROR",
            CoordinatorError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            CoordinatorError::ToolExecution { .. } => "TOOL_EXECUTION_ERROR",
            CoordinatorError::Generation { .. } => "GENERATION_ERROR",
            CoordinatorError::Cancelled { .. } => "CANCELLED",
            CoordinatorError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

impl From<serde_json::Error> for CoordinatorError {
    fn from(err: serde_json::Error) -> Self {
        CoordinatorError::Serialization(err.to_string())
    }
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

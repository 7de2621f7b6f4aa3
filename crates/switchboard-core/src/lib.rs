//! # Switchboard Core
//!
//! Shared vocabulary for the Switchboard tool coordination layer: the chat
//! message model, tool definitions and call types, configuration, argument
//! validation, and the error taxonomy used across the workspace.

pub mod config;
pub mod error;
pub mod message;
pub mod tool;
pub mod validation;

pub use config::{CoordinatorConfig, OrchestratorConfig, ServerDescriptor, TransportKind};
pub use error::{CoordinatorError, CoordinatorResult};
pub use message::{AgentEvent, ChatMessage, StatusState};
pub use tool::{ToolCallRequest, ToolCallResponse, ToolDefinition, qualified_name, split_qualified};
pub use validation::{ValidationFailure, validate_arguments};

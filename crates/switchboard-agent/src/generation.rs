//! The generation interface: an opaque async producer of assistant parts.
//!
//! The orchestrator never reasons about models. It hands over the history,
//! the tool catalog, and the per-server guidance texts, and consumes a
//! stream of parts in return; each part is either plain text or a tool
//! invocation the orchestrator is expected to carry out.

use async_trait::async_trait;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use switchboard_core::error::CoordinatorResult;
use switchboard_core::message::ChatMessage;
use switchboard_coordinator::ToolCatalogEntry;

/// One element of a generated assistant response.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantPart {
    /// Plain assistant text.
    Text { content: String },
    /// A request to invoke a tool.
    ToolCall {
        tool_name: String,
        arguments: serde_json::Map<String, serde_json::Value>,
    },
}

impl AssistantPart {
    /// Create a text part.
    pub fn text(content: impl Into<String>) -> Self {
        AssistantPart::Text {
            content: content.into(),
        }
    }

    /// Create a tool-call part.
    pub fn tool_call(
        tool_name: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        AssistantPart::ToolCall {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Request-scoped context threaded through a generation call.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    /// Id of the top-level turn this generation belongs to.
    pub request_id: String,
    /// Cancels with the turn: implementations should stop producing parts.
    pub cancellation: CancellationToken,
}

/// Stream of assistant parts from one generation call.
pub type PartStream = Pin<Box<dyn Stream<Item = CoordinatorResult<AssistantPart>> + Send>>;

/// The swappable language-model seam.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Produce assistant parts for the given history and tool surface.
    async fn generate(
        &self,
        history: &[ChatMessage],
        catalog: &[ToolCatalogEntry],
        guidance: &HashMap<String, String>,
        ctx: &GenerationContext,
    ) -> CoordinatorResult<PartStream>;
}

//! Chat message model and the caller-visible event stream types.
//!
//! Messages are a tagged union over roles so each variant carries only the
//! fields valid for that role: a tool result never has user text, a user
//! message never has a tool payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in a session's conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    /// Input from the user.
    User {
        content: String,
        timestamp: DateTime<Utc>,
    },
    /// A response produced by the generation interface.
    Assistant {
        content: String,
        timestamp: DateTime<Utc>,
    },
    /// Internal bookkeeping: failures, pruning notices, depth-limit notices.
    System {
        content: String,
        timestamp: DateTime<Utc>,
    },
    /// The recorded result of a tool execution.
    Tool {
        tool_name: String,
        payload: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
}

impl ChatMessage {
    /// Create a user message stamped with the current time.
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant message stamped with the current time.
    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage::Assistant {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a system message stamped with the current time.
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a tool-result message stamped with the current time.
    pub fn tool(tool_name: impl Into<String>, payload: serde_json::Value) -> Self {
        ChatMessage::Tool {
            tool_name: tool_name.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Text content for the text-bearing roles, `None` for tool results.
    pub fn text_content(&self) -> Option<&str> {
        match self {
            ChatMessage::User { content, .. }
            | ChatMessage::Assistant { content, .. }
            | ChatMessage::System { content, .. } => Some(content),
            ChatMessage::Tool { .. } => None,
        }
    }

    /// Whether this is a system message.
    pub fn is_system(&self) -> bool {
        matches!(self, ChatMessage::System { .. })
    }
}

/// Processing phase carried by a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    /// A tool execution has started.
    Processing,
    /// A tool execution finished, successfully or not.
    Complete,
}

/// Events emitted to the caller over the course of one turn.
///
/// A turn always terminates with exactly one `End`, whatever path it took.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AgentEvent {
    /// Assistant text visible to the user.
    Text { content: String },
    /// Tool execution progress.
    Status {
        state: StatusState,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Terminal marker for the turn.
    End,
}

impl AgentEvent {
    /// Create a text event.
    pub fn text(content: impl Into<String>) -> Self {
        AgentEvent::Text {
            content: content.into(),
        }
    }

    /// Create a `processing` status event for a tool.
    pub fn processing(tool: impl Into<String>) -> Self {
        AgentEvent::Status {
            state: StatusState::Processing,
            tool: Some(tool.into()),
            result: None,
            error: None,
        }
    }

    /// Create a `complete` status event carrying a successful result.
    pub fn complete(tool: impl Into<String>, result: serde_json::Value) -> Self {
        AgentEvent::Status {
            state: StatusState::Complete,
            tool: Some(tool.into()),
            result: Some(result),
            error: None,
        }
    }

    /// Create a `complete` status event carrying an error.
    pub fn complete_with_error(tool: impl Into<String>, error: impl Into<String>) -> Self {
        AgentEvent::Status {
            state: StatusState::Complete,
            tool: Some(tool.into()),
            result: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_roles_round_trip() {
        let msg = ChatMessage::tool("fs:read_file", serde_json::json!({"ok": true}));
        let encoded = serde_json::to_value(&msg).unwrap();
        assert_eq!(encoded["role"], "tool");
        assert_eq!(encoded["tool_name"], "fs:read_file");

        let decoded: ChatMessage = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn text_content_by_role() {
        assert_eq!(ChatMessage::user("hi").text_content(), Some("hi"));
        assert_eq!(ChatMessage::assistant("yo").text_content(), Some("yo"));
        assert!(ChatMessage::tool("t", serde_json::json!(1)).text_content().is_none());
    }

    #[test]
    fn status_event_shape() {
        let event = AgentEvent::complete_with_error("fs:read_file", "boom");
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["type"], "status");
        assert_eq!(encoded["state"], "complete");
        assert_eq!(encoded["error"], "boom");
        assert!(encoded.get("result").is_none());
    }
}

//! Session history storage.
//!
//! The orchestrator mutates history through this seam so deployments can
//! back it with whatever store they like. The in-memory implementation
//! creates sessions on first touch.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use switchboard_core::message::ChatMessage;

/// Ordered per-session message history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The session's messages, oldest first. Unknown sessions are empty.
    async fn history(&self, session_id: &str) -> Vec<ChatMessage>;

    /// Append one message to the session.
    async fn append(&self, session_id: &str, message: ChatMessage);

    /// Replace the session's entire history (used by pruning).
    async fn replace(&self, session_id: &str, messages: Vec<ChatMessage>);
}

/// Simple in-process history, suitable for a single-host deployment.
#[derive(Default)]
pub struct InMemoryHistory {
    sessions: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl InMemoryHistory {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn append(&self, session_id: &str, message: ChatMessage) {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(message);
    }

    async fn replace(&self, session_id: &str, messages: Vec<ChatMessage>) {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), messages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_session_is_empty() {
        let store = InMemoryHistory::new();
        assert!(store.history("nope").await.is_empty());
    }

    #[tokio::test]
    async fn append_and_replace() {
        let store = InMemoryHistory::new();
        store.append("s", ChatMessage::user("one")).await;
        store.append("s", ChatMessage::assistant("two")).await;
        assert_eq!(store.history("s").await.len(), 2);

        store
            .replace("s", vec![ChatMessage::system("pruned")])
            .await;
        let history = store.history("s").await;
        assert_eq!(history.len(), 1);
        assert!(history[0].is_system());
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = InMemoryHistory::new();
        store.append("a", ChatMessage::user("hello")).await;
        assert!(store.history("b").await.is_empty());
    }
}

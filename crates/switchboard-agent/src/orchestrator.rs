//! The conversation orchestrator.
//!
//! One call to `handle_input` is one turn: initial generation, any number of
//! tool calls and follow-up generations nested up to the depth ceiling, and
//! a terminal `End` event. Every turn runs as its own task feeding an event
//! channel, so sessions and turns proceed concurrently; one cancellation
//! token covers the whole turn (generation, execution, and retry delays).

use dashmap::DashMap;
use futures::StreamExt;
use futures::future::BoxFuture;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use switchboard_core::config::OrchestratorConfig;
use switchboard_core::error::{CoordinatorError, CoordinatorResult};
use switchboard_core::message::{AgentEvent, ChatMessage};
use switchboard_coordinator::{ExecutionOptions, ToolCoordinator};

use crate::generation::{AssistantPart, GenerationContext, GenerationProvider};
use crate::history::HistoryStore;

/// Emitted when every generation attempt for a step has failed.
const GENERATION_APOLOGY: &str =
    "I'm sorry, I wasn't able to produce a response just now. Please try again.";

/// Emitted when a tool failed and the recovery generation failed too.
const TOOL_TROUBLE: &str = "I had trouble with that tool.";

/// The one in-flight top-level turn for a session.
struct ActiveRequest {
    request_id: String,
    token: CancellationToken,
}

/// Drives the per-turn loop between the generation interface and the tool
/// coordinator.
pub struct Orchestrator {
    coordinator: Arc<ToolCoordinator>,
    generator: Arc<dyn GenerationProvider>,
    history: Arc<dyn HistoryStore>,
    config: OrchestratorConfig,
    active_requests: DashMap<String, ActiveRequest>,
}

impl Orchestrator {
    /// Create an orchestrator over an initialized coordinator.
    pub fn new(
        coordinator: Arc<ToolCoordinator>,
        generator: Arc<dyn GenerationProvider>,
        history: Arc<dyn HistoryStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            coordinator,
            generator,
            history,
            config,
            active_requests: DashMap::new(),
        }
    }

    /// Handle one user input, producing the turn's event stream.
    ///
    /// The stream always terminates with exactly one `End`, and the
    /// session's active-request entry is cleaned up on every path.
    pub fn handle_input(
        self: Arc<Self>,
        session_id: &str,
        text: &str,
    ) -> Pin<Box<dyn futures::Stream<Item = AgentEvent> + Send>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let this = self;
        let session_id = session_id.to_string();
        let text = text.to_string();

        tokio::spawn(async move {
            let request_id = Uuid::new_v4().to_string();
            let token = CancellationToken::new();
            this.active_requests.insert(
                session_id.clone(),
                ActiveRequest {
                    request_id: request_id.clone(),
                    token: token.clone(),
                },
            );
            debug!(session_id = %session_id, request_id = %request_id, "Turn started");

            this.run_turn(&session_id, &request_id, &token, &text, &tx)
                .await;

            emit(&tx, AgentEvent::End);
            this.active_requests
                .remove_if(&session_id, |_, active| active.request_id == request_id);
            // Cancelling the turn token releases any delay timers or child
            // execution tokens still alive.
            token.cancel();
            debug!(session_id = %session_id, request_id = %request_id, "Turn finished");
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }

    /// The request id of the session's in-flight turn, if any.
    pub fn active_request_id(&self, session_id: &str) -> Option<String> {
        self.active_requests
            .get(session_id)
            .map(|active| active.request_id.clone())
    }

    /// Abort the session's in-flight turn and any tool execution under it.
    ///
    /// Returns `false` when the session has no active request or the id
    /// does not match it.
    pub fn abort_active_tool_execution(&self, session_id: &str, request_id: &str) -> bool {
        let removed = self
            .active_requests
            .remove_if(session_id, |_, active| active.request_id == request_id);
        match removed {
            Some((_, active)) => {
                active.token.cancel();
                info!(session_id = %session_id, request_id = %request_id, "Turn aborted");
                true
            }
            None => false,
        }
    }

    /// Prune a session's history down to the newest messages.
    ///
    /// Within the configured maximum the history is returned unchanged.
    /// Otherwise the newest `retain_newest_messages` entries survive behind
    /// one synthetic system message naming how many were removed; the stored
    /// history is replaced with the result.
    pub async fn prune_history(&self, session_id: &str) -> Vec<ChatMessage> {
        let history = self.history.history(session_id).await;
        if history.len() <= self.config.max_history_messages {
            return history;
        }

        let retain = self.config.retain_newest_messages.min(history.len());
        let removed = history.len() - retain;
        let mut pruned = Vec::with_capacity(retain + 1);
        pruned.push(ChatMessage::system(format!(
            "{removed} older messages were removed from this conversation."
        )));
        pruned.extend(history[history.len() - retain..].iter().cloned());

        info!(session_id = %session_id, removed, retained = retain, "Pruned history");
        self.history.replace(session_id, pruned.clone()).await;
        pruned
    }

    async fn run_turn(
        &self,
        session_id: &str,
        request_id: &str,
        token: &CancellationToken,
        text: &str,
        tx: &UnboundedSender<AgentEvent>,
    ) {
        self.history
            .append(session_id, ChatMessage::user(text))
            .await;
        self.prune_history(session_id).await;

        match self
            .generate_with_retry(session_id, request_id, token)
            .await
        {
            Ok(parts) => {
                self.process_parts(session_id, request_id, token, parts, 0, tx)
                    .await;
            }
            Err(err) => {
                self.history
                    .append(
                        session_id,
                        ChatMessage::system(format!(
                            "Generation failed after {} attempts: {err}",
                            self.config.max_generation_attempts
                        )),
                    )
                    .await;
                emit(tx, AgentEvent::text(GENERATION_APOLOGY));
            }
        }
    }

    /// Process one generation's parts at the given tool-call depth.
    fn process_parts<'a>(
        &'a self,
        session_id: &'a str,
        request_id: &'a str,
        token: &'a CancellationToken,
        parts: Vec<AssistantPart>,
        depth: u32,
        tx: &'a UnboundedSender<AgentEvent>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            for part in parts {
                if token.is_cancelled() {
                    return;
                }
                match part {
                    AssistantPart::Text { content } => {
                        self.history
                            .append(session_id, ChatMessage::assistant(content.clone()))
                            .await;
                        emit(tx, AgentEvent::text(content));
                    }
                    AssistantPart::ToolCall {
                        tool_name,
                        arguments,
                    } => {
                        self.handle_tool_call(
                            session_id, request_id, token, tool_name, arguments, depth, tx,
                        )
                        .await;
                    }
                }
            }
        })
    }

    /// Execute one tool call and run its follow-up generation.
    ///
    /// `depth` counts tool-call → follow-up → tool-call nesting within the
    /// turn; at the ceiling the call is not executed at all.
    async fn handle_tool_call(
        &self,
        session_id: &str,
        request_id: &str,
        token: &CancellationToken,
        tool_name: String,
        arguments: serde_json::Map<String, serde_json::Value>,
        depth: u32,
        tx: &UnboundedSender<AgentEvent>,
    ) {
        if depth >= self.config.max_tool_call_depth {
            let note = format!(
                "Maximum nested tool calls ({}) reached; not executing '{tool_name}'.",
                self.config.max_tool_call_depth
            );
            warn!(session_id = %session_id, tool = %tool_name, depth, "Tool-call depth ceiling hit");
            self.history
                .append(session_id, ChatMessage::system(note.clone()))
                .await;
            emit(tx, AgentEvent::text(note));
            return;
        }

        emit(tx, AgentEvent::processing(&tool_name));

        let execution_id = Uuid::new_v4().to_string();
        let request = switchboard_core::tool::ToolCallRequest::new(
            &tool_name,
            arguments,
            &execution_id,
        );
        let options = ExecutionOptions {
            timeout: None,
            cancellation: Some(token.clone()),
        };

        match self.coordinator.execute_tool(request, options).await {
            Ok(response) => {
                self.history
                    .append(
                        session_id,
                        ChatMessage::tool(&response.qualified_name, response.result.clone()),
                    )
                    .await;
                emit(tx, AgentEvent::complete(&tool_name, response.result));

                match self
                    .generate_with_retry(session_id, request_id, token)
                    .await
                {
                    Ok(parts) => {
                        self.process_parts(session_id, request_id, token, parts, depth + 1, tx)
                            .await;
                    }
                    Err(err) => {
                        self.history
                            .append(
                                session_id,
                                ChatMessage::system(format!(
                                    "Follow-up generation failed: {err}"
                                )),
                            )
                            .await;
                        emit(tx, AgentEvent::text(GENERATION_APOLOGY));
                    }
                }
            }
            Err(err) => {
                warn!(
                    session_id = %session_id,
                    tool = %tool_name,
                    error = %err,
                    "Tool execution failed"
                );
                emit(tx, AgentEvent::complete_with_error(&tool_name, err.to_string()));
                self.history
                    .append(
                        session_id,
                        ChatMessage::system(format!("Tool '{tool_name}' failed: {err}")),
                    )
                    .await;

                // One recovery generation; a failed recovery ends the chain.
                match self.generate_once(session_id, request_id, token, 1).await {
                    Ok(parts) => {
                        self.process_parts(session_id, request_id, token, parts, depth + 1, tx)
                            .await;
                    }
                    Err(recovery_err) => {
                        debug!(
                            session_id = %session_id,
                            error = %recovery_err,
                            "Recovery generation failed"
                        );
                        emit(tx, AgentEvent::text(TOOL_TROUBLE));
                    }
                }
            }
        }
    }

    /// Call the generation interface, retrying with a fixed cancellable
    /// delay between attempts.
    async fn generate_with_retry(
        &self,
        session_id: &str,
        request_id: &str,
        token: &CancellationToken,
    ) -> CoordinatorResult<Vec<AssistantPart>> {
        let mut last_error = None;
        for attempt in 1..=self.config.max_generation_attempts {
            if token.is_cancelled() {
                return Err(CoordinatorError::Cancelled {
                    request_id: request_id.to_string(),
                });
            }
            match self
                .generate_once(session_id, request_id, token, attempt)
                .await
            {
                Ok(parts) => return Ok(parts),
                Err(err) => {
                    warn!(
                        session_id = %session_id,
                        attempt,
                        error = %err,
                        "Generation attempt failed"
                    );
                    last_error = Some(err);
                    if attempt < self.config.max_generation_attempts {
                        tokio::select! {
                            _ = token.cancelled() => {
                                return Err(CoordinatorError::Cancelled {
                                    request_id: request_id.to_string(),
                                });
                            }
                            _ = tokio::time::sleep(self.config.retry_delay()) => {}
                        }
                    }
                }
            }
        }
        Err(last_error.unwrap_or(CoordinatorError::Generation {
            attempt: self.config.max_generation_attempts,
            reason: "no generation attempts were made".into(),
        }))
    }

    /// One generation call, its part stream collected in order.
    async fn generate_once(
        &self,
        session_id: &str,
        request_id: &str,
        token: &CancellationToken,
        attempt: u32,
    ) -> CoordinatorResult<Vec<AssistantPart>> {
        let history = self.history.history(session_id).await;
        let catalog = self.coordinator.get_available_tools();
        let guidance = self.coordinator.registry().guidance_map();
        let ctx = GenerationContext {
            request_id: request_id.to_string(),
            cancellation: token.clone(),
        };

        let mut stream = self
            .generator
            .generate(&history, &catalog, &guidance, &ctx)
            .await
            .map_err(|err| CoordinatorError::Generation {
                attempt,
                reason: err.to_string(),
            })?;

        let mut parts = Vec::new();
        while let Some(item) = stream.next().await {
            let part = item.map_err(|err| CoordinatorError::Generation {
                attempt,
                reason: err.to_string(),
            })?;
            parts.push(part);
        }
        Ok(parts)
    }
}

fn emit(tx: &UnboundedSender<AgentEvent>, event: AgentEvent) {
    // The caller dropping the stream is not an error worth surfacing.
    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistory;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use switchboard_core::config::{CoordinatorConfig, ServerDescriptor};
    use switchboard_coordinator::{ConnectionFactory, ServerConnection, ToolCatalogEntry};

    struct NoopFactory;

    #[async_trait]
    impl ConnectionFactory for NoopFactory {
        async fn connect(
            &self,
            descriptor: &ServerDescriptor,
        ) -> CoordinatorResult<Arc<dyn ServerConnection>> {
            Err(CoordinatorError::Connection {
                server_id: descriptor.id.clone(),
                reason: "no transports in unit tests".into(),
            })
        }
    }

    struct SilentGenerator;

    #[async_trait]
    impl GenerationProvider for SilentGenerator {
        async fn generate(
            &self,
            _history: &[ChatMessage],
            _catalog: &[ToolCatalogEntry],
            _guidance: &HashMap<String, String>,
            _ctx: &GenerationContext,
        ) -> CoordinatorResult<crate::generation::PartStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    fn orchestrator(config: OrchestratorConfig) -> Arc<Orchestrator> {
        let coordinator = Arc::new(ToolCoordinator::new(
            CoordinatorConfig::default(),
            Arc::new(NoopFactory),
        ));
        Arc::new(Orchestrator::new(
            coordinator,
            Arc::new(SilentGenerator),
            Arc::new(InMemoryHistory::new()),
            config,
        ))
    }

    #[tokio::test]
    async fn prune_keeps_short_histories_unchanged() {
        let orchestrator = orchestrator(OrchestratorConfig::default());
        for i in 0..5 {
            orchestrator
                .history
                .append("s", ChatMessage::user(format!("m{i}")))
                .await;
        }
        let pruned = orchestrator.prune_history("s").await;
        assert_eq!(pruned.len(), 5);
        assert!(!pruned[0].is_system());
    }

    #[tokio::test]
    async fn prune_retains_newest_and_reports_removed_count() {
        let config = OrchestratorConfig {
            max_history_messages: 10,
            retain_newest_messages: 5,
            ..OrchestratorConfig::default()
        };
        let orchestrator = orchestrator(config);
        for i in 0..20 {
            orchestrator
                .history
                .append("s", ChatMessage::user(format!("m{i}")))
                .await;
        }

        let pruned = orchestrator.prune_history("s").await;
        assert_eq!(pruned.len(), 6);
        assert!(pruned[0].is_system());
        assert!(pruned[0].text_content().unwrap().contains("15"));
        assert_eq!(pruned[1].text_content(), Some("m15"));
        assert_eq!(pruned[5].text_content(), Some("m19"));

        // The stored history was replaced too.
        assert_eq!(orchestrator.history.history("s").await.len(), 6);
    }

    #[tokio::test]
    async fn abort_without_active_request_returns_false() {
        let orchestrator = orchestrator(OrchestratorConfig::default());
        assert!(!orchestrator.abort_active_tool_execution("s", "whatever"));
        assert!(orchestrator.active_request_id("s").is_none());
    }
}

//! The tool coordinator: lifecycle plus the execution engine.
//!
//! Execution order for a call: resolve name, circuit check, argument
//! validation, then a timed and cancellable invoke through the owning
//! server's connection. Reliability and performance counters are updated on
//! every outcome, and the active-execution entry is removed on every exit
//! path, success or not.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use switchboard_core::config::CoordinatorConfig;
use switchboard_core::error::{CoordinatorError, CoordinatorResult};
use switchboard_core::tool::{ToolCallRequest, ToolCallResponse};
use switchboard_core::validation::validate_arguments;

use crate::connection::ConnectionManager;
use crate::provider::ConnectionFactory;
use crate::registry::{ToolCatalogEntry, ToolRegistry, ToolRegistryEntry};

/// Per-call execution options.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Caller-level timeout override.
    pub timeout: Option<Duration>,
    /// Parent cancellation token; cancelling it cancels this execution.
    pub cancellation: Option<CancellationToken>,
}

/// A call in flight: exists only between submission and completion.
struct ActiveExecution {
    token: CancellationToken,
}

/// Owns the connections, the registry, and the active-execution map.
///
/// Explicitly constructed and explicitly owned; `initialize`/`shutdown`
/// bracket its useful lifetime.
pub struct ToolCoordinator {
    config: CoordinatorConfig,
    factory: Arc<dyn ConnectionFactory>,
    connections: ConnectionManager,
    registry: ToolRegistry,
    active: DashMap<String, ActiveExecution>,
}

impl ToolCoordinator {
    /// Create a coordinator from validated configuration.
    pub fn new(config: CoordinatorConfig, factory: Arc<dyn ConnectionFactory>) -> Self {
        let registry = ToolRegistry::new(config.circuit_threshold, config.reset_window());
        Self {
            config,
            factory,
            connections: ConnectionManager::new(),
            registry,
            active: DashMap::new(),
        }
    }

    /// Connect every configured server and discover its tools.
    ///
    /// A failing server is logged and skipped; initialization succeeds with
    /// whatever subset came up.
    pub async fn initialize(&self) -> CoordinatorResult<()> {
        let connected = self
            .connections
            .connect_all(&self.config.servers, self.factory.as_ref())
            .await;

        for descriptor in &self.config.servers {
            if !connected.contains(&descriptor.id) {
                continue;
            }
            let Some(connection) = self.connections.get(&descriptor.id) else {
                continue;
            };
            if let Err(err) = self
                .registry
                .discover_server(&descriptor.id, connection, descriptor.timeout())
                .await
            {
                warn!(
                    server_id = %descriptor.id,
                    error = %err,
                    "Tool discovery failed for server"
                );
            }
        }

        info!(
            servers = connected.len(),
            tools = self.registry.len(),
            "Coordinator initialized"
        );
        Ok(())
    }

    /// Cancel in-flight executions, disconnect every server, clear the
    /// registry.
    pub async fn shutdown(&self) {
        let request_ids: Vec<String> = self.active.iter().map(|e| e.key().clone()).collect();
        for request_id in request_ids {
            if let Some((_, execution)) = self.active.remove(&request_id) {
                execution.token.cancel();
            }
        }
        self.connections.disconnect_all().await;
        self.registry.clear();
        info!("Coordinator shut down");
    }

    /// The discovery registry.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Catalog of every available tool.
    pub fn get_available_tools(&self) -> Vec<ToolCatalogEntry> {
        self.registry.catalog()
    }

    /// Resolve a tool name (qualified passthrough, bare-name suffix scan).
    pub fn resolve_tool_name(&self, name: &str) -> CoordinatorResult<String> {
        self.registry.resolve_tool_name(name)
    }

    /// Look up a registry entry by (qualified or bare) name.
    pub fn get_tool_registry_entry(
        &self,
        name: &str,
    ) -> CoordinatorResult<Arc<ToolRegistryEntry>> {
        let qualified = self.registry.resolve_tool_name(name)?;
        self.registry
            .get(&qualified)
            .ok_or(CoordinatorError::ToolNotFound(qualified))
    }

    /// Execute one validated, circuit-permitted tool call.
    pub async fn execute_tool(
        &self,
        request: ToolCallRequest,
        options: ExecutionOptions,
    ) -> CoordinatorResult<ToolCallResponse> {
        let qualified = self.registry.resolve_tool_name(&request.tool_name)?;
        let entry = self
            .registry
            .get(&qualified)
            .ok_or_else(|| CoordinatorError::ToolNotFound(qualified.clone()))?;

        if entry.health.is_circuit_open() {
            let reliability = entry.health.snapshot().reliability;
            return Err(CoordinatorError::CircuitOpen {
                tool: qualified,
                failure_count: reliability.failure_count,
                last_failure: reliability.last_failure_time,
            });
        }

        validate_arguments(&request.arguments, entry.definition.input_schema.as_ref()).map_err(
            |failures| CoordinatorError::ToolValidation {
                tool: qualified.clone(),
                failures,
            },
        )?;

        let timeout = self.effective_timeout(&request, &entry, &options);
        let token = match &options.cancellation {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        self.active.insert(
            request.request_id.clone(),
            ActiveExecution {
                token: token.clone(),
            },
        );

        debug!(
            tool = %qualified,
            request_id = %request.request_id,
            timeout_ms = timeout.as_millis() as u64,
            "Executing tool"
        );

        let started = Instant::now();
        let outcome = tokio::select! {
            _ = token.cancelled() => Err(CoordinatorError::Cancelled {
                request_id: request.request_id.clone(),
            }),
            invoked = tokio::time::timeout(
                timeout,
                entry
                    .connection
                    .invoke(&entry.definition.name, request.arguments.clone(), token.clone()),
            ) => match invoked {
                Ok(result) => result,
                Err(_) => {
                    // Timer fired: cancellation is the same path an abort takes.
                    token.cancel();
                    Err(CoordinatorError::Cancelled {
                        request_id: request.request_id.clone(),
                    })
                }
            },
        };
        let elapsed = started.elapsed();

        // Finally-equivalent: the in-flight entry goes away on every path.
        self.active.remove(&request.request_id);

        match outcome {
            Ok(result) => {
                entry.health.record_success(elapsed);
                Ok(ToolCallResponse {
                    qualified_name: qualified,
                    result,
                    request_id: request.request_id,
                    execution_time_ms: elapsed.as_millis() as u64,
                })
            }
            Err(cause) => {
                entry.health.record_failure(elapsed);
                Err(CoordinatorError::ToolExecution {
                    tool: qualified,
                    server_id: entry.server_id.clone(),
                    request_id: request.request_id,
                    arguments: request.arguments,
                    reason: cause.to_string(),
                })
            }
        }
    }

    /// Abort an in-flight execution. Returns `false` for unknown ids.
    pub fn abort_tool_execution(&self, request_id: &str) -> bool {
        match self.active.remove(request_id) {
            Some((_, execution)) => {
                execution.token.cancel();
                info!(request_id = %request_id, "Aborted tool execution");
                true
            }
            None => false,
        }
    }

    /// Number of executions currently in flight.
    pub fn active_execution_count(&self) -> usize {
        self.active.len()
    }

    /// `max(request, tool, options, default)` over whichever are present.
    fn effective_timeout(
        &self,
        request: &ToolCallRequest,
        entry: &ToolRegistryEntry,
        options: &ExecutionOptions,
    ) -> Duration {
        let mut timeout = self.config.default_timeout();
        let overrides = [
            request.timeout_ms.map(Duration::from_millis),
            entry.timeout,
            options.timeout,
        ];
        for candidate in overrides.into_iter().flatten() {
            timeout = timeout.max(candidate);
        }
        timeout
    }
}

//! Tool discovery and the qualified-name registry.
//!
//! Every tool is registered under `"{server_id}:{tool_name}"`. Bare-name
//! lookups scan in registration order; a bare suffix claimed by more than
//! one server is kept for both but flagged, and ambiguous resolutions are
//! logged rather than silently disambiguated.

use dashmap::{DashMap, DashSet};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use switchboard_core::error::{CoordinatorError, CoordinatorResult};
use switchboard_core::tool::{QUALIFIER_SEPARATOR, ToolDefinition, qualified_name};

use crate::provider::ServerConnection;
use crate::reliability::HealthTracker;

/// One registered tool: definition, owning server, connection handle, and
/// health state. Created at discovery, removed only at shutdown.
pub struct ToolRegistryEntry {
    pub qualified_name: String,
    pub definition: ToolDefinition,
    pub server_id: String,
    pub connection: std::sync::Arc<dyn ServerConnection>,
    /// Per-tool timeout override inherited from the server descriptor.
    pub timeout: Option<Duration>,
    pub health: HealthTracker,
}

/// Catalog view of a registered tool, handed to the generation interface.
#[derive(Debug, Clone)]
pub struct ToolCatalogEntry {
    pub qualified_name: String,
    pub server_id: String,
    pub definition: ToolDefinition,
}

/// The qualified-name index over all connected services.
pub struct ToolRegistry {
    circuit_threshold: u32,
    reset_window: Duration,
    entries: DashMap<String, std::sync::Arc<ToolRegistryEntry>>,
    /// Registration order, the deterministic tiebreak for bare-name lookups.
    order: Mutex<Vec<String>>,
    /// Bare names claimed by more than one server.
    collisions: DashSet<String>,
    guidance: DashMap<String, String>,
}

impl ToolRegistry {
    /// Create an empty registry with the given breaker settings.
    pub fn new(circuit_threshold: u32, reset_window: Duration) -> Self {
        Self {
            circuit_threshold,
            reset_window,
            entries: DashMap::new(),
            order: Mutex::new(Vec::new()),
            collisions: DashSet::new(),
            guidance: DashMap::new(),
        }
    }

    /// Discover and register a connected server's tools, then fetch or
    /// synthesize its guidance text.
    pub async fn discover_server(
        &self,
        server_id: &str,
        connection: std::sync::Arc<dyn ServerConnection>,
        timeout: Option<Duration>,
    ) -> CoordinatorResult<usize> {
        let tools = connection.list_tools().await?;
        let count = tools.len();
        for definition in &tools {
            self.register(server_id, definition.clone(), std::sync::Arc::clone(&connection), timeout);
        }
        if count > 0 {
            info!(server_id = %server_id, tools = count, "Registered tools");
        }

        let guidance = match connection.guidance().await {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            Ok(_) => synthesize_guidance(server_id, &tools),
            Err(err) => {
                debug!(server_id = %server_id, error = %err, "Guidance fetch failed, synthesizing");
                synthesize_guidance(server_id, &tools)
            }
        };
        self.guidance.insert(server_id.to_string(), guidance);

        Ok(count)
    }

    /// Register one tool under its qualified name.
    pub fn register(
        &self,
        server_id: &str,
        definition: ToolDefinition,
        connection: std::sync::Arc<dyn ServerConnection>,
        timeout: Option<Duration>,
    ) {
        let qualified = qualified_name(server_id, &definition.name);

        // Flag bare-name collisions across servers; both entries are kept.
        let colliding = self.entries.iter().any(|existing| {
            existing.server_id != server_id && existing.definition.name == definition.name
        });
        if colliding {
            warn!(
                tool = %definition.name,
                server_id = %server_id,
                "Unqualified tool name collides with another server's tool"
            );
            self.collisions.insert(definition.name.clone());
        }

        let entry = std::sync::Arc::new(ToolRegistryEntry {
            qualified_name: qualified.clone(),
            server_id: server_id.to_string(),
            health: HealthTracker::new(self.circuit_threshold, self.reset_window),
            connection,
            timeout,
            definition,
        });
        if self.entries.insert(qualified.clone(), entry).is_none() {
            self.order
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(qualified);
        }
    }

    /// Resolve a tool name to its qualified form.
    ///
    /// Qualified names pass through as-is. Bare names match any qualified
    /// name ending in `:name`, in registration order; ambiguity resolves to
    /// the first registered match with a logged collision warning.
    pub fn resolve_tool_name(&self, name: &str) -> CoordinatorResult<String> {
        if name.contains(QUALIFIER_SEPARATOR) {
            return Ok(name.to_string());
        }

        let suffix = format!("{QUALIFIER_SEPARATOR}{name}");
        let matches: Vec<String> = {
            let order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
            order
                .iter()
                .filter(|qualified| qualified.ends_with(&suffix))
                .cloned()
                .collect()
        };

        match matches.len() {
            0 => Err(CoordinatorError::ToolNotFound(name.to_string())),
            1 => Ok(matches.into_iter().next().unwrap_or_default()),
            n => {
                warn!(
                    tool = %name,
                    candidates = n,
                    resolved = %matches[0],
                    "Ambiguous bare tool name, using first registered match"
                );
                Ok(matches.into_iter().next().unwrap_or_default())
            }
        }
    }

    /// Look up an entry by qualified name.
    pub fn get(&self, qualified: &str) -> Option<std::sync::Arc<ToolRegistryEntry>> {
        self.entries.get(qualified).map(|e| std::sync::Arc::clone(&e))
    }

    /// Catalog of every registered tool, in registration order.
    pub fn catalog(&self) -> Vec<ToolCatalogEntry> {
        let order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        order
            .iter()
            .filter_map(|qualified| self.entries.get(qualified))
            .map(|entry| ToolCatalogEntry {
                qualified_name: entry.qualified_name.clone(),
                server_id: entry.server_id.clone(),
                definition: entry.definition.clone(),
            })
            .collect()
    }

    /// Guidance text per server id.
    pub fn guidance_map(&self) -> HashMap<String, String> {
        self.guidance
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Whether a bare name is claimed by more than one server.
    pub fn is_collision(&self, bare_name: &str) -> bool {
        self.collisions.contains(bare_name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything. Used at shutdown.
    pub fn clear(&self) {
        self.entries.clear();
        self.order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.collisions.clear();
        self.guidance.clear();
    }
}

/// Build a fallback guidance text from the tools' own declarations: name,
/// description, and the parameter list from each schema.
fn synthesize_guidance(server_id: &str, tools: &[ToolDefinition]) -> String {
    let mut text = format!("Tools provided by '{server_id}':\n");
    for tool in tools {
        let description = if tool.description.is_empty() {
            "No description available."
        } else {
            tool.description.as_str()
        };
        let _ = writeln!(text, "- {}: {}", tool.name, description);

        let Some(schema) = tool.input_schema.as_ref().and_then(|s| s.as_object()) else {
            continue;
        };
        let required: Vec<&str> = schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
            continue;
        };
        for (param, declared) in properties {
            let kind = declared
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("any");
            let note = declared
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("");
            let requirement = if required.contains(&param.as_str()) {
                "required"
            } else {
                "optional"
            };
            let _ = writeln!(text, "    {param} ({requirement}, {kind}) {note}");
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct NullConnection;

    #[async_trait]
    impl ServerConnection for NullConnection {
        async fn list_tools(&self) -> CoordinatorResult<Vec<ToolDefinition>> {
            Ok(Vec::new())
        }

        async fn invoke(
            &self,
            _tool_name: &str,
            _arguments: serde_json::Map<String, serde_json::Value>,
            _cancel: CancellationToken,
        ) -> CoordinatorResult<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(5, Duration::from_secs(60))
    }

    fn register(registry: &ToolRegistry, server: &str, tool: &str) {
        registry.register(
            server,
            ToolDefinition::new(tool, format!("{tool} tool")),
            Arc::new(NullConnection),
            None,
        );
    }

    #[test]
    fn qualified_names_pass_through_unchanged() {
        let registry = registry();
        assert_eq!(
            registry.resolve_tool_name("fs:read_file").unwrap(),
            "fs:read_file"
        );
    }

    #[test]
    fn bare_name_with_single_match_resolves() {
        let registry = registry();
        register(&registry, "fs", "read_file");
        register(&registry, "fs", "write_file");

        assert_eq!(
            registry.resolve_tool_name("read_file").unwrap(),
            "fs:read_file"
        );
    }

    #[test]
    fn unknown_bare_name_is_not_found() {
        let registry = registry();
        register(&registry, "fs", "read_file");

        let err = registry.resolve_tool_name("missing").unwrap_err();
        assert!(matches!(err, CoordinatorError::ToolNotFound(_)));
    }

    #[test]
    fn colliding_bare_name_resolves_to_first_registered() {
        let registry = registry();
        register(&registry, "alpha", "search");
        register(&registry, "beta", "search");

        assert_eq!(registry.resolve_tool_name("search").unwrap(), "alpha:search");
        assert!(registry.is_collision("search"));
        // Both entries are kept.
        assert!(registry.get("alpha:search").is_some());
        assert!(registry.get("beta:search").is_some());
    }

    #[test]
    fn suffix_matching_does_not_match_partial_names() {
        let registry = registry();
        register(&registry, "fs", "read_file");

        // "file" is a substring suffix of the tool name but not the bare name.
        assert!(registry.resolve_tool_name("file").is_err());
    }

    #[test]
    fn synthesized_guidance_enumerates_parameters() {
        let tools = vec![
            ToolDefinition::new("read_file", "Read a file from disk").with_schema(json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path" },
                    "limit": { "type": "integer" }
                },
                "required": ["path"]
            })),
            ToolDefinition::new("no_schema", ""),
        ];

        let text = synthesize_guidance("fs", &tools);
        assert!(text.contains("Tools provided by 'fs'"));
        assert!(text.contains("- read_file: Read a file from disk"));
        assert!(text.contains("path (required, string) File path"));
        assert!(text.contains("limit (optional, integer)"));
        assert!(text.contains("- no_schema: No description available."));
    }

    #[test]
    fn catalog_preserves_registration_order() {
        let registry = registry();
        register(&registry, "fs", "zeta");
        register(&registry, "fs", "alpha");

        let catalog = registry.catalog();
        assert_eq!(catalog[0].qualified_name, "fs:zeta");
        assert_eq!(catalog[1].qualified_name, "fs:alpha");
    }
}

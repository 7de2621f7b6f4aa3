//! Configuration for backend services and coordinator-level settings.
//!
//! Mirrors the on-disk shape `{"servers": {"<id>": {...}}}` with breaker and
//! timeout settings alongside. Descriptors are validated once at load time
//! and immutable afterwards; a bad server entry is logged and skipped so it
//! never takes the remaining services down with it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::warn;

use crate::error::{CoordinatorError, CoordinatorResult};

/// How a backend service is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum TransportKind {
    /// Local child process speaking over stdio.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Remote service reached over the network.
    Sse { url: String },
}

/// One configured backend service. Immutable after startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub transport: TransportKind,
    /// Per-server timeout override for its tools, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ServerDescriptor {
    /// The per-server timeout override, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

fn default_circuit_threshold() -> u32 {
    5
}

fn default_reset_window_ms() -> u64 {
    60_000
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Coordinator-level settings plus the validated server list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(skip)]
    pub servers: Vec<ServerDescriptor>,
    /// Consecutive failures at which a tool's circuit opens.
    #[serde(default = "default_circuit_threshold")]
    pub circuit_threshold: u32,
    /// Failure-free time after which an open circuit auto-closes.
    #[serde(default = "default_reset_window_ms")]
    pub circuit_reset_window_ms: u64,
    /// Timeout applied when neither request, tool, nor options override it.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            circuit_threshold: default_circuit_threshold(),
            circuit_reset_window_ms: default_reset_window_ms(),
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

/// Raw on-disk shape before per-server validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    servers: BTreeMap<String, serde_json::Value>,
    #[serde(default = "default_circuit_threshold")]
    circuit_threshold: u32,
    #[serde(default = "default_reset_window_ms")]
    circuit_reset_window_ms: u64,
    #[serde(default = "default_timeout_ms")]
    default_timeout_ms: u64,
}

impl CoordinatorConfig {
    /// Add a server descriptor (builder form, mostly for tests and embedding).
    pub fn with_server(mut self, descriptor: ServerDescriptor) -> Self {
        self.servers.push(descriptor);
        self
    }

    /// Parse configuration from a JSON document.
    ///
    /// An entry that fails validation is logged and skipped; only a document
    /// that cannot be parsed at all is an error.
    pub fn from_json_str(raw: &str) -> CoordinatorResult<Self> {
        let raw: RawConfig = serde_json::from_str(raw)?;

        let mut servers = Vec::with_capacity(raw.servers.len());
        for (id, value) in raw.servers {
            match parse_server(&id, value) {
                Ok(descriptor) => servers.push(descriptor),
                Err(err) => {
                    warn!(server_id = %id, error = %err, "Skipping invalid server entry");
                }
            }
        }

        Ok(Self {
            servers,
            circuit_threshold: raw.circuit_threshold,
            circuit_reset_window_ms: raw.circuit_reset_window_ms,
            default_timeout_ms: raw.default_timeout_ms,
        })
    }

    /// Parse configuration from a file on disk.
    pub fn from_file(path: &std::path::Path) -> CoordinatorResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| CoordinatorError::Configuration {
            server_id: String::new(),
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_json_str(&raw)
    }

    /// The default timeout as a `Duration`.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// The circuit reset window as a `Duration`.
    pub fn reset_window(&self) -> Duration {
        Duration::from_millis(self.circuit_reset_window_ms)
    }
}

fn parse_server(id: &str, value: serde_json::Value) -> CoordinatorResult<ServerDescriptor> {
    if id.is_empty() {
        return Err(CoordinatorError::Configuration {
            server_id: id.to_string(),
            reason: "server id must not be empty".into(),
        });
    }
    let mut descriptor: ServerDescriptor =
        serde_json::from_value(value).map_err(|e| CoordinatorError::Configuration {
            server_id: id.to_string(),
            reason: e.to_string(),
        })?;
    if let TransportKind::Stdio { command, .. } = &descriptor.transport
        && command.is_empty()
    {
        return Err(CoordinatorError::Configuration {
            server_id: id.to_string(),
            reason: "stdio transport requires a non-empty command".into(),
        });
    }
    descriptor.id = id.to_string();
    Ok(descriptor)
}

/// Settings for the conversation orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Ceiling on nested tool-call → follow-up → tool-call chains per turn.
    pub max_tool_call_depth: u32,
    /// Generation attempts before the turn downgrades to an apology.
    pub max_generation_attempts: u32,
    /// Fixed delay between generation attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// History length beyond which pruning kicks in.
    pub max_history_messages: usize,
    /// How many of the newest messages pruning retains.
    pub retain_newest_messages: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_call_depth: 3,
            max_generation_attempts: 3,
            retry_delay_ms: 1_000,
            max_history_messages: 50,
            retain_newest_messages: 25,
        }
    }
}

impl OrchestratorConfig {
    /// The retry delay as a `Duration`.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "servers": {
            "fs": {
                "description": "Filesystem tools",
                "transport": "stdio",
                "command": "fs-server",
                "args": ["--root", "/tmp"],
                "timeout_ms": 5000
            },
            "search": {
                "transport": "sse",
                "url": "https://search.internal/mcp"
            },
            "broken": {
                "transport": "stdio"
            }
        },
        "circuit_threshold": 3
    }"#;

    #[test]
    fn loads_valid_servers_and_skips_broken_ones() {
        let config = CoordinatorConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.circuit_threshold, 3);
        assert_eq!(config.circuit_reset_window_ms, 60_000);

        let fs = config.servers.iter().find(|s| s.id == "fs").unwrap();
        assert_eq!(fs.timeout(), Some(Duration::from_millis(5000)));
        assert!(matches!(fs.transport, TransportKind::Stdio { .. }));

        let search = config.servers.iter().find(|s| s.id == "search").unwrap();
        assert!(matches!(search.transport, TransportKind::Sse { .. }));
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = CoordinatorConfig::from_json_str("{}").unwrap();
        assert!(config.servers.is_empty());
        assert_eq!(config.circuit_threshold, 5);
        assert_eq!(config.default_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn unparseable_document_is_an_error() {
        assert!(CoordinatorConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn stdio_requires_command() {
        let raw = r#"{"servers": {"bad": {"transport": "stdio", "command": ""}}}"#;
        let config = CoordinatorConfig::from_json_str(raw).unwrap();
        assert!(config.servers.is_empty());
    }

    #[test]
    fn orchestrator_defaults_match_design() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_tool_call_depth, 3);
        assert_eq!(config.max_generation_attempts, 3);
        assert_eq!(config.retain_newest_messages, 25);
    }
}

//! # Switchboard Coordinator
//!
//! Tool coordination across independently-failing backend services:
//! connection management, tool discovery and qualified-name registry,
//! per-tool circuit breaking, and timed, cancellable execution.

pub mod connection;
pub mod coordinator;
pub mod provider;
pub mod registry;
pub mod reliability;

pub use connection::ConnectionManager;
pub use coordinator::{ExecutionOptions, ToolCoordinator};
pub use provider::{ConnectionFactory, ServerConnection};
pub use registry::{ToolCatalogEntry, ToolRegistry, ToolRegistryEntry};
pub use reliability::{HealthTracker, PerformanceState, ReliabilityState, ToolHealth};

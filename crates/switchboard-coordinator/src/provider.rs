//! The tool-provider protocol seam.
//!
//! One `ServerConnection` per backend service. The coordinator only ever
//! talks to services through these traits, so transports (child process,
//! network) and test doubles plug in the same way.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use switchboard_core::config::ServerDescriptor;
use switchboard_core::error::CoordinatorResult;
use switchboard_core::tool::ToolDefinition;

/// A live connection to one backend service.
#[async_trait]
pub trait ServerConnection: Send + Sync {
    /// List the tools this service exposes.
    async fn list_tools(&self) -> CoordinatorResult<Vec<ToolDefinition>>;

    /// Fetch the service's "how to use these tools" guidance text, if it
    /// publishes one. `Ok(None)` means the service has nothing to offer.
    async fn guidance(&self) -> CoordinatorResult<Option<String>> {
        Ok(None)
    }

    /// Invoke a tool by its bare name.
    ///
    /// Implementations must observe the cancellation token: a cancelled
    /// invocation should return promptly with an error.
    async fn invoke(
        &self,
        tool_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
        cancel: CancellationToken,
    ) -> CoordinatorResult<serde_json::Value>;

    /// Tear the connection down. Errors are logged, not propagated.
    async fn disconnect(&self) -> CoordinatorResult<()> {
        Ok(())
    }
}

/// Opens connections from descriptors. One implementation per deployment
/// (real transports in production, scripted doubles in tests).
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Attempt to open a connection to the described service.
    async fn connect(
        &self,
        descriptor: &ServerDescriptor,
    ) -> CoordinatorResult<Arc<dyn ServerConnection>>;
}

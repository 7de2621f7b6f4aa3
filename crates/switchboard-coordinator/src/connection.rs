//! Per-server connection management.
//!
//! A single failed connection never blocks the others: each descriptor is
//! attempted independently and failures are logged and skipped, so the
//! resulting map may be smaller than the configured set.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{error, info};

use switchboard_core::config::ServerDescriptor;

use crate::provider::{ConnectionFactory, ServerConnection};

/// Holds the live connection handles, keyed by server id.
#[derive(Default)]
pub struct ConnectionManager {
    connections: DashMap<String, Arc<dyn ServerConnection>>,
}

impl ConnectionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to connect every descriptor, returning the ids that came up.
    pub async fn connect_all(
        &self,
        descriptors: &[ServerDescriptor],
        factory: &dyn ConnectionFactory,
    ) -> Vec<String> {
        let mut connected = Vec::new();
        for descriptor in descriptors {
            match factory.connect(descriptor).await {
                Ok(connection) => {
                    info!(server_id = %descriptor.id, "Connected to server");
                    self.connections
                        .insert(descriptor.id.clone(), connection);
                    connected.push(descriptor.id.clone());
                }
                Err(err) => {
                    error!(
                        server_id = %descriptor.id,
                        error = %err,
                        "Failed to connect to server, continuing with the rest"
                    );
                }
            }
        }
        connected
    }

    /// Look up a connection by server id.
    pub fn get(&self, server_id: &str) -> Option<Arc<dyn ServerConnection>> {
        self.connections.get(server_id).map(|c| Arc::clone(&c))
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether any connection is live.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Disconnect everything and clear the map.
    pub async fn disconnect_all(&self) {
        let ids: Vec<String> = self.connections.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, connection)) = self.connections.remove(&id) {
                if let Err(err) = connection.disconnect().await {
                    error!(server_id = %id, error = %err, "Error disconnecting server");
                }
            }
        }
    }
}

//! Lobby connection registry
//!
//! Lobby connections are not part of any room; they only receive room
//! lifecycle pushes (`Created` / `Deleted`).

use dashmap::DashMap;
use tracing::{info, warn};

use crate::connection::ConnectionHandle;
use crate::constants::LOBBY_GREETING;
use crate::core::error::Result;
use crate::core::types::ConnectionId;
use crate::protocol::LobbyEvent;
use crate::system::metrics::Metrics;

/// Tracks every live lobby connection
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionHandle>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lobby connection and greet it
    pub fn register(&self, conn: ConnectionHandle) -> Result<()> {
        conn.send_text(LOBBY_GREETING)?;
        if self.connections.insert(conn.id(), conn.clone()).is_none() {
            Metrics::global().connections.lobby.inc();
        }
        info!("Lobby connection {} registered ({} total)", conn.id(), self.connections.len());
        Ok(())
    }

    /// Forget a lobby connection; unknown ids are ignored
    pub fn deregister(&self, id: ConnectionId) {
        if self.connections.remove(&id).is_some() {
            Metrics::global().connections.lobby.dec();
            info!("Lobby connection {} deregistered", id);
        }
    }

    /// Push a lifecycle event to every lobby connection
    ///
    /// Returns the number of successful deliveries. Failed sends are logged
    /// and skipped.
    pub fn broadcast(&self, event: &LobbyEvent) -> usize {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode lobby event: {}", e);
                return 0;
            }
        };

        // Snapshot first so no shard guard is held while sending
        let targets: Vec<ConnectionHandle> =
            self.connections.iter().map(|entry| entry.value().clone()).collect();

        let mut delivered = 0;
        for conn in targets {
            match conn.send_text(&frame) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    Metrics::global().connections.send_failures.inc();
                    warn!("Lobby push to {} failed: {}", conn.id(), e);
                }
            }
        }
        delivered
    }

    /// Number of registered lobby connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no lobby connections are registered
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

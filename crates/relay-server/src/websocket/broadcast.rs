//! Envelope fan-out to connected clients.

use std::sync::Arc;

use dashmap::DashMap;
use relay_core::Envelope;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::connection::{Connection, ConnectionId, Outbound};

/// Broadcast payloads above this serialized size are dropped outright.
pub const MAX_BROADCAST_BYTES: usize = 1024 * 1024;

/// Per-connection writer channel depth.
const OUTBOUND_BUFFER: usize = 64;

/// Registry of live connections and the broadcast path over them.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a new connection: fresh id, writer channel, cancel token.
    pub fn register(&self) -> (Arc<Connection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let conn = Arc::new(Connection::new(
            ConnectionId::new(),
            tx,
            CancellationToken::new(),
        ));
        let _ = self.connections.insert(conn.id.clone(), conn.clone());
        (conn, rx)
    }

    /// Remove a connection. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &ConnectionId) {
        let _ = self.connections.remove(id);
    }

    /// Number of registered connections.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Snapshot of the current connections, for the heartbeat sweep.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Serialize `envelope` once and fan it out to every ready connection.
    ///
    /// Oversized envelopes reach nobody: a warning is logged and the call
    /// returns. Connections mid-close just miss the message — delivery is
    /// at-most-once and best-effort. Returns the recipient count.
    pub fn broadcast(&self, envelope: &Envelope) -> usize {
        let frame = match envelope.encode() {
            Ok(json) => Arc::new(json),
            Err(error) => {
                warn!(event_type = %envelope.event_type, %error, "failed to serialize envelope");
                return 0;
            }
        };

        if frame.len() > MAX_BROADCAST_BYTES {
            warn!(
                event_type = %envelope.event_type,
                size = frame.len(),
                limit = MAX_BROADCAST_BYTES,
                "broadcast payload too large, dropping"
            );
            return 0;
        }

        let mut recipients = 0;
        for entry in self.connections.iter() {
            let conn = entry.value();
            if conn.is_terminated() {
                continue;
            }
            if conn.send_text(frame.clone()) {
                recipients += 1;
            } else {
                debug!(conn_id = %conn.id, "connection not ready, skipping");
            }
        }
        debug!(event_type = %envelope.event_type, recipients, "broadcast envelope");
        recipients
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Per-connection state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Outbound frame queued for a connection's writer task.
#[derive(Clone, Debug)]
pub enum Outbound {
    /// A serialized envelope, shared across all broadcast recipients.
    Text(Arc<String>),
    /// A liveness probe.
    Ping,
}

/// Unique connection identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl Default for ConnectionId {
    fn default() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl ConnectionId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected WebSocket client, owned by the registry.
pub struct Connection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Channel to the connection's writer task.
    tx: mpsc::Sender<Outbound>,
    /// Whether a pong arrived since the last probe.
    is_alive: AtomicBool,
    /// Cancelling this tears down the socket tasks.
    cancel: CancellationToken,
}

impl Connection {
    /// Create a new connection wrapping a writer channel.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Outbound>, cancel: CancellationToken) -> Self {
        Self {
            id,
            tx,
            is_alive: AtomicBool::new(true),
            cancel,
        }
    }

    /// Queue a text frame. Returns `false` when the writer is gone or its
    /// channel is full — the frame is simply not delivered.
    pub fn send_text(&self, frame: Arc<String>) -> bool {
        self.tx.try_send(Outbound::Text(frame)).is_ok()
    }

    /// Queue a ping probe.
    pub fn send_ping(&self) -> bool {
        self.tx.try_send(Outbound::Ping).is_ok()
    }

    /// Record a pong (or other proof of life).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Consume the alive flag: returns whether the connection answered since
    /// the last check, and resets the flag for the next probe window.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Tear down the socket tasks. Idempotent.
    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    /// Whether [`Connection::terminate`] has been called.
    pub fn is_terminated(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token observed by the connection's reader/writer tasks.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

//! WebSocket connection state, broadcast fan-out, and liveness probing.

pub mod broadcast;
pub mod connection;
pub mod heartbeat;

//! # relay-server
//!
//! Axum HTTP + WebSocket server side of the relay transport.
//!
//! - Admission gate: origin allowlist + custom verifier before upgrade,
//!   connection ceiling after
//! - Connection registry with serialize-once broadcast fan-out
//! - Heartbeat sweep reaping half-open connections
//! - `/health` endpoint and graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod admission;
pub mod config;
pub mod error;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{RelayServer, ServerHandle};
pub use websocket::broadcast::ConnectionRegistry;

//! # relay-client
//!
//! Reconnecting WebSocket client for the relay transport.
//!
//! A [`RelayClient`] is constructed inert. The first [`RelayClient::subscribe`]
//! opens the socket; the last unsubscribe (or an explicit
//! [`RelayClient::dispose`]) tears it down for good. While disconnected,
//! [`RelayClient::send`] queues serialized frames in a bounded drop-oldest
//! queue that is flushed in order on reconnect. Reconnection uses jittered
//! exponential backoff from `relay-core`.

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod queue;
pub mod state;

pub use client::{RelayClient, Subscription};
pub use config::ClientConfig;
pub use state::ConnectionState;

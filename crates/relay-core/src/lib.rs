//! # relay-core
//!
//! Portable building blocks for the relay transport:
//!
//! - [`Envelope`]: the `{type, payload, timestamp?}` wire unit
//! - [`sanitize::strip_dangerous_keys`]: recursive removal of keys that can
//!   poison prototype chains in JavaScript consumers
//! - [`backoff`]: jittered exponential reconnect delays
//!
//! Everything here is sync-only; the server and client crates layer tokio
//! on top.

#![deny(unsafe_code)]

pub mod backoff;
pub mod envelope;
pub mod sanitize;

pub use envelope::{DecodeError, Envelope};
pub use sanitize::strip_dangerous_keys;

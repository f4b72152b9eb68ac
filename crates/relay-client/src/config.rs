//! Client configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::RelayClient`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket URL to connect to.
    pub url: String,
    /// Maximum automatic reconnect attempts. `0` means unlimited.
    pub max_attempts: u32,
    /// Ceiling on the backoff delay between attempts, in milliseconds.
    pub max_backoff_ms: u64,
    /// Maximum offline-queue length; the oldest entry is evicted when full.
    pub max_queue_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9092/ws".into(),
            max_attempts: 0,
            max_backoff_ms: 30_000,
            max_queue_size: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unlimited_attempts() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.max_attempts, 0);
    }

    #[test]
    fn default_backoff_ceiling() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.max_backoff_ms, 30_000);
        assert_eq!(cfg.max_queue_size, 100);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ClientConfig {
            url: "ws://example:1234/events".into(),
            max_attempts: 5,
            max_backoff_ms: 10_000,
            max_queue_size: 3,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.url, cfg.url);
        assert_eq!(back.max_attempts, 5);
        assert_eq!(back.max_queue_size, 3);
    }
}

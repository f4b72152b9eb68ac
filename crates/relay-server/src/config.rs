//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
///
/// Exactly one binding must be used: a standalone `port` here with
/// [`crate::RelayServer::serve`], or a caller-supplied listener with
/// [`crate::RelayServer::serve_on`] (and `port` left `None`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind when serving standalone (default `"127.0.0.1"`).
    pub host: String,
    /// Standalone port. `None` means an external listener will be supplied.
    pub port: Option<u16>,
    /// URL path serving the WebSocket upgrade (default `"/ws"`).
    pub path: String,
    /// Inbound message ceiling enforced at the WebSocket layer, in bytes.
    pub max_payload_bytes: usize,
    /// Liveness probe interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Maximum concurrent connections. `0` means unlimited.
    pub max_connections: usize,
    /// Exact-match origin allowlist. `None` accepts any origin.
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: None,
            path: "/ws".into(),
            max_payload_bytes: 1024 * 1024,
            heartbeat_interval_ms: 30_000,
            max_connections: 0,
            allowed_origins: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_is_ws() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.path, "/ws");
    }

    #[test]
    fn default_has_no_port() {
        let cfg = ServerConfig::default();
        assert!(cfg.port.is_none());
    }

    #[test]
    fn default_heartbeat_interval() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.heartbeat_interval_ms, 30_000);
    }

    #[test]
    fn default_payload_ceiling_is_one_mib() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_payload_bytes, 1024 * 1024);
    }

    #[test]
    fn default_connections_unlimited() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_connections, 0);
        assert!(cfg.allowed_origins.is_none());
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: Some(9092),
            path: "/events".into(),
            max_payload_bytes: 512,
            heartbeat_interval_ms: 5000,
            max_connections: 8,
            allowed_origins: Some(vec!["http://a".into()]),
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.port, Some(9092));
        assert_eq!(back.path, "/events");
        assert_eq!(back.max_connections, 8);
        assert_eq!(back.allowed_origins.as_deref(), Some(&["http://a".to_string()][..]));
    }
}

//! Server error type.

/// Errors surfaced by [`crate::server::RelayServer`].
///
/// Admission rejections, malformed frames, and oversized broadcasts are not
/// errors — they are logged and absorbed. Only misconfiguration and bind
/// failures propagate.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// `serve_on` was called while the config also names a standalone port.
    #[error("config names standalone port {0} but an external listener was supplied")]
    ConflictingBinding(u16),
    /// `serve` was called without a port in the config.
    #[error("no port configured and no external listener supplied")]
    MissingBinding,
    /// Binding the listener failed.
    #[error("bind failed: {0}")]
    Io(#[from] std::io::Error),
}

//! Connection state machine states.

/// Where the client currently is in its connection lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and nothing scheduled. The state before the first
    /// subscriber arrives.
    Disconnected,
    /// A connect is in flight.
    Connecting,
    /// The socket is open; sends transmit immediately.
    Open,
    /// A backoff delay is running; a reconnect will follow.
    ReconnectPending,
    /// The attempt ceiling was reached. Terminal for automatic retries,
    /// distinct from [`ConnectionState::Disconnected`] so callers can tell
    /// "gave up" from "not yet started".
    Exhausted,
    /// Torn down by dispose or the last unsubscribe. Terminal.
    Disposed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::ReconnectPending => "reconnect-pending",
            Self::Exhausted => "exhausted",
            Self::Disposed => "disposed",
        };
        write!(f, "{label}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_labels() {
        assert_eq!(ConnectionState::Open.to_string(), "open");
        assert_eq!(ConnectionState::Exhausted.to_string(), "exhausted");
        assert_eq!(ConnectionState::ReconnectPending.to_string(), "reconnect-pending");
    }

    #[test]
    fn states_are_comparable() {
        assert_eq!(ConnectionState::Disposed, ConnectionState::Disposed);
        assert_ne!(ConnectionState::Disconnected, ConnectionState::Exhausted);
    }
}

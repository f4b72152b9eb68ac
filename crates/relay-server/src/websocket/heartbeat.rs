//! Liveness sweep over the connection registry.
//!
//! One server-owned task probes every connection each interval. A
//! connection that has not answered since the previous probe is treated as
//! dead, not merely slow, and is terminated — worst case a half-open
//! connection survives roughly two intervals.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::broadcast::ConnectionRegistry;

/// Run the probe loop until `cancel` fires.
///
/// Each tick, for every tracked connection: consume the alive flag — if the
/// connection answered since the last tick, send the next ping; otherwise
/// terminate and unregister it.
pub async fn run_sweep(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(interval);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for conn in registry.snapshot() {
                    if conn.check_alive() {
                        let _ = conn.send_ping();
                    } else {
                        warn!(conn_id = %conn.id, "liveness probe unanswered, terminating");
                        conn.terminate();
                        registry.remove(&conn.id);
                    }
                }
            }
            () = cancel.cancelled() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::Outbound;

    #[tokio::test]
    async fn sweep_stops_on_cancel() {
        let registry = Arc::new(ConnectionRegistry::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_sweep(
            registry,
            Duration::from_secs(60),
            cancel.clone(),
        ));
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unanswered_connection_terminated_within_two_intervals() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, _rx) = registry.register();
        let cancel = CancellationToken::new();
        let sweep = tokio::spawn(run_sweep(
            registry.clone(),
            Duration::from_millis(25),
            cancel.clone(),
        ));

        // Never answer: first tick consumes the initial alive flag and pings,
        // second tick reaps.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(conn.is_terminated());
        assert_eq!(registry.count(), 0);

        cancel.cancel();
        sweep.await.unwrap();
    }

    #[tokio::test]
    async fn answering_connection_survives() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, mut rx) = registry.register();
        let cancel = CancellationToken::new();
        let sweep = tokio::spawn(run_sweep(
            registry.clone(),
            Duration::from_millis(25),
            cancel.clone(),
        ));

        // Answer every probe for a few intervals.
        let answered = tokio::spawn(async move {
            let mut pings = 0;
            while pings < 4 {
                if let Some(Outbound::Ping) = rx.recv().await {
                    pings += 1;
                    conn.mark_alive();
                } else {
                    break;
                }
            }
            conn
        });

        let conn = tokio::time::timeout(Duration::from_secs(2), answered)
            .await
            .unwrap()
            .unwrap();
        assert!(!conn.is_terminated());
        assert_eq!(registry.count(), 1);

        cancel.cancel();
        sweep.await.unwrap();
    }

    #[tokio::test]
    async fn pings_only_go_to_live_connections() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, mut rx) = registry.register();
        let cancel = CancellationToken::new();
        let sweep = tokio::spawn(run_sweep(
            registry.clone(),
            Duration::from_millis(20),
            cancel.clone(),
        ));

        // First probe window: the initial alive flag earns one ping.
        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert!(matches!(first, Some(Outbound::Ping)));

        // Unanswered, so the next tick terminates instead of pinging again.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(conn.is_terminated());

        cancel.cancel();
        sweep.await.unwrap();
    }
}

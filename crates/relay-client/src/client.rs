//! The reconnecting client.
//!
//! One background task owns the socket for the client's whole life: it
//! connects, pumps frames in both directions, and sleeps out the backoff
//! between attempts. Every wait is a `select!` arm against the client's
//! cancellation token, so dispose takes effect at the next await point.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use relay_core::backoff::reconnect_delay_ms;
use relay_core::Envelope;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::queue::OfflineQueue;
use crate::state::ConnectionState;

/// Subscriber callback receiving every well-formed inbound envelope.
type Handler = Arc<dyn Fn(Envelope) + Send + Sync>;

struct ClientState {
    connection: ConnectionState,
    attempts: u32,
    queue: OfflineQueue,
    subscribers: HashMap<u64, Handler>,
    next_subscriber_id: u64,
    /// Channel into the open socket's write half. `Some` only while `Open`.
    writer: Option<mpsc::UnboundedSender<String>>,
    cancel: CancellationToken,
    disposed: bool,
}

struct ClientInner {
    config: ClientConfig,
    state: Mutex<ClientState>,
}

/// Handle returned by [`RelayClient::subscribe`].
///
/// `unsubscribe` is idempotent. Dropping the handle does **not**
/// unsubscribe — an ignored handle keeps the subscription alive.
pub struct Subscription {
    inner: Weak<ClientInner>,
    id: u64,
}

impl Subscription {
    /// Remove this handler. The unsubscribe that empties the subscriber set
    /// disposes the client.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut state = inner.state.lock();
            if state.subscribers.remove(&self.id).is_some()
                && state.subscribers.is_empty()
                && !state.disposed
            {
                dispose_locked(&mut state);
            }
        }
    }
}

/// A reconnecting WebSocket client.
///
/// Constructed inert; the first subscriber triggers the connection and the
/// last unsubscribe (or [`RelayClient::dispose`]) tears it down terminally.
pub struct RelayClient {
    inner: Arc<ClientInner>,
}

impl RelayClient {
    /// Create an inert client. No socket is opened until the first
    /// [`RelayClient::subscribe`].
    pub fn new(config: ClientConfig) -> Self {
        let max_queue = config.max_queue_size;
        Self {
            inner: Arc::new(ClientInner {
                config,
                state: Mutex::new(ClientState {
                    connection: ConnectionState::Disconnected,
                    attempts: 0,
                    queue: OfflineQueue::new(max_queue),
                    subscribers: HashMap::new(),
                    next_subscriber_id: 0,
                    writer: None,
                    cancel: CancellationToken::new(),
                    disposed: false,
                }),
            }),
        }
    }

    /// Current state of the connection state machine.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().connection
    }

    /// Whether the socket is currently open.
    pub fn connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Number of frames waiting in the offline queue.
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    /// Register a handler for every sanitized, well-formed inbound envelope.
    ///
    /// The first subscriber triggers the connection (so this must run inside
    /// a tokio runtime). Subscribing to a disposed client registers nothing.
    pub fn subscribe(&self, handler: impl Fn(Envelope) + Send + Sync + 'static) -> Subscription {
        let (id, start) = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                warn!("subscribe on disposed client ignored");
                (u64::MAX, false)
            } else {
                let id = state.next_subscriber_id;
                state.next_subscriber_id += 1;
                let _ = state.subscribers.insert(id, Arc::new(handler));
                (id, state.subscribers.len() == 1)
            }
        };

        if start {
            let _ = tokio::spawn(run(self.inner.clone()));
        }

        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Send an envelope: transmit immediately when open, otherwise queue it.
    ///
    /// Never fails. When the offline queue is full the oldest entry is
    /// evicted; on a disposed client the envelope is dropped.
    pub fn send(&self, envelope: &Envelope) {
        let frame = match envelope.encode() {
            Ok(json) => json,
            Err(error) => {
                warn!(event_type = %envelope.event_type, %error, "unserializable envelope dropped");
                return;
            }
        };

        let mut state = self.inner.state.lock();
        if state.disposed {
            debug!("send on disposed client dropped");
            return;
        }
        if state.connection == ConnectionState::Open {
            if let Some(writer) = &state.writer {
                if writer.send(frame.clone()).is_ok() {
                    return;
                }
            }
        }
        let _ = state.queue.push(frame);
    }

    /// Tear the client down: close the socket, cancel any pending reconnect,
    /// clear the queue. Idempotent and terminal.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock();
        if !state.disposed {
            dispose_locked(&mut state);
        }
    }
}

fn dispose_locked(state: &mut ClientState) {
    state.disposed = true;
    state.connection = ConnectionState::Disposed;
    state.cancel.cancel();
    state.queue.clear();
    state.subscribers.clear();
    state.writer = None;
    info!("client disposed");
}

/// Connection task: runs from the first subscribe until dispose or
/// exhaustion.
async fn run(inner: Arc<ClientInner>) {
    let cancel = inner.state.lock().cancel.clone();

    loop {
        {
            let mut state = inner.state.lock();
            if state.disposed {
                return;
            }
            state.connection = ConnectionState::Connecting;
        }

        let connected = tokio::select! {
            result = connect_async(inner.config.url.as_str()) => result,
            () = cancel.cancelled() => return,
        };

        match connected {
            Ok((socket, _response)) => {
                drive_socket(&inner, socket, &cancel).await;
                if cancel.is_cancelled() {
                    return;
                }
            }
            Err(error) => debug!(url = %inner.config.url, %error, "connect failed"),
        }

        // Schedule the next attempt, or give up at the ceiling.
        let delay_ms = {
            let mut state = inner.state.lock();
            if state.disposed {
                return;
            }
            let max_attempts = inner.config.max_attempts;
            if max_attempts > 0 && state.attempts >= max_attempts {
                state.connection = ConnectionState::Exhausted;
                info!(attempts = state.attempts, "reconnect attempts exhausted");
                return;
            }
            let delay = reconnect_delay_ms(state.attempts, inner.config.max_backoff_ms);
            state.attempts += 1;
            state.connection = ConnectionState::ReconnectPending;
            delay
        };

        debug!(delay_ms, "reconnect scheduled");
        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            () = cancel.cancelled() => return,
        }
    }
}

/// Pump one open socket until it closes or the client is cancelled.
async fn drive_socket<S>(
    inner: &Arc<ClientInner>,
    socket: tokio_tungstenite::WebSocketStream<S>,
    cancel: &CancellationToken,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = socket.split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<String>();

    // Open: reset the attempt counter and flush the offline queue in FIFO
    // order ahead of any new sends.
    {
        let mut state = inner.state.lock();
        if state.disposed {
            return;
        }
        state.connection = ConnectionState::Open;
        state.attempts = 0;
        while let Some(frame) = state.queue.pop() {
            if writer_tx.send(frame).is_err() {
                break;
            }
        }
        state.writer = Some(writer_tx);
    }
    info!(url = %inner.config.url, "connected");

    loop {
        tokio::select! {
            outbound = writer_rx.recv() => match outbound {
                Some(frame) => {
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => deliver(inner, &text),
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(%error, "socket error");
                    break;
                }
            },
            () = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    let mut state = inner.state.lock();
    state.writer = None;
    if !state.disposed {
        // Frames handed to the writer but never transmitted go back to the
        // head of the queue for the next flush, ahead of any newer sends.
        while let Ok(frame) = writer_rx.try_recv() {
            let _ = state.queue.push(frame);
        }
        state.connection = ConnectionState::Disconnected;
        debug!("disconnected");
    }
}

/// Decode an inbound frame and hand it to every subscriber, outside the lock.
fn deliver(inner: &Arc<ClientInner>, text: &str) {
    let envelope = match Envelope::decode(text) {
        Ok(envelope) => envelope,
        Err(error) => {
            debug!(%error, "dropping malformed frame");
            return;
        }
    };

    let handlers: Vec<Handler> = inner.state.lock().subscribers.values().cloned().collect();
    for handler in handlers {
        handler(envelope.clone());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unreachable_config() -> ClientConfig {
        ClientConfig {
            // TEST-NET-1 address: connects hang or fail, never succeed.
            url: "ws://192.0.2.1:1/ws".into(),
            max_attempts: 1,
            max_backoff_ms: 100,
            max_queue_size: 3,
        }
    }

    #[test]
    fn new_client_is_inert() {
        let client = RelayClient::new(unreachable_config());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.connected());
        assert_eq!(client.subscriber_count(), 0);
        assert_eq!(client.queued(), 0);
    }

    #[test]
    fn send_while_disconnected_queues_with_eviction() {
        let client = RelayClient::new(unreachable_config());
        for n in 0..4 {
            client.send(&Envelope::new("msg", json!({"n": n})));
        }
        // max_queue_size = 3: the first envelope was evicted
        assert_eq!(client.queued(), 3);
    }

    #[test]
    fn dispose_is_idempotent() {
        let client = RelayClient::new(unreachable_config());
        client.send(&Envelope::new("msg", json!(1)));
        client.dispose();
        assert!(!client.connected());
        assert_eq!(client.state(), ConnectionState::Disposed);
        client.dispose();
        assert!(!client.connected());
        assert_eq!(client.queued(), 0, "dispose clears the queue");
    }

    #[test]
    fn send_after_dispose_is_a_noop() {
        let client = RelayClient::new(unreachable_config());
        client.dispose();
        client.send(&Envelope::new("msg", json!(1)));
        assert_eq!(client.queued(), 0);
    }

    #[tokio::test]
    async fn subscribe_after_dispose_registers_nothing() {
        let client = RelayClient::new(unreachable_config());
        client.dispose();
        let sub = client.subscribe(|_| {});
        assert_eq!(client.subscriber_count(), 0);
        assert_eq!(client.state(), ConnectionState::Disposed);
        sub.unsubscribe(); // harmless
    }

    #[tokio::test]
    async fn subscribe_starts_connecting() {
        let client = RelayClient::new(unreachable_config());
        let _sub = client.subscribe(|_| {});
        assert_eq!(client.subscriber_count(), 1);
        // Let the connection task take its first step.
        tokio::task::yield_now().await;
        assert_ne!(client.state(), ConnectionState::Disconnected);
        client.dispose();
    }

    #[tokio::test]
    async fn last_unsubscribe_disposes() {
        let client = RelayClient::new(unreachable_config());
        let sub_a = client.subscribe(|_| {});
        let sub_b = client.subscribe(|_| {});
        assert_eq!(client.subscriber_count(), 2);

        sub_a.unsubscribe();
        assert_eq!(client.subscriber_count(), 1);
        assert_ne!(client.state(), ConnectionState::Disposed);

        sub_b.unsubscribe();
        assert_eq!(client.state(), ConnectionState::Disposed);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let client = RelayClient::new(unreachable_config());
        let sub_a = client.subscribe(|_| {});
        let _sub_b = client.subscribe(|_| {});

        sub_a.unsubscribe();
        sub_a.unsubscribe();
        assert_eq!(client.subscriber_count(), 1);
        assert_ne!(client.state(), ConnectionState::Disposed);
        client.dispose();
    }

    #[test]
    fn deliver_skips_malformed_and_typeless_frames() {
        let client = RelayClient::new(unreachable_config());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        {
            let mut state = client.inner.state.lock();
            let _ = state.subscribers.insert(
                0,
                Arc::new(move |envelope: Envelope| sink.lock().push(envelope.event_type)),
            );
        }

        deliver(&client.inner, "not json");
        deliver(&client.inner, r#"{"payload": 1}"#);
        deliver(&client.inner, r#"{"type": "good", "payload": 1}"#);

        assert_eq!(&*seen.lock(), &["good".to_string()]);
    }
}

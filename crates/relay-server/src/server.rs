//! `RelayServer` — Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use relay_core::Envelope;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::admission::{self, VerifyClient, TRY_AGAIN_LATER};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::ConnectionRegistry;
use crate::websocket::connection::{ConnectionId, Outbound};
use crate::websocket::heartbeat;

/// Callback invoked when a connection passes admission.
pub type ConnectionCallback = Arc<dyn Fn(&ConnectionId) + Send + Sync>;
/// Callback invoked for every well-formed inbound envelope.
pub type MessageCallback = Arc<dyn Fn(&ConnectionId, Envelope) + Send + Sync>;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
struct AppState {
    registry: Arc<ConnectionRegistry>,
    config: Arc<ServerConfig>,
    verify_client: Option<VerifyClient>,
    on_connection: Option<ConnectionCallback>,
    on_message: Option<MessageCallback>,
    start_time: Instant,
}

/// The relay server: admission gate, connection registry, broadcast path,
/// and the heartbeat sweep.
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    verify_client: Option<VerifyClient>,
    on_connection: Option<ConnectionCallback>,
    on_message: Option<MessageCallback>,
    start_time: Instant,
}

impl RelayServer {
    /// Create a server from its configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            verify_client: None,
            on_connection: None,
            on_message: None,
            start_time: Instant::now(),
        }
    }

    /// Install a handshake verifier predicate.
    #[must_use]
    pub fn verify_client(
        mut self,
        verify: impl Fn(&HeaderMap) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.verify_client = Some(Arc::new(verify));
        self
    }

    /// Install a callback fired when a connection is admitted.
    #[must_use]
    pub fn on_connection(mut self, callback: impl Fn(&ConnectionId) + Send + Sync + 'static) -> Self {
        self.on_connection = Some(Arc::new(callback));
        self
    }

    /// Install a callback fired for every well-formed inbound envelope.
    #[must_use]
    pub fn on_message(
        mut self,
        callback: impl Fn(&ConnectionId, Envelope) + Send + Sync + 'static,
    ) -> Self {
        self.on_message = Some(Arc::new(callback));
        self
    }

    /// The connection registry — the broadcast entry point for producers.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with the WebSocket and health routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            config: Arc::new(self.config.clone()),
            verify_client: self.verify_client.clone(),
            on_connection: self.on_connection.clone(),
            on_message: self.on_message.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route(self.config.path.as_str(), get(ws_route))
            .route("/health", get(health_route))
            .with_state(state)
            .layer(CorsLayer::permissive())
    }

    /// Bind `host:port` from the config and start serving.
    ///
    /// Errors when the config has no standalone port.
    pub async fn serve(self) -> Result<ServerHandle, ServerError> {
        let Some(port) = self.config.port else {
            return Err(ServerError::MissingBinding);
        };
        let listener = TcpListener::bind((self.config.host.as_str(), port)).await?;
        self.start(listener)
    }

    /// Start serving on a caller-supplied listener.
    ///
    /// Errors when the config also names a standalone port — the two binding
    /// modes are mutually exclusive.
    pub fn serve_on(self, listener: TcpListener) -> Result<ServerHandle, ServerError> {
        if let Some(port) = self.config.port {
            return Err(ServerError::ConflictingBinding(port));
        }
        self.start(listener)
    }

    fn start(self, listener: TcpListener) -> Result<ServerHandle, ServerError> {
        let addr = listener.local_addr()?;
        let shutdown = ShutdownCoordinator::new();
        let router = self.router();

        let sweep = tokio::spawn(heartbeat::run_sweep(
            self.registry.clone(),
            Duration::from_millis(self.config.heartbeat_interval_ms.max(1)),
            shutdown.token(),
        ));

        let serve_token = shutdown.token();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move { serve_token.cancelled().await })
                .await;
        });

        info!(%addr, path = %self.config.path, "relay server listening");

        Ok(ServerHandle {
            addr,
            registry: self.registry,
            shutdown,
            tasks: vec![server, sweep],
        })
    }
}

/// Handle to a running server — owns the accept loop and heartbeat tasks.
pub struct ServerHandle {
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    shutdown: ShutdownCoordinator,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("addr", &self.addr)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl ServerHandle {
    /// Local address the server is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The connection registry shared with the running server.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Fan an envelope out to every ready connection.
    pub fn broadcast(&self, envelope: &Envelope) -> usize {
        self.registry.broadcast(envelope)
    }

    /// Current connection count.
    pub fn connection_count(&self) -> usize {
        self.registry.count()
    }

    /// Stop the server: terminate live connections, halt the heartbeat
    /// sweep, and drain the accept loop.
    pub async fn shutdown(self) {
        let Self {
            registry,
            shutdown,
            tasks,
            ..
        } = self;
        for conn in registry.snapshot() {
            conn.terminate();
            registry.remove(&conn.id);
        }
        shutdown.graceful_shutdown(tasks, None).await;
    }
}

/// GET on the configured WebSocket path.
async fn ws_route(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let allowlist = state.config.allowed_origins.as_deref();
    if let Err(reason) =
        admission::check_handshake(&headers, allowlist, state.verify_client.as_ref())
    {
        warn!(%reason, "rejected WebSocket handshake");
        return axum::http::StatusCode::FORBIDDEN.into_response();
    }

    ws.max_message_size(state.config.max_payload_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state))
        .into_response()
}

/// Drive one admitted socket until it closes or is terminated.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (conn, rx) = state.registry.register();

    // Capacity is only knowable once the connection is registered, so the
    // ceiling check runs post-accept and closes with "try again later".
    if admission::over_capacity(state.registry.count(), state.config.max_connections) {
        warn!(
            conn_id = %conn.id,
            reason = %admission::RejectReason::AtCapacity,
            "closing connection"
        );
        state.registry.remove(&conn.id);
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: TRY_AGAIN_LATER,
                reason: "try again later".into(),
            })))
            .await;
        return;
    }

    info!(conn_id = %conn.id, "WebSocket client connected");
    if let Some(callback) = &state.on_connection {
        callback(&conn.id);
    }

    let (mut sink, mut stream) = socket.split();

    // Writer: forward queued frames, emit a close frame on termination.
    let writer_cancel = conn.cancel_token();
    let mut writer_rx = rx;
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = writer_rx.recv() => match frame {
                    Some(Outbound::Text(text)) => {
                        if sink.send(Message::Text(text.as_str().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Ping) => {
                        if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                () = writer_cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Reader: decode inbound text, track pongs.
    let reader_conn = conn.clone();
    let reader_cancel = conn.cancel_token();
    let reader_state = state.clone();
    let reader = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => match Envelope::decode(&text) {
                        Ok(envelope) => {
                            if let Some(callback) = &reader_state.on_message {
                                callback(&reader_conn.id, envelope);
                            }
                        }
                        Err(error) => {
                            debug!(conn_id = %reader_conn.id, %error, "dropping malformed frame");
                        }
                    },
                    Some(Ok(Message::Pong(_))) => reader_conn.mark_alive(),
                    Some(Ok(Message::Close(_))) | None => break,
                    // Binary frames are not part of the wire format; pings
                    // are answered by the WebSocket layer itself.
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        debug!(conn_id = %reader_conn.id, %error, "socket error");
                        break;
                    }
                },
                () = reader_cancel.cancelled() => break,
            }
        }
    });

    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    conn.terminate();
    state.registry.remove(&conn.id);
    info!(conn_id = %conn.id, "WebSocket client disconnected");
}

/// GET /health
async fn health_route(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.registry.count()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

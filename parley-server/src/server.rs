//! Chat server core: shared state, history endpoint, WebSocket handler and
//! broadcast.
//!
//! Every text frame a client sends is stamped with the server's clock,
//! appended to the [`HistoryStore`] and broadcast to every connected client,
//! the sender included. That echo is how a client sees its own messages.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parley_proto::codec;
use parley_proto::message::HistoryResponse;
use tokio::sync::{RwLock, mpsc};
use tower_http::cors::CorsLayer;

use crate::store::HistoryStore;

/// Default number of messages returned by the history endpoint.
const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Shared server state holding the connection registry and message store.
pub struct ServerState {
    /// Maps a connection id to a channel sender feeding that socket's writer.
    connections: RwLock<HashMap<u64, mpsc::UnboundedSender<WsMessage>>>,
    /// Source of connection ids.
    next_id: AtomicU64,
    /// Accepted messages in arrival order.
    pub store: HistoryStore,
    /// Number of messages served by the history endpoint.
    history_limit: usize,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    /// Creates a server state with an empty store and default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_HISTORY_LIMIT, HistoryStore::new())
    }

    /// Creates a server state with a custom history limit and store.
    #[must_use]
    pub fn with_config(history_limit: usize, store: HistoryStore) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            store,
            history_limit,
        }
    }

    /// Registers a connection and returns its id.
    pub async fn register(&self, sender: mpsc::UnboundedSender<WsMessage>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.write().await.insert(id, sender);
        id
    }

    /// Removes a connection from the registry.
    pub async fn unregister(&self, id: u64) -> Option<mpsc::UnboundedSender<WsMessage>> {
        self.connections.write().await.remove(&id)
    }

    /// Number of messages `GET /messages` returns.
    #[must_use]
    pub const fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Returns the number of connected clients.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Sends a text frame to every connected client.
    ///
    /// A client whose writer has gone away is unregistered.
    pub async fn broadcast(&self, frame: &str) {
        let mut dead = Vec::new();
        {
            let conns = self.connections.read().await;
            for (id, sender) in conns.iter() {
                if sender.send(WsMessage::Text(frame.into())).is_err() {
                    dead.push(*id);
                }
            }
        }
        for id in dead {
            tracing::warn!(conn_id = id, "broadcast failed, dropping connection");
            self.unregister(id).await;
        }
    }

    /// Send a WebSocket Close frame to all connected clients.
    ///
    /// Each writer forwards the close, which the client observes as a
    /// server-initiated disconnect.
    pub async fn close_all_connections(&self) {
        let conns = self.connections.read().await;
        for (id, sender) in conns.iter() {
            tracing::info!(conn_id = id, "sending close frame to client");
            let _ = sender.send(WsMessage::Close(None));
        }
    }
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Register the connection for broadcast.
/// 2. Forward broadcast frames to the socket from a writer task.
/// 3. Stamp, store and broadcast every valid text frame from the client.
/// 4. On disconnect, unregister.
pub async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let conn_id = state.register(tx).await;
    let total = state.connection_count().await;
    tracing::info!(conn_id, total, "client connected");

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, WsMessage::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn_id, "WebSocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                WsMessage::Text(text) => {
                    handle_text_frame(conn_id, text.as_str(), &reader_state).await;
                }
                WsMessage::Close(_) => {
                    tracing::info!(conn_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore binary, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.unregister(conn_id).await;
    let total = state.connection_count().await;
    tracing::info!(conn_id, total, "client disconnected");
}

/// Handles one text frame from a client.
async fn handle_text_frame(conn_id: u64, text: &str, state: &Arc<ServerState>) {
    let outbound = match codec::decode_outbound(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(conn_id, error = %e, "failed to decode frame");
            return;
        }
    };

    let msg = outbound.stamp(Utc::now());
    if let Err(e) = msg.validate() {
        tracing::warn!(conn_id, error = %e, "rejecting invalid message");
        return;
    }

    let frame = match codec::encode_message(&msg) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(conn_id, error = %e, "failed to encode message for broadcast");
            return;
        }
    };

    let stored = state.store.append(msg).await;
    tracing::debug!(conn_id, stored, "message stored, broadcasting");
    state.broadcast(&frame).await;
}

/// Starts the server on the given address and returns the bound address and
/// a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: impl tokio::net::ToSocketAddrs,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(ServerState::new())).await
}

/// Starts the server with a pre-configured [`ServerState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: impl tokio::net::ToSocketAddrs,
    state: Arc<ServerState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/messages", axum::routing::get(history_handler))
        .route("/ws", axum::routing::get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Serves the newest messages, newest-first.
async fn history_handler(State(state): State<Arc<ServerState>>) -> Json<HistoryResponse> {
    let messages = state.store.newest_first(state.history_limit).await;
    tracing::debug!(count = messages.len(), "serving history");
    Json(HistoryResponse {
        messages: Some(messages),
        error: None,
    })
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

//! Cafeboard WebSocket Board Server
//!
//! Keeps one document per board (last write wins) and pushes the full
//! document to every subscriber after each write.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "subscribe", "board": "shared" }
//! { "type": "unsubscribe", "board": "shared" }
//! { "type": "set", "board": "shared", "state": { "actions": [], "textBoxes": [], "lastUpdated": 0 } }
//! ```
//! The server answers with `snapshot` frames (`state` is `null` for a board
//! that was never written) and `error` frames.

mod state;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use cafeboard_core::BoardState;
use cafeboard_core::protocol::{ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use state::AppState;
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_PORT: u16 = 3030;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cafeboard_server=info,tower_http=info".into()),
        )
        .init();

    let state = Arc::new(match std::env::var("CAFEBOARD_DATA_DIR") {
        Ok(dir) if !dir.is_empty() => {
            info!("Persisting boards to {}", dir);
            AppState::with_data_dir(dir)
        }
        _ => {
            info!("CAFEBOARD_DATA_DIR not set, boards are kept in memory only");
            AppState::new()
        }
    });

    let addr = listen_addr(std::env::var("CAFEBOARD_ADDR").ok().as_deref());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Cafeboard server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router(state)).await
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Parse `CAFEBOARD_ADDR`, falling back to the default on absence or error.
fn listen_addr(value: Option<&str>) -> SocketAddr {
    let default = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT));
    match value {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid CAFEBOARD_ADDR {:?}: {}, using {}", raw, e, default);
            default
        }),
    }
}

/// Index page
async fn index() -> &'static str {
    "Cafeboard Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection board subscriptions. Each one is a task forwarding the
/// board's broadcast into the connection's outbound queue.
struct Subscriptions {
    outbound: mpsc::UnboundedSender<ServerMessage>,
    forwards: HashMap<String, JoinHandle<()>>,
}

impl Subscriptions {
    fn new(outbound: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            outbound,
            forwards: HashMap::new(),
        }
    }

    /// Queue the initial snapshot, then forward later ones.
    fn add(
        &mut self,
        board: String,
        rx: broadcast::Receiver<ServerMessage>,
        initial: Option<BoardState>,
    ) {
        let _ = self.outbound.send(ServerMessage::Snapshot {
            board: board.clone(),
            state: initial,
        });
        let forward = tokio::spawn(forward_snapshots(board.clone(), rx, self.outbound.clone()));
        if let Some(previous) = self.forwards.insert(board, forward) {
            previous.abort();
        }
    }

    fn remove(&mut self, board: &str) -> bool {
        match self.forwards.remove(board) {
            Some(forward) => {
                forward.abort();
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) {
        for (_, forward) in self.forwards.drain() {
            forward.abort();
        }
    }
}

async fn forward_snapshots(
    board: String,
    mut rx: broadcast::Receiver<ServerMessage>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
) {
    loop {
        match rx.recv().await {
            Ok(msg) => {
                if outbound.send(msg).is_err() {
                    break;
                }
            }
            // Every snapshot is the full document, so skipping ahead is safe.
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Subscriber of {} skipped {} snapshots", board, skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Apply one client message. Replies go through `subs.outbound`.
async fn handle_client_message(
    state: &AppState,
    subs: &mut Subscriptions,
    conn_id: &str,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::Subscribe { board } => {
            let (rx, snapshot) = state.subscribe(&board).await;
            info!("Connection {} subscribed to {}", conn_id, board);
            subs.add(board, rx, snapshot);
        }
        ClientMessage::Unsubscribe { board } => {
            if subs.remove(&board) {
                info!("Connection {} unsubscribed from {}", conn_id, board);
            }
        }
        ClientMessage::Set { board, state: document } => {
            state.set(&board, document).await;
        }
    }
}

fn error_message(message: impl Into<String>) -> ServerMessage {
    ServerMessage::Error {
        message: message.into(),
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = Uuid::new_v4().to_string();
    info!("New connection: {}", conn_id);

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let mut subs = Subscriptions::new(out_tx);

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handle_client_message(&state, &mut subs, &conn_id, client_msg).await;
                            }
                            Err(e) => {
                                warn!("Invalid message from {}: {}", conn_id, e);
                                let _ = subs.outbound.send(error_message(format!("Invalid message: {}", e)));
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let _ = subs.outbound.send(error_message("Binary frames are not supported"));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", conn_id, e);
                        break;
                    }
                }
            }

            // Snapshots and replies for this connection
            Some(out) = out_rx.recv() => {
                let json = match serde_json::to_string(&out) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to encode message for {}: {}", conn_id, e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    subs.clear();
    info!("Connection closed: {}", conn_id);
}

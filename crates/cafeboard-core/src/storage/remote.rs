//! WebSocket client store talking to the board relay server.

use super::{
    BoardStore, BoardSubscription, BoxFuture, ConnectionState, StoreError, StoreResult, Subscribers,
    SubscriptionEvent,
};
use crate::board::BoardState;
use crate::protocol::{ClientMessage, ServerMessage};
use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket, connect};
use url::Url;

/// How long `get` waits for the server to answer.
const GET_TIMEOUT: Duration = Duration::from_secs(5);
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Commands sent to the WebSocket thread.
enum WsCommand {
    Send(ClientMessage),
    Close,
}

/// State shared between the store handle and its socket thread.
#[derive(Debug)]
struct Shared {
    state: Mutex<ConnectionState>,
    latest: RwLock<HashMap<String, Option<BoardState>>>,
    subscribers: Subscribers,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Error)
    }

    fn apply_snapshot(&self, board: String, state: Option<BoardState>) {
        self.subscribers
            .send(&board, &SubscriptionEvent::Snapshot(state.clone()));
        if let Ok(mut latest) = self.latest.write() {
            latest.insert(board, state);
        }
    }
}

/// Board store backed by a `cafeboard-server` connection.
///
/// A background thread owns the socket, reconnects with exponential backoff and
/// re-subscribes live boards after every reconnect. `set` only queues the
/// frame; completion order on the server decides which write wins.
pub struct RemoteBoardStore {
    url: String,
    commands: Mutex<Option<Sender<WsCommand>>>,
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteBoardStore {
    /// Connect to a `ws://` or `wss://` server.
    pub fn connect(url: &str) -> StoreResult<Self> {
        let parsed_url =
            Url::parse(url).map_err(|e| StoreError::Connection(format!("Invalid URL: {}", e)))?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(StoreError::Connection(format!(
                "Invalid WebSocket URL scheme: {}",
                parsed_url.scheme()
            )));
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(ConnectionState::Connecting),
            latest: RwLock::new(HashMap::new()),
            subscribers: Subscribers::default(),
        });
        let (cmd_tx, cmd_rx) = channel::<WsCommand>();

        let thread_shared = Arc::clone(&shared);
        let thread_url = url.to_string();
        let handle = thread::Builder::new()
            .name("cafeboard-ws".to_string())
            .spawn(move || run_socket(&thread_url, &cmd_rx, &thread_shared))
            .map_err(|e| StoreError::Io(format!("Failed to spawn socket thread: {}", e)))?;

        Ok(Self {
            url: url.to_string(),
            commands: Mutex::new(Some(cmd_tx)),
            shared,
            thread: Mutex::new(Some(handle)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn send(&self, message: ClientMessage) -> StoreResult<()> {
        let commands = self
            .commands
            .lock()
            .map_err(|e| StoreError::Other(format!("Lock error: {}", e)))?;
        let tx = commands
            .as_ref()
            .ok_or_else(|| StoreError::Connection("Store is closed".to_string()))?;
        tx.send(WsCommand::Send(message))
            .map_err(|_| StoreError::Connection("Socket thread has exited".to_string()))
    }
}

impl BoardStore for RemoteBoardStore {
    fn get(&self, board: &str) -> BoxFuture<'_, StoreResult<Option<BoardState>>> {
        let board = board.to_string();
        Box::pin(async move {
            let cached = self
                .shared
                .latest
                .read()
                .ok()
                .and_then(|latest| latest.get(&board).cloned());
            if let Some(state) = cached {
                return Ok(state);
            }

            // Not cached: subscribe briefly and wait for the server's snapshot.
            let (_tx, mut subscription) = self.shared.subscribers.add(&board)?;
            drop(_tx);
            self.send(ClientMessage::Subscribe {
                board: board.clone(),
            })?;
            let deadline = Instant::now() + GET_TIMEOUT;
            while Instant::now() < deadline {
                for event in subscription.poll() {
                    match event {
                        SubscriptionEvent::Snapshot(state) => return Ok(state),
                        SubscriptionEvent::Failed(reason) => {
                            return Err(StoreError::Connection(reason));
                        }
                    }
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(StoreError::Connection(format!(
                "Timed out waiting for board {}",
                board
            )))
        })
    }

    fn set(&self, board: &str, state: &BoardState) -> BoxFuture<'_, StoreResult<()>> {
        let message = ClientMessage::Set {
            board: board.to_string(),
            state: state.clone(),
        };
        Box::pin(async move {
            if self.shared.state() != ConnectionState::Connected {
                return Err(StoreError::Connection("Not connected".to_string()));
            }
            self.send(message)
        })
    }

    fn subscribe(&self, board: &str) -> StoreResult<BoardSubscription> {
        let (_tx, subscription) = self.shared.subscribers.add(board)?;
        self.send(ClientMessage::Subscribe {
            board: board.to_string(),
        })?;
        Ok(subscription)
    }

    fn close(&self) {
        if let Ok(mut commands) = self.commands.lock() {
            if let Some(tx) = commands.take() {
                let _ = tx.send(WsCommand::Close);
            }
        }
        if let Ok(mut thread) = self.thread.lock() {
            if let Some(handle) = thread.take() {
                if handle.join().is_err() {
                    log::error!("WebSocket thread panicked");
                }
            }
        }
        self.shared.subscribers.clear();
        self.shared.set_state(ConnectionState::Disconnected);
    }

    fn connection_state(&self) -> ConnectionState {
        self.shared.state()
    }
}

impl Drop for RemoteBoardStore {
    fn drop(&mut self) {
        self.close();
    }
}

/// Why a connected session ended.
enum SessionEnd {
    Closed,
    Lost(String),
}

fn run_socket(url: &str, commands: &Receiver<WsCommand>, shared: &Shared) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        shared.set_state(ConnectionState::Connecting);
        log::info!("WebSocket thread: connecting to {}", url);

        let reason = match connect(url) {
            Ok((mut socket, response)) => {
                log::info!("WebSocket connected, status: {}", response.status());
                shared.set_state(ConnectionState::Connected);
                backoff = INITIAL_BACKOFF;
                set_timeouts(&mut socket);

                // Boards subscribed before the (re)connect.
                for board in shared.subscribers.boards() {
                    if let Err(e) = send_message(&mut socket, &ClientMessage::Subscribe { board }) {
                        log::error!("WebSocket resubscribe failed: {}", e);
                    }
                }

                match run_session(&mut socket, commands, shared) {
                    SessionEnd::Closed => {
                        shared.set_state(ConnectionState::Disconnected);
                        log::info!("WebSocket thread exiting");
                        return;
                    }
                    SessionEnd::Lost(reason) => reason,
                }
            }
            Err(e) => format!("Connection failed: {}", e),
        };

        log::warn!("{}; retrying in {:?}", reason, backoff);
        shared.set_state(ConnectionState::Error);
        shared
            .subscribers
            .broadcast(&SubscriptionEvent::Failed(reason));
        if let Ok(mut latest) = shared.latest.write() {
            latest.clear();
        }

        if !wait_for_retry(commands, backoff) {
            shared.set_state(ConnectionState::Disconnected);
            log::info!("WebSocket thread exiting");
            return;
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Sleep out the backoff, dropping frames queued while offline.
///
/// Returns false if the store was closed meanwhile.
fn wait_for_retry(commands: &Receiver<WsCommand>, backoff: Duration) -> bool {
    let deadline = Instant::now() + backoff;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        match commands.recv_timeout(remaining) {
            Ok(WsCommand::Send(message)) => {
                log::debug!("Dropping frame while offline: {:?}", message_kind(&message));
            }
            Ok(WsCommand::Close) | Err(RecvTimeoutError::Disconnected) => return false,
            Err(RecvTimeoutError::Timeout) => return true,
        }
    }
}

fn run_session(
    socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
    commands: &Receiver<WsCommand>,
    shared: &Shared,
) -> SessionEnd {
    loop {
        // Check for commands (non-blocking)
        loop {
            match commands.try_recv() {
                Ok(WsCommand::Send(message)) => {
                    if let Err(e) = send_message(socket, &message) {
                        return SessionEnd::Lost(format!("Send failed: {}", e));
                    }
                }
                Ok(WsCommand::Close) => {
                    log::info!("WebSocket close requested");
                    let _ = socket.close(None);
                    return SessionEnd::Closed;
                }
                Err(TryRecvError::Disconnected) => {
                    log::info!("WebSocket command channel disconnected");
                    let _ = socket.close(None);
                    return SessionEnd::Closed;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        match socket.read() {
            Ok(Message::Text(txt)) => match serde_json::from_str::<ServerMessage>(&txt) {
                Ok(ServerMessage::Snapshot { board, state }) => {
                    log::debug!("Snapshot for {} ({} bytes)", board, txt.len());
                    shared.apply_snapshot(board, state);
                }
                Ok(ServerMessage::Error { message }) => {
                    log::warn!("Server error: {}", message);
                }
                Err(e) => {
                    log::warn!("Failed to parse server message: {}", e);
                }
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                return SessionEnd::Lost("Server closed the connection".to_string());
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return SessionEnd::Lost(format!("Read error: {}", e)),
        }
    }
}

fn send_message(
    socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
    message: &ClientMessage,
) -> Result<(), String> {
    let json = message.to_json().map_err(|e| e.to_string())?;
    log::debug!("WebSocket sending {} ({} bytes)", message_kind(message), json.len());
    socket.send(Message::Text(json)).map_err(|e| e.to_string())
}

fn set_timeouts(socket: &mut WebSocket<MaybeTlsStream<TcpStream>>) {
    match socket.get_mut() {
        MaybeTlsStream::Plain(tcp) => {
            let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
        }
        #[allow(unreachable_patterns)]
        _ => log::debug!("TLS or other stream - using default timeout handling"),
    }
}

fn message_kind(message: &ClientMessage) -> &'static str {
    match message {
        ClientMessage::Subscribe { .. } => "subscribe",
        ClientMessage::Unsubscribe { .. } => "unsubscribe",
        ClientMessage::Set { .. } => "set",
    }
}

//! Board document stores.
//!
//! A store holds one [`BoardState`] per board id, overwritten in full on every
//! `set`, and pushes the whole document to subscribers after each change.

mod file;
mod memory;
mod remote;

pub use file::{FileBoardStore, board_file_name};
pub use memory::MemoryBoardStore;
pub use remote::RemoteBoardStore;

use crate::board::BoardState;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Board not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Store error: {0}")]
    Other(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future for async store operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Connection state of a store's transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Shared document store for board states.
///
/// Writes are full overwrites and the last completed write wins.
pub trait BoardStore: Send + Sync {
    /// Fetch the current state. `None` if the board was never written.
    fn get(&self, board: &str) -> BoxFuture<'_, StoreResult<Option<BoardState>>>;

    /// Overwrite the board with `state`.
    fn set(&self, board: &str, state: &BoardState) -> BoxFuture<'_, StoreResult<()>>;

    /// Start a standing subscription. The current state is delivered first.
    fn subscribe(&self, board: &str) -> StoreResult<BoardSubscription>;

    /// Release the store's resources. Live subscriptions report a failure.
    fn close(&self) {}

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Connected
    }
}

/// Event delivered by a [`BoardSubscription`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// Full state after a change. `None` when the board does not exist.
    Snapshot(Option<BoardState>),
    /// The subscription broke. Later snapshots may follow if the store recovers.
    Failed(String),
}

/// Non-blocking handle on a standing subscription.
#[derive(Debug)]
pub struct BoardSubscription {
    board: String,
    events: Receiver<SubscriptionEvent>,
    closed: bool,
}

impl BoardSubscription {
    pub fn new(board: impl Into<String>, events: Receiver<SubscriptionEvent>) -> Self {
        Self {
            board: board.into(),
            events,
            closed: false,
        }
    }

    pub fn board(&self) -> &str {
        &self.board
    }

    /// True once the producing side went away for good.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Drain pending events without blocking.
    pub fn poll(&mut self) -> Vec<SubscriptionEvent> {
        let mut events = Vec::new();
        if self.closed {
            return events;
        }
        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    events.push(SubscriptionEvent::Failed(format!(
                        "Subscription to {} closed",
                        self.board
                    )));
                    break;
                }
            }
        }
        events
    }
}

/// Fan-out registry of subscription channels, keyed by board id.
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    senders: Mutex<HashMap<String, Vec<Sender<SubscriptionEvent>>>>,
}

impl Subscribers {
    /// Register a new subscriber and return its handle.
    pub(crate) fn add(&self, board: &str) -> StoreResult<(Sender<SubscriptionEvent>, BoardSubscription)> {
        let (tx, rx) = channel();
        let mut senders = self
            .senders
            .lock()
            .map_err(|e| StoreError::Other(format!("Lock error: {}", e)))?;
        senders.entry(board.to_string()).or_default().push(tx.clone());
        Ok((tx, BoardSubscription::new(board, rx)))
    }

    /// Send an event to every subscriber of `board`, dropping dead channels.
    pub(crate) fn send(&self, board: &str, event: &SubscriptionEvent) {
        let Ok(mut senders) = self.senders.lock() else {
            log::error!("Subscriber registry lock poisoned");
            return;
        };
        if let Some(list) = senders.get_mut(board) {
            list.retain(|tx| tx.send(event.clone()).is_ok());
            if list.is_empty() {
                senders.remove(board);
            }
        }
    }

    /// Send an event to every subscriber of every board.
    pub(crate) fn broadcast(&self, event: &SubscriptionEvent) {
        let Ok(mut senders) = self.senders.lock() else {
            log::error!("Subscriber registry lock poisoned");
            return;
        };
        for list in senders.values_mut() {
            list.retain(|tx| tx.send(event.clone()).is_ok());
        }
        senders.retain(|_, list| !list.is_empty());
    }

    /// Boards with at least one subscriber.
    pub(crate) fn boards(&self) -> Vec<String> {
        self.senders
            .lock()
            .map(|senders| senders.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every subscriber; their handles report a closed subscription.
    pub(crate) fn clear(&self) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.clear();
        }
    }
}

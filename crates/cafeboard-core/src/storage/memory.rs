//! In-memory board store.

use super::{BoardStore, BoardSubscription, BoxFuture, StoreError, StoreResult, Subscribers, SubscriptionEvent};
use crate::board::BoardState;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-process store for tests and single-process use.
///
/// Several clients sharing one `Arc<MemoryBoardStore>` behave like clients of
/// a hosted store: every `set` is pushed to every subscriber.
#[derive(Debug, Default)]
pub struct MemoryBoardStore {
    boards: RwLock<HashMap<String, BoardState>>,
    subscribers: Subscribers,
}

impl MemoryBoardStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self, board: &str) -> StoreResult<Option<BoardState>> {
        let boards = self
            .boards
            .read()
            .map_err(|e| StoreError::Other(format!("Lock error: {}", e)))?;
        Ok(boards.get(board).cloned())
    }
}

impl BoardStore for MemoryBoardStore {
    fn get(&self, board: &str) -> BoxFuture<'_, StoreResult<Option<BoardState>>> {
        let board = board.to_string();
        Box::pin(async move { self.current(&board) })
    }

    fn set(&self, board: &str, state: &BoardState) -> BoxFuture<'_, StoreResult<()>> {
        let board = board.to_string();
        let state = state.clone();
        Box::pin(async move {
            {
                let mut boards = self
                    .boards
                    .write()
                    .map_err(|e| StoreError::Other(format!("Lock error: {}", e)))?;
                boards.insert(board.clone(), state.clone());
            }
            self.subscribers
                .send(&board, &SubscriptionEvent::Snapshot(Some(state)));
            Ok(())
        })
    }

    fn subscribe(&self, board: &str) -> StoreResult<BoardSubscription> {
        let (tx, subscription) = self.subscribers.add(board)?;
        let current = self.current(board)?;
        tx.send(SubscriptionEvent::Snapshot(current))
            .map_err(|e| StoreError::Other(format!("Subscription channel closed: {}", e)))?;
        Ok(subscription)
    }

    fn close(&self) {
        self.subscribers.clear();
    }
}

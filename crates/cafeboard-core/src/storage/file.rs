//! JSON file board store.

use super::{BoardStore, BoardSubscription, BoxFuture, StoreError, StoreResult, Subscribers, SubscriptionEvent};
use crate::board::BoardState;
use std::fs;
use std::path::{Path, PathBuf};

/// File name a board is stored under. Characters outside `[A-Za-z0-9_-]`
/// become `_`.
pub fn board_file_name(board: &str) -> String {
    let safe_id: String = board
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}.json", safe_id)
}

/// Stores each board as `<board>.json` in a directory.
///
/// Subscriptions only see writes made through this instance.
#[derive(Debug)]
pub struct FileBoardStore {
    base_path: PathBuf,
    subscribers: Subscribers,
}

impl FileBoardStore {
    /// Create a store rooted at `base_path`, creating the directory if needed.
    pub fn new(base_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StoreError::Io(format!("Failed to create store directory: {}", e))
            })?;
        }
        Ok(Self {
            base_path,
            subscribers: Subscribers::default(),
        })
    }

    /// Default location under the platform data directory.
    ///
    /// On Linux: `~/.local/share/cafeboard/boards/`
    pub fn default_location() -> StoreResult<Self> {
        Self::new(Self::default_path()?)
    }

    pub fn default_path() -> StoreResult<PathBuf> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StoreError::Io("Could not determine home directory".to_string()))?;
        Ok(base.join("cafeboard").join("boards"))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn board_path(&self, board: &str) -> PathBuf {
        self.base_path.join(board_file_name(board))
    }

    fn read(&self, board: &str) -> StoreResult<Option<BoardState>> {
        let path = self.board_path(board);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .map_err(|e| StoreError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        BoardState::from_json(&json).map(Some).map_err(|e| {
            StoreError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    fn write(&self, board: &str, state: &BoardState) -> StoreResult<()> {
        let path = self.board_path(board);
        let json = state
            .to_json_pretty()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        // Write then rename so readers never see a half-written document.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| StoreError::Io(format!("Failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &path)
            .map_err(|e| StoreError::Io(format!("Failed to replace {}: {}", path.display(), e)))
    }
}

impl BoardStore for FileBoardStore {
    fn get(&self, board: &str) -> BoxFuture<'_, StoreResult<Option<BoardState>>> {
        let board = board.to_string();
        Box::pin(async move { self.read(&board) })
    }

    fn set(&self, board: &str, state: &BoardState) -> BoxFuture<'_, StoreResult<()>> {
        let board = board.to_string();
        let state = state.clone();
        Box::pin(async move {
            self.write(&board, &state)?;
            log::debug!("Wrote board {} to {}", board, self.board_path(&board).display());
            self.subscribers
                .send(&board, &SubscriptionEvent::Snapshot(Some(state)));
            Ok(())
        })
    }

    fn subscribe(&self, board: &str) -> StoreResult<BoardSubscription> {
        let current = self.read(board)?;
        let (tx, subscription) = self.subscribers.add(board)?;
        tx.send(SubscriptionEvent::Snapshot(current))
            .map_err(|e| StoreError::Other(format!("Subscription channel closed: {}", e)))?;
        Ok(subscription)
    }

    fn close(&self) {
        self.subscribers.clear();
    }
}

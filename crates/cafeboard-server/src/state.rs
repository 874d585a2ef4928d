//! Board registry shared by all connections.

use cafeboard_core::protocol::ServerMessage;
use cafeboard_core::storage::board_file_name;
use cafeboard_core::{BoardState, now_millis};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};

const CHANNEL_CAPACITY: usize = 256;

/// One board: its latest document and the channel its snapshots go out on.
struct Board {
    tx: broadcast::Sender<ServerMessage>,
    state: Option<BoardState>,
    /// Bumped on every write.
    revision: u64,
    /// Revision of the document on disk. Held across write and rename.
    on_disk: Arc<Mutex<u64>>,
}

impl Board {
    fn new(state: Option<BoardState>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            state,
            revision: 0,
            on_disk: Arc::new(Mutex::new(0)),
        }
    }
}

/// Shared application state
pub struct AppState {
    boards: DashMap<String, Board>,
    data_dir: Option<PathBuf>,
}

impl AppState {
    /// In-memory only.
    pub fn new() -> Self {
        Self {
            boards: DashMap::new(),
            data_dir: None,
        }
    }

    /// Persist every write as `<board>.json` under `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            boards: DashMap::new(),
            data_dir: Some(data_dir.into()),
        }
    }

    pub fn data_dir(&self) -> Option<&PathBuf> {
        self.data_dir.as_ref()
    }

    pub fn board_count(&self) -> usize {
        self.boards.len()
    }

    /// Current document of a board, `None` when it has never been written.
    pub async fn snapshot(&self, board: &str) -> Option<BoardState> {
        self.ensure_loaded(board).await;
        self.boards.get(board).and_then(|b| b.state.clone())
    }

    /// Start receiving snapshots of a board and return its current document.
    ///
    /// Both are taken under the same entry lock, so no write between the two
    /// is missed.
    pub async fn subscribe(
        &self,
        board: &str,
    ) -> (broadcast::Receiver<ServerMessage>, Option<BoardState>) {
        self.ensure_loaded(board).await;
        let entry = self
            .boards
            .entry(board.to_string())
            .or_insert_with(|| Board::new(None));
        (entry.tx.subscribe(), entry.state.clone())
    }

    /// Replace a board's document (last write wins) and broadcast it to every
    /// subscriber, the writer included.
    ///
    /// The snapshot goes out under the entry lock, so subscribers see writes
    /// in the order they were applied.
    pub async fn set(&self, board: &str, mut state: BoardState) -> BoardState {
        self.ensure_loaded(board).await;
        state.last_updated = now_millis();

        let (subscribers, revision, on_disk) = {
            let mut entry = self
                .boards
                .entry(board.to_string())
                .or_insert_with(|| Board::new(None));
            entry.revision += 1;
            entry.state = Some(state.clone());
            let _ = entry.tx.send(ServerMessage::Snapshot {
                board: board.to_string(),
                state: Some(state.clone()),
            });
            (
                entry.tx.receiver_count(),
                entry.revision,
                Arc::clone(&entry.on_disk),
            )
        };

        self.persist(board, revision, &on_disk, &state).await;

        debug!(
            "Board {} updated: {} actions, {} text boxes, {} subscribers",
            board,
            state.actions.len(),
            state.text_boxes.len(),
            subscribers
        );
        state
    }

    async fn ensure_loaded(&self, board: &str) {
        if self.boards.contains_key(board) {
            return;
        }
        let loaded = self.load(board).await;
        self.boards
            .entry(board.to_string())
            .or_insert_with(|| Board::new(loaded));
    }

    async fn load(&self, board: &str) -> Option<BoardState> {
        let path = self.data_dir.as_ref()?.join(board_file_name(board));
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };
        match BoardState::from_json(&json) {
            Ok(state) => {
                info!("Loaded board {} from {}", board, path.display());
                Some(state)
            }
            Err(e) => {
                warn!("Ignoring unreadable board file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write `state` unless a newer revision is already on disk.
    async fn persist(&self, board: &str, revision: u64, on_disk: &Mutex<u64>, state: &BoardState) {
        let Some(dir) = &self.data_dir else {
            return;
        };
        let mut written = on_disk.lock().await;
        if *written >= revision {
            debug!(
                "Skipping write of board {} revision {}, revision {} is on disk",
                board, revision, *written
            );
            return;
        }
        let json = match state.to_json_pretty() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize board {}: {}", board, e);
                return;
            }
        };
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            error!("Failed to create {}: {}", dir.display(), e);
            return;
        }
        let path = dir.join(board_file_name(board));
        let tmp = path.with_extension("json.tmp");
        if let Err(e) = tokio::fs::write(&tmp, json).await {
            error!("Failed to write {}: {}", tmp.display(), e);
            return;
        }
        match tokio::fs::rename(&tmp, &path).await {
            Ok(()) => *written = revision,
            Err(e) => error!("Failed to replace {}: {}", path.display(), e),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

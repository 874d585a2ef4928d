//! Cafeboard Application
//!
//! Session glue for the shared whiteboard: configuration, toolbar commands
//! and the [`BoardSession`] that ties input, sync and rendering together.

mod commands;
mod config;
mod session;

pub use commands::{Command, CommandOutcome, Shortcut, ShortcutRegistry};
pub use config::{ConfigError, ConfigResult, WhiteboardConfig};
pub use session::{BoardSession, SessionError, SessionResult};

use cafeboard_core::{BoardStore, FileBoardStore, RemoteBoardStore, StoreResult};
use std::sync::Arc;

/// Initialise `env_logger`, defaulting to `info`. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// The store a config points at: the board server when `server_url` is set,
/// otherwise JSON files under `data_dir` or the platform data directory.
pub fn open_store(config: &WhiteboardConfig) -> StoreResult<Arc<dyn BoardStore>> {
    if let Some(url) = &config.server_url {
        log::info!("Connecting to board server at {}", url);
        return Ok(Arc::new(RemoteBoardStore::connect(url)?));
    }

    let store = match &config.data_dir {
        Some(dir) => FileBoardStore::new(dir)?,
        None => FileBoardStore::default_location()?,
    };
    log::info!("Using local board store at {}", store.base_path().display());
    Ok(Arc::new(store))
}

/// Open the configured store and subscribe a new session to the board.
pub fn open_session(config: WhiteboardConfig) -> SessionResult<BoardSession> {
    let store = open_store(&config)?;
    let mut session = BoardSession::new(config, store)?;
    session.open()?;
    log::info!("Opened board {}", session.config().board_id);
    Ok(session)
}

//! Messages exchanged with the board relay server.
//!
//! Every frame is a JSON text message tagged by `type`.

use crate::board::BoardState;
use serde::{Deserialize, Serialize};

/// Messages sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving snapshots of a board. The server answers with the
    /// current snapshot right away.
    Subscribe { board: String },
    /// Stop receiving snapshots of a board.
    Unsubscribe { board: String },
    /// Overwrite a board with a full state.
    Set { board: String, state: BoardState },
}

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full board state. `None` when the board has never been written.
    Snapshot {
        board: String,
        state: Option<BoardState>,
    },
    /// Error message
    Error { message: String },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

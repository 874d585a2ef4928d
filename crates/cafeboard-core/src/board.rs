//! The persisted board document.

use crate::action::History;
use crate::text_box::TextBoxes;
use serde::{Deserialize, Serialize};

/// Id of the single board in use.
pub const SHARED_BOARD_ID: &str = "shared";

/// Current wall clock in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Full state of one whiteboard: stroke history, text boxes and the time of
/// the last write.
///
/// Every save transmits the whole document; there are no deltas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardState {
    #[serde(default)]
    pub actions: History,
    #[serde(default)]
    pub text_boxes: TextBoxes,
    #[serde(default)]
    pub last_updated: i64,
}

impl BoardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(actions: History, text_boxes: TextBoxes) -> Self {
        Self {
            actions,
            text_boxes,
            last_updated: 0,
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Compare history and text boxes, ignoring the timestamp.
    pub fn same_content(&self, other: &BoardState) -> bool {
        self.actions == other.actions && self.text_boxes == other.text_boxes
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.text_boxes.is_empty()
    }
}

//! Drawing action log.
//!
//! The ordered list of [`DrawingAction`]s is the only source of truth for the
//! raster strokes on a board. Replaying it onto a blank surface reproduces the
//! canvas exactly.

use kurbo::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// History errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("History is empty")]
    EmptyHistory,
}

/// Path and style of a freehand stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeData {
    pub points: Vec<Point>,
    pub color: String,
    #[serde(rename = "lineWidth")]
    pub width: f64,
}

/// A single entry in a board's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DrawingAction {
    /// A freehand stroke with its own style.
    Stroke { data: StrokeData, timestamp: i64 },
    /// Reset marker written by a clear.
    Clear { timestamp: i64 },
}

impl DrawingAction {
    /// Create a stroke action.
    pub fn stroke(points: Vec<Point>, color: impl Into<String>, width: f64, timestamp: i64) -> Self {
        Self::Stroke {
            data: StrokeData {
                points,
                color: color.into(),
                width,
            },
            timestamp,
        }
    }

    /// Stroke payload, if this is a stroke.
    pub fn as_stroke(&self) -> Option<&StrokeData> {
        match self {
            Self::Stroke { data, .. } => Some(data),
            Self::Clear { .. } => None,
        }
    }

    /// Create a clear marker.
    pub fn clear(timestamp: i64) -> Self {
        Self::Clear { timestamp }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Stroke { timestamp, .. } | Self::Clear { timestamp } => *timestamp,
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, Self::Clear { .. })
    }
}

/// One polyline produced by replaying a stroke.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterInstruction<'a> {
    pub points: &'a [Point],
    pub color: &'a str,
    pub width: f64,
}

/// Ordered sequence of drawing actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<DrawingAction>);

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh history holding a single clear marker.
    ///
    /// Clearing is a hard reset, not an append: every earlier action is dropped.
    pub fn cleared(timestamp: i64) -> Self {
        Self(vec![DrawingAction::clear(timestamp)])
    }

    /// Append an action, returning the extended history.
    #[must_use]
    pub fn append(mut self, action: DrawingAction) -> Self {
        self.0.push(action);
        self
    }

    /// Append an action in place.
    pub fn push(&mut self, action: DrawingAction) {
        self.0.push(action);
    }

    /// Remove exactly the last action.
    pub fn undo(&mut self) -> Result<DrawingAction, HistoryError> {
        self.0.pop().ok_or(HistoryError::EmptyHistory)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&DrawingAction> {
        self.0.last()
    }

    pub fn actions(&self) -> &[DrawingAction] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &DrawingAction> {
        self.0.iter()
    }

    /// Walk the history in order and emit one polyline per stroke.
    ///
    /// Each stroke keeps the color and width it was drawn with. Clear markers
    /// produce nothing here: the surface is always reset before a replay, so a
    /// clear in the middle of the log does not hide the strokes before it.
    pub fn replay(&self) -> Vec<RasterInstruction<'_>> {
        self.0
            .iter()
            .filter_map(DrawingAction::as_stroke)
            .filter(|stroke| !stroke.points.is_empty())
            .map(|stroke| RasterInstruction {
                points: &stroke.points,
                color: &stroke.color,
                width: stroke.width,
            })
            .collect()
    }
}

impl From<Vec<DrawingAction>> for History {
    fn from(actions: Vec<DrawingAction>) -> Self {
        Self(actions)
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a DrawingAction;
    type IntoIter = std::slice::Iter<'a, DrawingAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

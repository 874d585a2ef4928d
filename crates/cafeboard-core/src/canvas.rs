//! Local whiteboard state.
//!
//! [`Whiteboard`] owns the board document as the render source of truth along
//! with the tool settings and the input controller. Every mutating method
//! reports how the change must be saved; the caller hands that to the
//! [`SyncCoordinator`](crate::collaboration::SyncCoordinator).

use crate::action::History;
use crate::board::{BoardState, now_millis};
use crate::collaboration::SaveKind;
use crate::input::{CommitReason, InputController, InputOutcome, PointerEvent, TextCommit};
use crate::text_box::{TextBox, TextBoxes};
use crate::text_metrics::{ApproximateMeasure, TextMeasure};
use crate::tools::{ToolMode, ToolSettings};
use kurbo::Point;
use std::sync::Arc;

/// Where new text boxes are placed.
pub const DEFAULT_TEXT_ORIGIN: Point = Point::new(50.0, 50.0);

/// Outcome of a pointer event together with the save it requires.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerResult {
    pub outcome: InputOutcome,
    pub save: Option<SaveKind>,
}

/// Client-side whiteboard.
pub struct Whiteboard {
    board: BoardState,
    tools: ToolSettings,
    input: InputController,
    measure: Arc<dyn TextMeasure + Send + Sync>,
    text_origin: Point,
}

impl Default for Whiteboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Whiteboard {
    /// Create an empty board with default tools.
    pub fn new() -> Self {
        Self {
            board: BoardState::default(),
            tools: ToolSettings::default(),
            input: InputController::new(),
            measure: Arc::new(ApproximateMeasure::default()),
            text_origin: DEFAULT_TEXT_ORIGIN,
        }
    }

    /// Measure text with `measure` for hit testing.
    pub fn with_measure(mut self, measure: Arc<dyn TextMeasure + Send + Sync>) -> Self {
        self.measure = measure;
        self
    }

    /// Place new text boxes at `origin`.
    pub fn with_text_origin(mut self, origin: Point) -> Self {
        self.text_origin = origin;
        self
    }

    pub fn board(&self) -> &BoardState {
        &self.board
    }

    pub fn history(&self) -> &History {
        &self.board.actions
    }

    pub fn text_boxes(&self) -> &TextBoxes {
        &self.board.text_boxes
    }

    pub fn tools(&self) -> &ToolSettings {
        &self.tools
    }

    pub fn input(&self) -> &InputController {
        &self.input
    }

    pub fn measure(&self) -> &dyn TextMeasure {
        self.measure.as_ref()
    }

    pub fn selected(&self) -> Option<&str> {
        self.input.selected()
    }

    pub fn selected_box(&self) -> Option<&TextBox> {
        self.selected().and_then(|id| self.board.text_boxes.get(id))
    }

    /// Undo is available.
    pub fn can_undo(&self) -> bool {
        !self.board.actions.is_empty()
    }

    /// Delete-selected is available.
    pub fn has_selection(&self) -> bool {
        self.selected_box().is_some()
    }

    // --- Tools ---

    pub fn set_mode(&mut self, mode: ToolMode) -> bool {
        self.input.set_mode(&mut self.tools, mode)
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        self.tools.set_color(color);
    }

    pub fn set_stroke_width(&mut self, width: f64) {
        self.tools.set_stroke_width(width);
    }

    pub fn set_font_size(&mut self, size: f64) {
        self.tools.set_font_size(size);
    }

    // --- Pointer ---

    /// Feed a pointer event, appending finished strokes to the history.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> PointerResult {
        let outcome = self.input.handle_pointer(
            event,
            &self.tools,
            &mut self.board.text_boxes,
            self.measure.as_ref(),
            now_millis(),
        );

        let save = match &outcome {
            InputOutcome::StrokeCommitted(action) => {
                self.board.actions.push(action.clone());
                Some(SaveKind::Throttled)
            }
            InputOutcome::DragCommitted { .. } => Some(SaveKind::Immediate),
            _ => None,
        };
        PointerResult { outcome, save }
    }

    // --- Commands ---

    /// Remove the last action. `None` when the history is empty.
    pub fn undo(&mut self) -> Option<SaveKind> {
        match self.board.actions.undo() {
            Ok(action) => {
                log::debug!("Undid action from {}", action.timestamp());
                Some(SaveKind::Immediate)
            }
            Err(_) => None,
        }
    }

    /// Reset to a single clear marker and remove every text box.
    pub fn clear(&mut self) -> SaveKind {
        self.board.actions = History::cleared(now_millis());
        self.board.text_boxes.clear();
        self.input.reset();
        SaveKind::Immediate
    }

    /// Remove the selected text box. `None` without a selection.
    pub fn delete_selected(&mut self) -> Option<SaveKind> {
        let id = self.input.selected()?.to_string();
        self.input.clear_selection();
        self.board.text_boxes.remove(&id)?;
        self.input.retain_known(&self.board.text_boxes);
        Some(SaveKind::Immediate)
    }

    // --- Text entry ---

    /// Open an editing session on an existing box.
    pub fn begin_edit(&mut self, id: &str) -> bool {
        self.input.begin_edit(&self.board.text_boxes, id)
    }

    pub fn set_text_buffer(&mut self, text: impl Into<String>) {
        self.input.set_text_buffer(text);
    }

    pub fn cancel_text(&mut self) -> bool {
        self.input.cancel_text()
    }

    /// Finish the open text session.
    pub fn commit_text(&mut self, reason: CommitReason) -> (TextCommit, Option<SaveKind>) {
        let commit = self.input.commit_text(
            reason,
            &self.tools,
            &mut self.board.text_boxes,
            self.text_origin,
        );
        let save = commit.is_mutation().then_some(SaveKind::Immediate);
        (commit, save)
    }

    // --- Remote ---

    /// Replace history and text boxes with a remote snapshot.
    ///
    /// Returns true if the visible content changed. A stroke in progress is
    /// kept and lands on top of the new history when it is committed.
    pub fn replace_state(&mut self, state: BoardState) -> bool {
        let changed = !self.board.same_content(&state);
        self.board = state;
        let selection_dropped = self.input.retain_known(&self.board.text_boxes);
        changed || selection_dropped
    }
}

//! Pointer gesture state machine.
//!
//! Turns pointer events into candidate board mutations. In draw mode a
//! down/move/up sequence collects a stroke; in text mode a press either grabs an
//! existing text box (select + drag) or opens a composing session for a new one.
//! Text entry itself arrives through [`InputController::set_text_buffer`] and is
//! finished by [`InputController::commit_text`].

use crate::action::DrawingAction;
use crate::text_box::{TextBox, TextBoxes};
use crate::text_metrics::{TextMeasure, hit_test};
use crate::tools::{ToolMode, ToolSettings};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Pointer event in canvas-local pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointerEvent {
    Down { position: Point },
    Move { position: Point },
    Up { position: Point },
    /// Pointer left the canvas.
    Leave,
}

/// A text box being moved.
#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub id: String,
    /// Pointer position when the drag began.
    pub start: Point,
    /// Box position when the drag began.
    pub original: Point,
}

impl DragSession {
    /// Box position for the current pointer location.
    pub fn position_for(&self, pointer: Point) -> Point {
        self.original + (pointer - self.start)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
enum Gesture {
    #[default]
    Idle,
    Drawing {
        points: Vec<Point>,
    },
    Dragging(DragSession),
}

/// What a text session will write when committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextTarget {
    /// A box that does not exist yet.
    New(String),
    /// Replace the text of an existing box.
    Existing(String),
}

/// Open text entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSession {
    pub target: TextTarget,
    pub buffer: String,
}

/// Why a text session is being committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitReason {
    /// Explicit confirm, e.g. Enter.
    Confirm,
    /// The text field lost focus.
    Blur,
}

/// Result of committing a text session.
#[derive(Debug, Clone, PartialEq)]
pub enum TextCommit {
    /// A new box was appended.
    Created(TextBox),
    /// An existing box got new text.
    Edited { id: String, text: String },
    /// The session was closed without changes.
    Discarded,
    /// Nothing happened; the session is still open or none was open.
    Ignored,
}

impl TextCommit {
    /// Whether the board changed and must be saved.
    pub fn is_mutation(&self) -> bool {
        matches!(self, TextCommit::Created(_) | TextCommit::Edited { .. })
    }
}

/// Result of feeding one pointer event.
#[derive(Debug, Clone, PartialEq)]
pub enum InputOutcome {
    None,
    StrokeStarted(Point),
    /// Incremental preview segment of the stroke in progress.
    Segment { from: Point, to: Point },
    /// A finished stroke, ready to append to the history.
    StrokeCommitted(DrawingAction),
    /// A text box was selected and grabbed.
    Selected(String),
    /// The grabbed box moved locally.
    DragMoved { id: String, position: Point },
    /// The drag ended; the box's final position must be saved.
    DragCommitted { id: String, position: Point },
    /// A composing session for a new box was opened.
    ComposeStarted(String),
}

/// Pointer gesture and text entry state for one client.
///
/// None of this state is persisted.
#[derive(Debug, Clone, Default)]
pub struct InputController {
    gesture: Gesture,
    text: Option<TextSession>,
    selected: Option<String>,
}

impl InputController {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a stroke or drag is in progress.
    pub fn is_busy(&self) -> bool {
        !matches!(self.gesture, Gesture::Idle)
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.gesture, Gesture::Drawing { .. })
    }

    /// Points of the stroke in progress.
    pub fn stroke_points(&self) -> &[Point] {
        match &self.gesture {
            Gesture::Drawing { points } => points,
            _ => &[],
        }
    }

    pub fn drag(&self) -> Option<&DragSession> {
        match &self.gesture {
            Gesture::Dragging(drag) => Some(drag),
            _ => None,
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn text_session(&self) -> Option<&TextSession> {
        self.text.as_ref()
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Switch tools. Ignored while a gesture is in progress.
    pub fn set_mode(&mut self, tools: &mut ToolSettings, mode: ToolMode) -> bool {
        if self.is_busy() {
            log::debug!("Ignoring mode switch to {} during a gesture", mode.name());
            return false;
        }
        tools.set_mode(mode);
        true
    }

    /// Feed one pointer event.
    ///
    /// Drags move boxes in `boxes` directly; strokes are returned for the caller
    /// to append.
    pub fn handle_pointer(
        &mut self,
        event: PointerEvent,
        tools: &ToolSettings,
        boxes: &mut TextBoxes,
        measure: &dyn TextMeasure,
        now: i64,
    ) -> InputOutcome {
        match event {
            PointerEvent::Down { position } => self.pointer_down(position, tools, boxes, measure),
            PointerEvent::Move { position } => self.pointer_move(position, boxes),
            PointerEvent::Up { .. } | PointerEvent::Leave => self.pointer_up(tools, boxes, now),
        }
    }

    fn pointer_down(
        &mut self,
        position: Point,
        tools: &ToolSettings,
        boxes: &TextBoxes,
        measure: &dyn TextMeasure,
    ) -> InputOutcome {
        if self.is_busy() {
            return InputOutcome::None;
        }

        match tools.mode() {
            ToolMode::Draw => {
                self.gesture = Gesture::Drawing {
                    points: vec![position],
                };
                InputOutcome::StrokeStarted(position)
            }
            ToolMode::Text => match hit_test(measure, boxes, position) {
                Some(hit) => {
                    let id = hit.id.clone();
                    self.selected = Some(id.clone());
                    self.gesture = Gesture::Dragging(DragSession {
                        id: id.clone(),
                        start: position,
                        original: hit.position(),
                    });
                    InputOutcome::Selected(id)
                }
                None => {
                    let id = new_text_box_id();
                    self.selected = None;
                    self.text = Some(TextSession {
                        target: TextTarget::New(id.clone()),
                        buffer: String::new(),
                    });
                    InputOutcome::ComposeStarted(id)
                }
            },
        }
    }

    fn pointer_move(&mut self, position: Point, boxes: &mut TextBoxes) -> InputOutcome {
        match &mut self.gesture {
            Gesture::Drawing { points } => {
                let from = points.last().copied().unwrap_or(position);
                points.push(position);
                InputOutcome::Segment { from, to: position }
            }
            Gesture::Dragging(drag) => {
                let target = drag.position_for(position);
                if boxes.move_to(&drag.id, target) {
                    InputOutcome::DragMoved {
                        id: drag.id.clone(),
                        position: target,
                    }
                } else {
                    // The box vanished under us (remote delete).
                    self.gesture = Gesture::Idle;
                    InputOutcome::None
                }
            }
            Gesture::Idle => InputOutcome::None,
        }
    }

    fn pointer_up(&mut self, tools: &ToolSettings, boxes: &TextBoxes, now: i64) -> InputOutcome {
        match std::mem::take(&mut self.gesture) {
            Gesture::Drawing { points } if !points.is_empty() => InputOutcome::StrokeCommitted(
                DrawingAction::stroke(points, tools.color(), tools.stroke_width(), now),
            ),
            Gesture::Dragging(drag) => match boxes.get(&drag.id) {
                Some(text_box) => InputOutcome::DragCommitted {
                    id: drag.id,
                    position: text_box.position(),
                },
                None => InputOutcome::None,
            },
            Gesture::Drawing { .. } | Gesture::Idle => InputOutcome::None,
        }
    }

    /// Open an editing session for an existing box, seeded with its text.
    pub fn begin_edit(&mut self, boxes: &TextBoxes, id: &str) -> bool {
        match boxes.get(id) {
            Some(text_box) => {
                self.selected = Some(id.to_string());
                self.text = Some(TextSession {
                    target: TextTarget::Existing(id.to_string()),
                    buffer: text_box.text.clone(),
                });
                true
            }
            None => false,
        }
    }

    /// Replace the contents of the open text session.
    pub fn set_text_buffer(&mut self, text: impl Into<String>) {
        if let Some(session) = &mut self.text {
            session.buffer = text.into();
        }
    }

    /// Drop the open text session without changes.
    pub fn cancel_text(&mut self) -> bool {
        self.text.take().is_some()
    }

    /// Finish the open text session.
    ///
    /// Blank text is ignored on confirm (the session stays open) and discards
    /// the session on blur. A new box is placed at `origin` regardless of where
    /// the composing click happened, using the current tool font size and color.
    pub fn commit_text(
        &mut self,
        reason: CommitReason,
        tools: &ToolSettings,
        boxes: &mut TextBoxes,
        origin: Point,
    ) -> TextCommit {
        let Some(session) = &self.text else {
            return TextCommit::Ignored;
        };

        if session.buffer.trim().is_empty() {
            return match reason {
                CommitReason::Confirm => TextCommit::Ignored,
                CommitReason::Blur => {
                    self.text = None;
                    TextCommit::Discarded
                }
            };
        }

        let Some(session) = self.text.take() else {
            return TextCommit::Ignored;
        };
        match session.target {
            TextTarget::New(id) => {
                let text_box =
                    TextBox::new(id, origin, session.buffer, tools.font_size(), tools.color());
                boxes.insert(text_box.clone());
                TextCommit::Created(text_box)
            }
            TextTarget::Existing(id) => {
                if boxes.set_text(&id, session.buffer.clone()) {
                    TextCommit::Edited {
                        id,
                        text: session.buffer,
                    }
                } else {
                    log::debug!("Text box {} no longer exists, dropping edit", id);
                    TextCommit::Discarded
                }
            }
        }
    }

    /// Forget any state that refers to boxes no longer in `boxes`.
    ///
    /// Returns true if the selection was dropped.
    pub fn retain_known(&mut self, boxes: &TextBoxes) -> bool {
        if let Gesture::Dragging(drag) = &self.gesture {
            if !boxes.contains(&drag.id) {
                self.gesture = Gesture::Idle;
            }
        }
        if let Some(TextSession {
            target: TextTarget::Existing(id),
            ..
        }) = &self.text
        {
            if !boxes.contains(id) {
                self.text = None;
            }
        }
        match &self.selected {
            Some(id) if !boxes.contains(id) => {
                self.selected = None;
                true
            }
            _ => false,
        }
    }

    /// Abandon any gesture and text session and clear the selection.
    pub fn reset(&mut self) {
        self.gesture = Gesture::Idle;
        self.text = None;
        self.selected = None;
    }
}

fn new_text_box_id() -> String {
    format!("text-{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text_metrics::ApproximateMeasure;

    const ORIGIN: Point = Point::new(50.0, 50.0);

    fn down(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Down {
            position: Point::new(x, y),
        }
    }

    fn mv(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Move {
            position: Point::new(x, y),
        }
    }

    fn up(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Up {
            position: Point::new(x, y),
        }
    }

    fn text_tools() -> ToolSettings {
        let mut tools = ToolSettings::default();
        tools.set_mode(ToolMode::Text);
        tools
    }

    fn boxes() -> TextBoxes {
        TextBoxes::from(vec![
            TextBox::new("a", Point::new(100.0, 100.0), "Coffee", 20.0, "#000000"),
            TextBox::new("b", Point::new(300.0, 300.0), "Tea", 20.0, "#000000"),
        ])
    }

    #[test]
    fn test_stroke_collects_points() {
        let mut input = InputController::new();
        let mut tools = ToolSettings::default();
        tools.set_color("#ff0000");
        tools.set_stroke_width(3.0);
        let mut boxes = TextBoxes::new();
        let m = ApproximateMeasure::default();

        input.handle_pointer(down(10.0, 10.0), &tools, &mut boxes, &m, 0);
        let seg = input.handle_pointer(mv(20.0, 20.0), &tools, &mut boxes, &m, 0);
        assert_eq!(
            seg,
            InputOutcome::Segment {
                from: Point::new(10.0, 10.0),
                to: Point::new(20.0, 20.0)
            }
        );
        input.handle_pointer(mv(30.0, 10.0), &tools, &mut boxes, &m, 0);
        let outcome = input.handle_pointer(up(30.0, 10.0), &tools, &mut boxes, &m, 77);

        let expected = DrawingAction::stroke(
            vec![Point::new(10.0, 10.0), Point::new(20.0, 20.0), Point::new(30.0, 10.0)],
            "#ff0000",
            3.0,
            77,
        );
        assert_eq!(outcome, InputOutcome::StrokeCommitted(expected));
        assert!(!input.is_busy());
        assert!(input.stroke_points().is_empty());
    }

    #[test]
    fn test_single_point_stroke_commits_on_leave() {
        let mut input = InputController::new();
        let tools = ToolSettings::default();
        let mut boxes = TextBoxes::new();
        let m = ApproximateMeasure::default();

        input.handle_pointer(down(5.0, 5.0), &tools, &mut boxes, &m, 0);
        let outcome = input.handle_pointer(PointerEvent::Leave, &tools, &mut boxes, &m, 1);

        match outcome {
            InputOutcome::StrokeCommitted(action) => {
                assert_eq!(action.as_stroke().unwrap().points.len(), 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_move_without_gesture_is_noop() {
        let mut input = InputController::new();
        let tools = ToolSettings::default();
        let mut boxes = TextBoxes::new();
        let m = ApproximateMeasure::default();

        assert_eq!(
            input.handle_pointer(mv(1.0, 1.0), &tools, &mut boxes, &m, 0),
            InputOutcome::None
        );
        assert_eq!(
            input.handle_pointer(up(1.0, 1.0), &tools, &mut boxes, &m, 0),
            InputOutcome::None
        );
    }

    #[test]
    fn test_mode_switch_blocked_during_stroke() {
        let mut input = InputController::new();
        let mut tools = ToolSettings::default();
        let mut boxes = TextBoxes::new();
        let m = ApproximateMeasure::default();

        input.handle_pointer(down(0.0, 0.0), &tools, &mut boxes, &m, 0);
        assert!(!input.set_mode(&mut tools, ToolMode::Text));
        assert_eq!(tools.mode(), ToolMode::Draw);

        input.handle_pointer(up(0.0, 0.0), &tools, &mut boxes, &m, 0);
        assert!(input.set_mode(&mut tools, ToolMode::Text));
        assert_eq!(tools.mode(), ToolMode::Text);
    }

    #[test]
    fn test_drag_commit_moves_only_target() {
        let mut input = InputController::new();
        let tools = text_tools();
        let mut boxes = boxes();
        let m = ApproximateMeasure::default();

        let outcome = input.handle_pointer(down(105.0, 105.0), &tools, &mut boxes, &m, 0);
        assert_eq!(outcome, InputOutcome::Selected("a".to_string()));
        assert_eq!(input.selected(), Some("a"));

        input.handle_pointer(mv(115.0, 120.0), &tools, &mut boxes, &m, 0);
        input.handle_pointer(mv(130.0, 145.0), &tools, &mut boxes, &m, 0);
        let outcome = input.handle_pointer(up(130.0, 145.0), &tools, &mut boxes, &m, 0);

        assert_eq!(
            outcome,
            InputOutcome::DragCommitted {
                id: "a".to_string(),
                position: Point::new(125.0, 140.0)
            }
        );
        assert_eq!(boxes.get("a").unwrap().position(), Point::new(125.0, 140.0));
        assert_eq!(boxes.get("b").unwrap().position(), Point::new(300.0, 300.0));
        // Selection survives the drag.
        assert_eq!(input.selected(), Some("a"));
    }

    #[test]
    fn test_miss_starts_composing_and_clears_selection() {
        let mut input = InputController::new();
        let tools = text_tools();
        let mut boxes = boxes();
        let m = ApproximateMeasure::default();

        input.handle_pointer(down(105.0, 105.0), &tools, &mut boxes, &m, 0);
        input.handle_pointer(up(105.0, 105.0), &tools, &mut boxes, &m, 0);
        assert_eq!(input.selected(), Some("a"));

        let outcome = input.handle_pointer(down(600.0, 10.0), &tools, &mut boxes, &m, 0);
        assert!(matches!(outcome, InputOutcome::ComposeStarted(_)));
        assert_eq!(input.selected(), None);
        assert!(matches!(
            input.text_session().map(|s| &s.target),
            Some(TextTarget::New(_))
        ));
    }

    #[test]
    fn test_new_text_placed_at_default_origin() {
        let mut input = InputController::new();
        let mut tools = text_tools();
        tools.set_font_size(32.0);
        tools.set_color("#336699");
        let mut boxes = TextBoxes::new();
        let m = ApproximateMeasure::default();

        input.handle_pointer(down(400.0, 300.0), &tools, &mut boxes, &m, 0);
        input.set_text_buffer("Hello");
        let commit = input.commit_text(CommitReason::Confirm, &tools, &mut boxes, ORIGIN);

        let TextCommit::Created(created) = commit else {
            panic!("expected a created box");
        };
        assert_eq!(created.position(), ORIGIN);
        assert_eq!(created.font_size, 32.0);
        assert_eq!(created.color, "#336699");
        assert_eq!(boxes.len(), 1);
        assert!(input.text_session().is_none());
    }

    #[test]
    fn test_blank_confirm_keeps_session() {
        let mut input = InputController::new();
        let tools = text_tools();
        let mut boxes = TextBoxes::new();
        let m = ApproximateMeasure::default();

        input.handle_pointer(down(400.0, 300.0), &tools, &mut boxes, &m, 0);
        input.set_text_buffer("   ");
        assert_eq!(
            input.commit_text(CommitReason::Confirm, &tools, &mut boxes, ORIGIN),
            TextCommit::Ignored
        );
        assert!(input.text_session().is_some());

        assert_eq!(
            input.commit_text(CommitReason::Blur, &tools, &mut boxes, ORIGIN),
            TextCommit::Discarded
        );
        assert!(input.text_session().is_none());
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_edit_replaces_only_text() {
        let mut input = InputController::new();
        let tools = text_tools();
        let mut boxes = boxes();

        assert!(input.begin_edit(&boxes, "a"));
        assert_eq!(input.text_session().unwrap().buffer, "Coffee");
        input.set_text_buffer("Coffee beans");
        let commit = input.commit_text(CommitReason::Blur, &tools, &mut boxes, ORIGIN);

        assert_eq!(
            commit,
            TextCommit::Edited {
                id: "a".to_string(),
                text: "Coffee beans".to_string()
            }
        );
        let edited = boxes.get("a").unwrap();
        assert_eq!(edited.text, "Coffee beans");
        assert_eq!(edited.position(), Point::new(100.0, 100.0));
    }

    #[test]
    fn test_cancel_text() {
        let mut input = InputController::new();
        let tools = text_tools();
        let mut boxes = boxes();

        input.begin_edit(&boxes, "b");
        input.set_text_buffer("Changed");
        assert!(input.cancel_text());
        assert!(!input.cancel_text());
        assert_eq!(
            input.commit_text(CommitReason::Confirm, &tools, &mut boxes, ORIGIN),
            TextCommit::Ignored
        );
        assert_eq!(boxes.get("b").unwrap().text, "Tea");
    }

    #[test]
    fn test_retain_known_drops_stale_selection() {
        let mut input = InputController::new();
        let tools = text_tools();
        let mut boxes = boxes();
        let m = ApproximateMeasure::default();

        input.handle_pointer(down(105.0, 105.0), &tools, &mut boxes, &m, 0);
        boxes.remove("a");

        assert!(input.retain_known(&boxes));
        assert_eq!(input.selected(), None);
        assert!(!input.is_busy());
    }
}

//! Renderer trait abstraction.

use cafeboard_core::action::History;
use cafeboard_core::text_box::TextBoxes;
use kurbo::Point;
use peniko::Color;
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid surface size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Font error: {0}")]
    Font(String),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Everything one frame is drawn from.
pub struct RenderContext<'a> {
    pub history: &'a History,
    pub text_boxes: &'a TextBoxes,
    /// Id of the selected text box, if any.
    pub selected: Option<&'a str>,
    /// Surface size in pixels.
    pub width: u32,
    pub height: u32,
    pub background_color: Color,
    /// Selection outline color.
    pub selection_color: Color,
    pub selection_width: f64,
}

impl<'a> RenderContext<'a> {
    /// Create a new render context.
    pub fn new(history: &'a History, text_boxes: &'a TextBoxes, width: u32, height: u32) -> Self {
        Self {
            history,
            text_boxes,
            selected: None,
            width,
            height,
            background_color: Color::from_rgba8(255, 255, 255, 255),
            selection_color: Color::from_rgba8(0, 0, 255, 255),
            selection_width: 2.0,
        }
    }

    /// Highlight the text box with this id.
    pub fn with_selection(mut self, selected: Option<&'a str>) -> Self {
        self.selected = selected;
        self
    }

    /// Set the background color.
    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    /// Set the selection outline color.
    pub fn with_selection_color(mut self, color: Color) -> Self {
        self.selection_color = color;
        self
    }
}

/// Trait for rendering backends.
pub trait Renderer: Send + Sync {
    /// Redraw the whole surface from the context.
    ///
    /// Output depends only on the context: rendering the same inputs twice
    /// gives identical pixels.
    fn render(&mut self, ctx: &RenderContext) -> RenderResult<()>;

    /// Draw one segment of a stroke in progress on top of the current pixels.
    fn draw_segment(&mut self, from: Point, to: Point, color: &str, width: f64);

    /// Get the background color (for clearing).
    fn background_color(&self, ctx: &RenderContext) -> Color {
        ctx.background_color
    }
}

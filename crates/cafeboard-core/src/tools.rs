//! Tool configuration.

use serde::{Deserialize, Serialize};

pub const DEFAULT_COLOR: &str = "#000000";
pub const DEFAULT_STROKE_WIDTH: f64 = 3.0;
pub const MIN_STROKE_WIDTH: f64 = 1.0;
pub const MAX_STROKE_WIDTH: f64 = 50.0;
pub const DEFAULT_FONT_SIZE: f64 = 20.0;
pub const MIN_FONT_SIZE: f64 = 8.0;
pub const MAX_FONT_SIZE: f64 = 100.0;

/// Active pointer tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    #[default]
    Draw,
    Text,
}

impl ToolMode {
    pub fn name(&self) -> &'static str {
        match self {
            ToolMode::Draw => "Draw",
            ToolMode::Text => "Text",
        }
    }
}

/// Style applied to new strokes and new text boxes.
///
/// Changing these never touches anything already on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    mode: ToolMode,
    color: String,
    stroke_width: f64,
    font_size: f64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            mode: ToolMode::Draw,
            color: DEFAULT_COLOR.to_string(),
            stroke_width: DEFAULT_STROKE_WIDTH,
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

impl ToolSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ToolMode {
        self.mode
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn stroke_width(&self) -> f64 {
        self.stroke_width
    }

    pub fn font_size(&self) -> f64 {
        self.font_size
    }

    pub fn set_mode(&mut self, mode: ToolMode) {
        self.mode = mode;
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        self.color = color.into();
    }

    /// Set the stroke width, clamped to 1..=50.
    pub fn set_stroke_width(&mut self, width: f64) {
        self.stroke_width = clamp_or(width, MIN_STROKE_WIDTH, MAX_STROKE_WIDTH, DEFAULT_STROKE_WIDTH);
    }

    /// Set the font size, clamped to 8..=100.
    pub fn set_font_size(&mut self, size: f64) {
        self.font_size = clamp_or(size, MIN_FONT_SIZE, MAX_FONT_SIZE, DEFAULT_FONT_SIZE);
    }
}

fn clamp_or(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

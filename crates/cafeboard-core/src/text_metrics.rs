//! Text measurement and text box hit testing.

use crate::text_box::TextBox;
use kurbo::{Point, Rect};

/// Padding around a text box used by both hit testing and the selection outline.
pub const TEXT_BOX_MARGIN: f64 = 2.0;

/// Measures the advance width of a single line of text.
pub trait TextMeasure {
    fn text_width(&self, text: &str, font_size: f64) -> f64;
}

/// Character-count estimate used when no font is loaded.
#[derive(Debug, Clone, Copy)]
pub struct ApproximateMeasure {
    /// Average glyph advance as a fraction of the font size.
    pub char_width_factor: f64,
}

impl Default for ApproximateMeasure {
    fn default() -> Self {
        Self {
            char_width_factor: 0.55,
        }
    }
}

impl TextMeasure for ApproximateMeasure {
    fn text_width(&self, text: &str, font_size: f64) -> f64 {
        text.chars().count() as f64 * font_size * self.char_width_factor
    }
}

/// Unpadded extent of a text box: measured width, height equal to the font size.
pub fn text_extent(measure: &dyn TextMeasure, text_box: &TextBox) -> Rect {
    let width = measure.text_width(&text_box.text, text_box.font_size);
    Rect::new(
        text_box.x,
        text_box.y,
        text_box.x + width,
        text_box.y + text_box.font_size,
    )
}

/// Extent inflated by [`TEXT_BOX_MARGIN`] on every side.
pub fn padded_extent(measure: &dyn TextMeasure, text_box: &TextBox) -> Rect {
    text_extent(measure, text_box).inflate(TEXT_BOX_MARGIN, TEXT_BOX_MARGIN)
}

/// First box, in collection order, whose padded extent contains `point`.
pub fn hit_test<'a, I>(measure: &dyn TextMeasure, boxes: I, point: Point) -> Option<&'a TextBox>
where
    I: IntoIterator<Item = &'a TextBox>,
{
    boxes.into_iter().find(|b| {
        let rect = padded_extent(measure, b);
        point.x >= rect.x0 && point.x <= rect.x1 && point.y >= rect.y0 && point.y <= rect.y1
    })
}

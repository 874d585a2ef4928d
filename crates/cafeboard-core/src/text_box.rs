//! Positioned text labels.

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// A text label placed on the board, independent of the stroke history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBox {
    /// Stable identifier, unchanged by moves and edits.
    pub id: String,
    /// Left edge in canvas pixels.
    pub x: f64,
    /// Top edge in canvas pixels.
    pub y: f64,
    pub text: String,
    pub font_size: f64,
    pub color: String,
}

impl TextBox {
    pub fn new(
        id: impl Into<String>,
        position: Point,
        text: impl Into<String>,
        font_size: f64,
        color: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            x: position.x,
            y: position.y,
            text: text.into(),
            font_size,
            color: color.into(),
        }
    }

    /// Top-left corner.
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn set_position(&mut self, position: Point) {
        self.x = position.x;
        self.y = position.y;
    }
}

/// Ordered collection of text boxes, keyed by id.
///
/// Insertion order is the paint order and the hit-test order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextBoxes(Vec<TextBox>);

impl TextBoxes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TextBox> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[TextBox] {
        &self.0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|b| b.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&TextBox> {
        self.0.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TextBox> {
        self.0.iter_mut().find(|b| b.id == id)
    }

    /// Insert a box, replacing an existing one with the same id in place.
    pub fn insert(&mut self, text_box: TextBox) {
        match self.get_mut(&text_box.id) {
            Some(existing) => *existing = text_box,
            None => self.0.push(text_box),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<TextBox> {
        let index = self.0.iter().position(|b| b.id == id)?;
        Some(self.0.remove(index))
    }

    /// Move a box. Returns false if no box has this id.
    pub fn move_to(&mut self, id: &str, position: Point) -> bool {
        match self.get_mut(id) {
            Some(text_box) => {
                text_box.set_position(position);
                true
            }
            None => false,
        }
    }

    /// Replace only the text of a box. Returns false if no box has this id.
    pub fn set_text(&mut self, id: &str, text: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(text_box) => {
                text_box.text = text.into();
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl From<Vec<TextBox>> for TextBoxes {
    fn from(boxes: Vec<TextBox>) -> Self {
        Self(boxes)
    }
}

impl<'a> IntoIterator for &'a TextBoxes {
    type Item = &'a TextBox;
    type IntoIter = std::slice::Iter<'a, TextBox>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(id: &str, x: f64, y: f64) -> TextBox {
        TextBox::new(id, Point::new(x, y), "Menu", 20.0, "#000000")
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut boxes = TextBoxes::new();
        boxes.insert(label("a", 0.0, 0.0));
        boxes.insert(label("b", 10.0, 10.0));

        let ids: Vec<_> = boxes.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_insert_replaces_same_id() {
        let mut boxes = TextBoxes::new();
        boxes.insert(label("a", 0.0, 0.0));
        boxes.insert(label("b", 10.0, 10.0));
        boxes.insert(label("a", 99.0, 99.0));

        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes.as_slice()[0].x, 99.0);
    }

    #[test]
    fn test_move_only_touches_target() {
        let mut boxes = TextBoxes::from(vec![label("a", 0.0, 0.0), label("b", 10.0, 10.0)]);

        assert!(boxes.move_to("a", Point::new(5.0, 6.0)));
        assert_eq!(boxes.get("a").unwrap().position(), Point::new(5.0, 6.0));
        assert_eq!(boxes.get("b").unwrap().position(), Point::new(10.0, 10.0));
        assert!(!boxes.move_to("missing", Point::ZERO));
    }

    #[test]
    fn test_set_text_and_remove() {
        let mut boxes = TextBoxes::from(vec![label("a", 0.0, 0.0)]);

        assert!(boxes.set_text("a", "Espresso"));
        assert_eq!(boxes.get("a").unwrap().text, "Espresso");

        let removed = boxes.remove("a").unwrap();
        assert_eq!(removed.id, "a");
        assert!(boxes.is_empty());
        assert!(boxes.remove("a").is_none());
    }

    #[test]
    fn test_serialization_field_names() {
        let json = serde_json::to_value(label("a", 1.0, 2.0)).unwrap();
        assert_eq!(json["id"], "a");
        assert_eq!(json["x"], 1.0);
        assert_eq!(json["y"], 2.0);
        assert_eq!(json["fontSize"], 20.0);
        assert_eq!(json["color"], "#000000");
        assert!(json.get("font_size").is_none());
    }
}

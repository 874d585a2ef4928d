//! CPU renderer on a tiny-skia pixmap.

use crate::renderer::{RenderContext, RenderError, RenderResult, Renderer};
use crate::text::TextRasterizer;
use cafeboard_core::color::rgba8;
use cafeboard_core::text_metrics::padded_extent;
use kurbo::Point;
use peniko::Color;
use std::sync::Arc;
use tiny_skia::{FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};

/// Renders a board into an owned RGBA pixel surface.
pub struct PixmapRenderer {
    pixmap: Pixmap,
    text: Arc<TextRasterizer>,
}

impl PixmapRenderer {
    pub fn new(width: u32, height: u32, text: Arc<TextRasterizer>) -> RenderResult<Self> {
        Ok(Self {
            pixmap: new_pixmap(width, height)?,
            text,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn text(&self) -> &Arc<TextRasterizer> {
        &self.text
    }

    /// Resize the surface. Contents are lost until the next render.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if width != self.width() || height != self.height() {
            self.pixmap = new_pixmap(width, height)?;
        }
        Ok(())
    }

    /// Straight-alpha RGBA bytes, row-major.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.pixmap.data().len());
        for pixel in self.pixmap.pixels() {
            let c = pixel.demultiply();
            data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        data
    }

    /// Encode the current pixels as PNG.
    pub fn encode_png(&self) -> RenderResult<Vec<u8>> {
        crate::export::encode_png(&self.to_rgba(), self.width(), self.height())
    }

    fn stroke_polyline(&mut self, points: &[Point], color: &str, width: f64) {
        let paint = paint_for(rgba8(color));

        if let [only] = points {
            // A lone point has no segment to stroke; draw the round cap as a dot.
            let radius = (width / 2.0).max(0.5) as f32;
            if let Some(dot) = PathBuilder::from_circle(only.x as f32, only.y as f32, radius) {
                self.pixmap
                    .fill_path(&dot, &paint, FillRule::Winding, Transform::identity(), None);
            }
            return;
        }

        let mut builder = PathBuilder::new();
        let mut iter = points.iter();
        let Some(first) = iter.next() else {
            return;
        };
        builder.move_to(first.x as f32, first.y as f32);
        for p in iter {
            builder.line_to(p.x as f32, p.y as f32);
        }
        let Some(path) = builder.finish() else {
            return;
        };

        let stroke = Stroke {
            width: width as f32,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    fn stroke_rect(&mut self, rect: kurbo::Rect, color: Color, width: f64) {
        let Some(bounds) =
            tiny_skia::Rect::from_ltrb(rect.x0 as f32, rect.y0 as f32, rect.x1 as f32, rect.y1 as f32)
        else {
            return;
        };
        let path = PathBuilder::from_rect(bounds);
        let c = color.to_rgba8();
        let stroke = Stroke {
            width: width as f32,
            ..Stroke::default()
        };
        self.pixmap.stroke_path(
            &path,
            &paint_for([c.r, c.g, c.b, c.a]),
            &stroke,
            Transform::identity(),
            None,
        );
    }
}

impl Renderer for PixmapRenderer {
    fn render(&mut self, ctx: &RenderContext) -> RenderResult<()> {
        self.resize(ctx.width, ctx.height)?;

        let bg = self.background_color(ctx).to_rgba8();
        self.pixmap
            .fill(tiny_skia::Color::from_rgba8(bg.r, bg.g, bg.b, bg.a));

        for instruction in ctx.history.replay() {
            self.stroke_polyline(instruction.points, instruction.color, instruction.width);
        }

        let text = Arc::clone(&self.text);
        for text_box in ctx.text_boxes {
            text.draw(&mut self.pixmap, text_box);
        }

        if let Some(selected) = ctx.selected.and_then(|id| ctx.text_boxes.get(id)) {
            let rect = padded_extent(text.as_ref(), selected);
            self.stroke_rect(rect, ctx.selection_color, ctx.selection_width);
        }
        Ok(())
    }

    fn draw_segment(&mut self, from: Point, to: Point, color: &str, width: f64) {
        self.stroke_polyline(&[from, to], color, width);
    }
}

fn new_pixmap(width: u32, height: u32) -> RenderResult<Pixmap> {
    Pixmap::new(width, height).ok_or(RenderError::InvalidSize { width, height })
}

fn paint_for(color: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = true;
    paint
}

#[cfg(test)]
mod tests {
    use super::*;
    use cafeboard_core::action::{DrawingAction, History};
    use cafeboard_core::text_box::{TextBox, TextBoxes};

    fn renderer(width: u32, height: u32) -> PixmapRenderer {
        PixmapRenderer::new(width, height, Arc::new(TextRasterizer::without_font())).unwrap()
    }

    fn pixel(r: &PixmapRenderer, x: u32, y: u32) -> [u8; 4] {
        let rgba = r.to_rgba();
        let i = ((y * r.width() + x) * 4) as usize;
        [rgba[i], rgba[i + 1], rgba[i + 2], rgba[i + 3]]
    }

    fn red_line() -> History {
        History::new().append(DrawingAction::stroke(
            vec![Point::new(10.0, 50.0), Point::new(90.0, 50.0)],
            "#ff0000",
            6.0,
            1,
        ))
    }

    #[test]
    fn test_zero_size_rejected() {
        let result = PixmapRenderer::new(0, 10, Arc::new(TextRasterizer::without_font()));
        assert!(matches!(result, Err(RenderError::InvalidSize { .. })));
    }

    #[test]
    fn test_blank_board_is_background() {
        let mut r = renderer(32, 32);
        let history = History::new();
        let boxes = TextBoxes::new();

        r.render(&RenderContext::new(&history, &boxes, 32, 32)).unwrap();

        assert!(r.to_rgba().chunks(4).all(|p| p == [255, 255, 255, 255]));
    }

    #[test]
    fn test_render_is_deterministic() {
        let history = red_line().append(DrawingAction::stroke(
            vec![Point::new(5.0, 5.0), Point::new(60.0, 80.0), Point::new(95.0, 10.0)],
            "#123456",
            3.0,
            2,
        ));
        let boxes = TextBoxes::new();
        let ctx = RenderContext::new(&history, &boxes, 100, 100);

        let mut r = renderer(100, 100);
        r.render(&ctx).unwrap();
        let first = r.to_rgba();
        r.render(&ctx).unwrap();

        assert_eq!(first, r.to_rgba());
    }

    #[test]
    fn test_stroke_uses_its_own_color() {
        let mut r = renderer(100, 100);
        let history = red_line();
        let boxes = TextBoxes::new();

        r.render(&RenderContext::new(&history, &boxes, 100, 100)).unwrap();

        assert_eq!(pixel(&r, 50, 50), [255, 0, 0, 255]);
        assert_eq!(pixel(&r, 50, 10), [255, 255, 255, 255]);
    }

    #[test]
    fn test_clear_marker_does_not_erase() {
        let mut r = renderer(100, 100);
        let history = red_line().append(DrawingAction::clear(2));
        let boxes = TextBoxes::new();

        r.render(&RenderContext::new(&history, &boxes, 100, 100)).unwrap();

        assert_eq!(pixel(&r, 50, 50), [255, 0, 0, 255]);
    }

    #[test]
    fn test_single_point_stroke_draws_dot() {
        let mut r = renderer(40, 40);
        let history = History::new().append(DrawingAction::stroke(
            vec![Point::new(20.0, 20.0)],
            "#000000",
            10.0,
            1,
        ));
        let boxes = TextBoxes::new();

        r.render(&RenderContext::new(&history, &boxes, 40, 40)).unwrap();

        assert_eq!(pixel(&r, 20, 20), [0, 0, 0, 255]);
    }

    #[test]
    fn test_selection_outline() {
        let mut r = renderer(200, 100);
        let history = History::new();
        let boxes = TextBoxes::from(vec![TextBox::new(
            "a",
            Point::new(50.0, 50.0),
            "Hello",
            20.0,
            "#000000",
        )]);

        r.render(&RenderContext::new(&history, &boxes, 200, 100).with_selection(Some("a")))
            .unwrap();

        // Outline runs along y = 48 from x = 48 to x = 107 (55px wide text + margins).
        let top = pixel(&r, 80, 48);
        assert!(top[2] > 200 && top[0] < 100, "expected blue, got {:?}", top);
        assert_eq!(pixel(&r, 80, 60), [255, 255, 255, 255]);
    }

    #[test]
    fn test_text_box_drawn_in_its_color() {
        let text = Arc::new(TextRasterizer::bundled().unwrap());
        let mut r = PixmapRenderer::new(200, 60, text).unwrap();
        let history = History::new();

        r.render(&RenderContext::new(&history, &TextBoxes::new(), 200, 60))
            .unwrap();
        let blank = r.to_rgba();

        let boxes = TextBoxes::from(vec![TextBox::new(
            "a",
            Point::new(10.0, 10.0),
            "WWWWWW",
            24.0,
            "#ff0000",
        )]);
        r.render(&RenderContext::new(&history, &boxes, 200, 60)).unwrap();
        let drawn = r.to_rgba();

        assert_ne!(drawn, blank);
        for (i, (after, before)) in drawn.chunks(4).zip(blank.chunks(4)).enumerate() {
            if after == before {
                continue;
            }
            let (x, y) = (i as u32 % 200, i as u32 / 200);
            assert!(x >= 8 && y >= 8 && y <= 40, "ink outside the box at ({}, {})", x, y);
            assert!(after[0] >= after[1] && after[0] >= after[2], "not red: {:?}", after);
        }
    }

    #[test]
    fn test_render_resizes_surface() {
        let mut r = renderer(10, 10);
        let history = History::new();
        let boxes = TextBoxes::new();

        r.render(&RenderContext::new(&history, &boxes, 64, 48)).unwrap();

        assert_eq!((r.width(), r.height()), (64, 48));
        assert_eq!(r.to_rgba().len(), 64 * 48 * 4);
    }

    #[test]
    fn test_draw_segment_paints() {
        let mut r = renderer(50, 50);
        let history = History::new();
        let boxes = TextBoxes::new();
        r.render(&RenderContext::new(&history, &boxes, 50, 50)).unwrap();

        r.draw_segment(Point::new(0.0, 25.0), Point::new(50.0, 25.0), "#00ff00", 4.0);

        assert_eq!(pixel(&r, 25, 25), [0, 255, 0, 255]);
    }
}

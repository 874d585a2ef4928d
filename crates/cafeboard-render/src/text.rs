//! Text measurement and glyph rasterization.

use crate::renderer::{RenderError, RenderResult};
use ab_glyph::{Font, FontArc, GlyphId, PxScale, ScaleFont, point};
use cafeboard_core::color::rgba8;
use cafeboard_core::text_box::TextBox;
use cafeboard_core::text_metrics::{ApproximateMeasure, TextMeasure};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tiny_skia::{Pixmap, PremultipliedColorU8};

/// Embedded DejaVu Sans, used unless a font file is configured.
static DEJAVU_SANS: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Measures and draws text with a TrueType font.
///
/// Without a font, widths fall back to the character-count estimate and no
/// glyphs are drawn.
#[derive(Default)]
pub struct TextRasterizer {
    font: Option<FontArc>,
    fallback: ApproximateMeasure,
    warned: AtomicBool,
}

impl TextRasterizer {
    /// Rasterizer without a font.
    pub fn without_font() -> Self {
        Self::default()
    }

    /// Rasterizer with the embedded default font.
    pub fn bundled() -> RenderResult<Self> {
        let font = FontArc::try_from_slice(DEJAVU_SANS).map_err(|e| RenderError::Font(e.to_string()))?;
        Ok(Self {
            font: Some(font),
            ..Self::default()
        })
    }

    pub fn from_bytes(data: Vec<u8>) -> RenderResult<Self> {
        let font = FontArc::try_from_vec(data).map_err(|e| RenderError::Font(e.to_string()))?;
        Ok(Self {
            font: Some(font),
            ..Self::default()
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| RenderError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let rasterizer = Self::from_bytes(data)?;
        log::info!("Loaded font {}", path.display());
        Ok(rasterizer)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw a text box with its top edge at `y`.
    pub fn draw(&self, pixmap: &mut Pixmap, text_box: &TextBox) {
        let Some(font) = &self.font else {
            if !self.warned.swap(true, Ordering::Relaxed) {
                log::warn!("No font loaded; text boxes are not drawn");
            }
            return;
        };

        let scale = px_scale(font, text_box.font_size);
        let scaled = font.as_scaled(scale);
        let baseline = text_box.y as f32 + scaled.ascent();
        let color = rgba8(&text_box.color);
        let (width, height) = (pixmap.width() as i64, pixmap.height() as i64);
        let pixels = pixmap.pixels_mut();

        let mut caret = text_box.x as f32;
        let mut prev: Option<GlyphId> = None;
        for ch in text_box.text.chars() {
            let id = font.glyph_id(ch);
            if let Some(prev) = prev {
                caret += scaled.kern(prev, id);
            }
            let glyph = id.with_scale_and_position(scale, point(caret, baseline));
            caret += scaled.h_advance(id);
            prev = Some(id);

            let Some(outlined) = font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let x = bounds.min.x as i64 + gx as i64;
                let y = bounds.min.y as i64 + gy as i64;
                if x < 0 || y < 0 || x >= width || y >= height {
                    return;
                }
                let index = (y * width + x) as usize;
                pixels[index] = blend(pixels[index], color, coverage);
            });
        }
    }
}

impl std::fmt::Debug for TextRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRasterizer")
            .field("has_font", &self.font.is_some())
            .finish()
    }
}

impl TextMeasure for TextRasterizer {
    fn text_width(&self, text: &str, font_size: f64) -> f64 {
        let Some(font) = &self.font else {
            return self.fallback.text_width(text, font_size);
        };
        let scaled = font.as_scaled(px_scale(font, font_size));
        let mut width = 0.0f32;
        let mut prev: Option<GlyphId> = None;
        for ch in text.chars() {
            let id = font.glyph_id(ch);
            if let Some(prev) = prev {
                width += scaled.kern(prev, id);
            }
            width += scaled.h_advance(id);
            prev = Some(id);
        }
        width as f64
    }
}

/// Scale for a CSS pixel font size (em height, not ascent-to-descent).
fn px_scale(font: &FontArc, font_size: f64) -> PxScale {
    // 1px = 0.75pt at 96 dpi.
    font.pt_to_px_scale(font_size as f32 * 0.75)
        .unwrap_or_else(|| PxScale::from(font_size as f32))
}

/// Source-over blend of a straight-alpha color at `coverage` onto a
/// premultiplied pixel.
fn blend(dst: PremultipliedColorU8, color: [u8; 4], coverage: f32) -> PremultipliedColorU8 {
    let sa = (coverage.clamp(0.0, 1.0) * color[3] as f32) / 255.0;
    let inv = 1.0 - sa;
    let channel = |src: u8, dst: u8| (src as f32 * sa + dst as f32 * inv).round().min(255.0) as u8;
    let a = (255.0 * sa + dst.alpha() as f32 * inv).round().min(255.0) as u8;
    let r = channel(color[0], dst.red()).min(a);
    let g = channel(color[1], dst.green()).min(a);
    let b = channel(color[2], dst.blue()).min(a);
    PremultipliedColorU8::from_rgba(r, g, b, a).unwrap_or(dst)
}

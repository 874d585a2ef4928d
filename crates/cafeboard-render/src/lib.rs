//! Cafeboard Render Library
//!
//! Renderer abstraction and a CPU implementation for the whiteboard.
//! The default implementation rasterizes with tiny-skia and exports PNG.

pub mod export;
mod pixmap;
mod renderer;
pub mod text;

pub use export::{encode_png, export_file_name, today_file_name, write_export};
pub use pixmap::PixmapRenderer;
pub use renderer::{RenderContext, RenderError, RenderResult, Renderer};
pub use text::TextRasterizer;

//! PNG export of a rendered board.

use crate::renderer::{RenderError, RenderResult};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Prefix of exported file names.
pub const EXPORT_PREFIX: &str = "whiteboard";

/// Encode straight-alpha RGBA pixels to PNG bytes.
pub fn encode_png(rgba_data: &[u8], width: u32, height: u32) -> RenderResult<Vec<u8>> {
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 || rgba_data.len() != expected {
        return Err(RenderError::InvalidSize { width, height });
    }

    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder
            .write_header()
            .map_err(|e| RenderError::Encode(format!("Failed to write PNG header: {}", e)))?;
        writer
            .write_image_data(rgba_data)
            .map_err(|e| RenderError::Encode(format!("Failed to write PNG data: {}", e)))?;
        writer
            .finish()
            .map_err(|e| RenderError::Encode(format!("Failed to finish PNG: {}", e)))?;
    }
    Ok(png_data)
}

/// `whiteboard-YYYY-MM-DD.png` for the given day.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("{}-{}.png", EXPORT_PREFIX, date.format("%Y-%m-%d"))
}

/// Today's export file name, using the UTC date.
pub fn today_file_name() -> String {
    export_file_name(chrono::Utc::now().date_naive())
}

/// Write encoded PNG bytes into `dir` under the dated file name.
pub fn write_export(dir: impl AsRef<Path>, date: NaiveDate, png_data: &[u8]) -> RenderResult<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .map_err(|e| RenderError::Io(format!("Failed to create {}: {}", dir.display(), e)))?;

    let path = dir.join(export_file_name(date));
    std::fs::write(&path, png_data)
        .map_err(|e| RenderError::Io(format!("Failed to write {}: {}", path.display(), e)))?;

    log::info!("Exported PNG to: {} ({} bytes)", path.display(), png_data.len());
    Ok(path)
}

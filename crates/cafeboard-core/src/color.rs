//! CSS-style hex color strings.

use peniko::Color;

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
///
/// Returns `None` for anything else.
pub fn parse_color(color: &str) -> Option<Color> {
    let hex = color.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();

    match hex.len() {
        3 => {
            let r = channel(0..1)? * 17;
            let g = channel(1..2)? * 17;
            let b = channel(2..3)? * 17;
            Some(Color::from_rgba8(r, g, b, 255))
        }
        6 => Some(Color::from_rgba8(channel(0..2)?, channel(2..4)?, channel(4..6)?, 255)),
        8 => Some(Color::from_rgba8(
            channel(0..2)?,
            channel(2..4)?,
            channel(4..6)?,
            channel(6..8)?,
        )),
        _ => None,
    }
}

/// Parse a color string, falling back to opaque black.
pub fn parse_color_or_black(color: &str) -> Color {
    parse_color(color).unwrap_or_else(|| {
        log::debug!("Unrecognized color {:?}, using black", color);
        Color::from_rgba8(0, 0, 0, 255)
    })
}

/// RGBA bytes of a color string, falling back to opaque black.
pub fn rgba8(color: &str) -> [u8; 4] {
    let c = parse_color_or_black(color).to_rgba8();
    [c.r, c.g, c.b, c.a]
}

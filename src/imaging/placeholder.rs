//! Placeholder image synthesis.
//!
//! When generation is exhausted the pipeline still has to leave *something*
//! under the asset's filename. The placeholder is a dark 1024×1024 card with
//! an emerald frame, the filename, and a short failure notice, drawn as SVG
//! and rasterized with resvg.
//!
//! The frame and background double as a marker: [`is_placeholder`] samples
//! them to tell placeholders apart from real illustrations. Lossy targets
//! shift flat colors by a few levels, so the comparison allows a tolerance.

use thiserror::Error;

pub const SIZE: u32 = 1024;
const BACKGROUND: [u8; 3] = [0x11, 0x18, 0x27];
const BORDER: [u8; 3] = [0x05, 0x96, 0x69];
const BORDER_WIDTH: u32 = 20;
const TOLERANCE: u8 = 24;

#[derive(Error, Debug)]
pub enum PlaceholderError {
    #[error("SVG parsing failed: {0}")]
    Svg(String),
    #[error("failed to allocate {0}x{0} pixmap")]
    Pixmap(u32),
    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

/// Build the placeholder SVG for `filename`.
pub fn placeholder_svg(filename: &str) -> String {
    let label = escape_xml(filename);
    let inset = BORDER_WIDTH / 2;
    let frame = SIZE - BORDER_WIDTH;
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{SIZE}" height="{SIZE}" viewBox="0 0 {SIZE} {SIZE}">
<rect width="{SIZE}" height="{SIZE}" fill="#111827"/>
<rect x="{inset}" y="{inset}" width="{frame}" height="{frame}" fill="none" stroke="#059669" stroke-width="{BORDER_WIDTH}"/>
<g font-family="sans-serif" text-anchor="middle">
<text x="512" y="450" font-size="60" font-weight="bold" fill="#10b981">{label}</text>
<text x="512" y="550" font-size="40" fill="#6b7280">Image Generation Failed</text>
<text x="512" y="600" font-size="40" fill="#6b7280">(Quota Exceeded)</text>
</g>
</svg>"##
    )
}

/// Rasterize the placeholder for `filename` to PNG bytes.
pub fn render_placeholder(filename: &str) -> Result<Vec<u8>, PlaceholderError> {
    let svg = placeholder_svg(filename);

    let mut opts = usvg::Options::default();
    opts.fontdb_mut().load_system_fonts();
    let tree =
        usvg::Tree::from_str(&svg, &opts).map_err(|e| PlaceholderError::Svg(e.to_string()))?;

    let mut pixmap = tiny_skia::Pixmap::new(SIZE, SIZE).ok_or(PlaceholderError::Pixmap(SIZE))?;
    resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|e| PlaceholderError::Encode(e.to_string()))
}

/// Whether `bytes` decode to a placeholder card.
///
/// Checks the canvas size, a pixel in the middle of the left frame edge, and
/// a background pixel above the text.
pub fn is_placeholder(bytes: &[u8]) -> bool {
    let Ok(img) = image::load_from_memory(bytes) else {
        return false;
    };
    let img = img.to_rgb8();
    if img.width() != SIZE || img.height() != SIZE {
        return false;
    }
    let frame = img.get_pixel(BORDER_WIDTH / 2, SIZE / 2).0;
    let background = img.get_pixel(SIZE / 2, 100).0;
    near(frame, BORDER) && near(background, BACKGROUND)
}

fn near(pixel: [u8; 3], expected: [u8; 3]) -> bool {
    pixel
        .iter()
        .zip(expected)
        .all(|(&p, e)| p.abs_diff(e) <= TOLERANCE)
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

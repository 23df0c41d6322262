//! Parameter types for codec operations.
//!
//! ## Types
//!
//! - [`Quality`] — Lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`TargetFormat`] — Output format implied by a target filename's extension.

use std::path::Path;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        // clamped to 1-100, always fits
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u32 {
        u32::from(self.0)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// Encoded output format, chosen from the target filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    WebP,
    Avif,
    Jpeg,
    /// Uncompressed targets: bytes are stored as delivered.
    Png,
}

impl TargetFormat {
    /// Format for a target path, by case-insensitive extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "webp" => Some(Self::WebP),
            "avif" => Some(Self::Avif),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    /// Whether bytes must be re-encoded before they land under this name.
    pub fn is_compressed(self) -> bool {
        !matches!(self, Self::Png)
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::WebP => "image/webp",
            Self::Avif => "image/avif",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

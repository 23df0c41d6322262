//! Shared types used across the acquisition pipeline, the renderer and the
//! server.
//!
//! These types are serialized into `config.toml` (`[[assets]]`) and into the
//! server's JSON status responses, so their serde representation is part of
//! the public surface.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One illustration the guide needs: the filename it is stored under in the
/// asset store and the prompt used to generate it.
///
/// The filename doubles as the cache key — if a non-empty file with this name
/// exists, the pipeline reuses it instead of calling the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetDescriptor {
    pub filename: String,
    pub prompt: String,
}

impl AssetDescriptor {
    pub fn new(filename: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            prompt: prompt.into(),
        }
    }

    /// Filename without its extension (`cover.webp` → `cover`).
    pub fn stem(&self) -> &str {
        match self.filename.rfind('.') {
            Some(dot) if dot > 0 => &self.filename[..dot],
            _ => &self.filename,
        }
    }

    /// Same-subject filename under a different extension (`cover.webp` → `cover.png`).
    pub fn with_extension(&self, ext: &str) -> String {
        format!("{}.{}", self.stem(), ext)
    }
}

/// Lifecycle of one descriptor during a single pipeline run.
///
/// Held in memory only; nothing here is persisted between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    #[default]
    Unknown,
    Checking,
    Generating,
    Saved,
    Exists,
    Error,
}

impl AssetStatus {
    /// Whether the descriptor is finished for this run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Saved | Self::Exists | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Checking => "checking",
            Self::Generating => "generating",
            Self::Saved => "saved",
            Self::Exists => "exists",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The guide's stock illustration catalog, in processing order.
pub fn default_catalog() -> Vec<AssetDescriptor> {
    vec![
        AssetDescriptor::new(
            "cover.webp",
            "A cinematic, dark, moody shot of an exhausted bartender leaning on a bar counter late at night, surrounded by dirty glasses, looking cynical and tired, emerald green neon lights reflecting, realistic style, high detail, 8k.",
        ),
        AssetDescriptor::new(
            "bar_scheme.webp",
            "A humorous, chaotic diagram or blueprint of a bar layout, marked with danger zones labeled \"Hell\", \"Sticky Floor\", \"Angry Customer Zone\", hand-drawn style on dark paper, white and green chalk lines.",
        ),
        AssetDescriptor::new(
            "fake_smile.webp",
            "A close-up of a bartender with a painfully fake, forced smile, dead eyes, holding a cocktail shaker, dark bar background with subtle green ambient lighting, dramatic lighting, cinematic portrait.",
        ),
        AssetDescriptor::new(
            "alcohol_shelf.webp",
            "A dimly lit, impressive shelf of liquor bottles in a bar, looking expensive and intimidating, with some bottles glowing slightly green, cinematic photography, depth of field.",
        ),
        AssetDescriptor::new(
            "shaking_fail.webp",
            "A dynamic action shot of a bartender shaking a cocktail shaker violently and clumsily, ice flying everywhere, looking panicked, comic book style or exaggerated realism with green accents.",
        ),
        AssetDescriptor::new(
            "tears.webp",
            "A close-up of a spilled cocktail on a bar counter that looks like a puddle of tears, with a small violin next to it, artistic and moody, dark lighting with emerald tint.",
        ),
        AssetDescriptor::new(
            "building_drink.webp",
            "A close-up of a bartender pouring a clear liquid into a highball glass filled with ice cubes, simple and clean, dark background with emerald green accents, cinematic lighting, realistic.",
        ),
        AssetDescriptor::new(
            "stirring_drink.webp",
            "A close-up of a crystal mixing glass with ice and red liquid, a long twisted metal bar spoon stirring it gently, elegant and sophisticated, dark moody bar atmosphere, emerald tint.",
        ),
        AssetDescriptor::new(
            "muddling_mint.webp",
            "A close-up of a wooden muddler crushing fresh green mint leaves and lime wedges in a sturdy glass, dynamic action, splashing juice, dark background, high detail.",
        ),
    ]
}

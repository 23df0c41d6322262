//! Guide configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. The file lives in
//! the content directory next to `guide.toml` and the chapter files. Stock
//! defaults are the base layer; user values override them key by key.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [images]
//! dir = "images"                 # Asset store directory (relative to the working dir)
//! quality = 80                   # WebP/AVIF/JPEG encoding quality (1-100)
//! legacy_extensions = ["png"]    # Same-subject variants converted instead of regenerated
//!
//! [generation]
//! endpoint = "https://generativelanguage.googleapis.com"
//! model = "gemini-2.5-flash-image"
//! api_key_env = "GEMINI_API_KEY" # Environment variable holding the API key
//! timeout_secs = 120
//!
//! [retry]
//! max_attempts = 10
//! inter_request_ms = 15000       # Pause after each successful generation
//! rate_limit_base_ms = 60000     # Rate-limit backoff: base + attempt * step
//! rate_limit_step_ms = 10000
//! backoff_base_ms = 2000         # Other errors: base * 2^(attempt - 1)
//!
//! [server]
//! host = "0.0.0.0"
//! port = 3000
//! body_limit_mb = 50
//!
//! [export]
//! file_stem = "bartender-survival-guide"
//!
//! [colors]
//! background = "#050505"
//! surface = "#111827"
//! text = "#d1d5db"
//! text_muted = "#6b7280"
//! accent = "#10b981"
//! accent_strong = "#059669"
//!
//! # Replaces the stock illustration catalog when present.
//! [[assets]]
//! filename = "cover.webp"
//! prompt = "..."
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::assets::validate_filename;
use crate::imaging::TargetFormat;
use crate::types::{AssetDescriptor, default_catalog};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Guide configuration loaded from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuideConfig {
    /// Asset store location and encoding settings.
    pub images: ImagesConfig,
    /// Remote image generation endpoint.
    pub generation: GenerationConfig,
    /// Retry and pacing policy for the acquisition pipeline.
    pub retry: RetryConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Export job settings.
    pub export: ExportConfig,
    /// Page color scheme.
    pub colors: ColorScheme,
    /// Illustrations to acquire, in processing order.
    pub assets: Vec<AssetDescriptor>,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            images: ImagesConfig::default(),
            generation: GenerationConfig::default(),
            retry: RetryConfig::default(),
            server: ServerConfig::default(),
            export: ExportConfig::default(),
            colors: ColorScheme::default(),
            assets: default_catalog(),
        }
    }
}

impl GuideConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.images.quality == 0 || self.images.quality > 100 {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.images.dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "images.dir must not be empty".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.generation.api_key_env.trim().is_empty() {
            return Err(ConfigError::Validation(
                "generation.api_key_env must not be empty".into(),
            ));
        }
        if self.assets.is_empty() {
            return Err(ConfigError::Validation("assets must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for asset in &self.assets {
            if validate_filename(&asset.filename).is_err() {
                return Err(ConfigError::Validation(format!(
                    "asset filename '{}' must be a plain file name",
                    asset.filename
                )));
            }
            if TargetFormat::from_path(Path::new(&asset.filename)).is_none() {
                return Err(ConfigError::Validation(format!(
                    "asset filename '{}' needs a .webp, .avif, .jpg, .jpeg or .png extension",
                    asset.filename
                )));
            }
            if !seen.insert(asset.filename.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate asset filename '{}'",
                    asset.filename
                )));
            }
        }
        Ok(())
    }
}

/// Asset store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Directory holding generated images, relative to the working directory.
    pub dir: String,
    /// Encoding quality for WebP, AVIF and JPEG targets.
    pub quality: u32,
    /// Extensions checked for a same-subject asset before generating.
    pub legacy_extensions: Vec<String>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            dir: "images".to_string(),
            quality: 80,
            legacy_extensions: vec!["png".to_string()],
        }
    }
}

/// Remote generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable carrying the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.5-flash-image".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Retry and pacing settings, all delays in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub inter_request_ms: u64,
    pub rate_limit_base_ms: u64,
    pub rate_limit_step_ms: u64,
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            inter_request_ms: 15_000,
            rate_limit_base_ms: 60_000,
            rate_limit_step_ms: 10_000,
            backoff_base_ms: 2_000,
        }
    }
}

impl RetryConfig {
    pub fn inter_request_delay(&self) -> Duration {
        Duration::from_millis(self.inter_request_ms)
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum JSON body size (base64 images are large).
    pub body_limit_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            body_limit_mb: 50,
        }
    }
}

/// Export job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Base name of exported documents (`<stem>.html`, `<stem>.pdf`).
    pub file_stem: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_stem: "bartender-survival-guide".to_string(),
        }
    }
}

/// Page color scheme. The guide is dark-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorScheme {
    /// Page background.
    pub background: String,
    /// Cards, quotes and image frames.
    pub surface: String,
    /// Body text.
    pub text: String,
    /// Captions and secondary text.
    pub text_muted: String,
    /// Links, headings accents.
    pub accent: String,
    /// Borders and hover states.
    pub accent_strong: String,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            background: "#050505".to_string(),
            surface: "#111827".to_string(),
            text: "#d1d5db".to_string(),
            text_muted: "#6b7280".to_string(),
            accent: "#10b981".to_string(),
            accent_strong: "#059669".to_string(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(GuideConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key by key; anything else (including arrays such as
/// `[[assets]]`) replaces the base value wholesale.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Load config from `config.toml` in the given directory, merged over the
/// stock defaults and validated.
pub fn load_config(dir: &Path) -> Result<GuideConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match load_raw_config(dir)? {
        Some(overlay) => merge_toml(base, overlay),
        None => base,
    };
    let config: GuideConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# last-call configuration
# =======================
# All settings are optional. Values shown below are the defaults.
# Place this file in the content directory, next to guide.toml.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Asset store
# ---------------------------------------------------------------------------
[images]
# Directory holding the guide's illustrations, relative to the working dir.
dir = "images"

# Encoding quality for WebP, AVIF and JPEG targets, 1-100.
# 100 writes lossless WebP.
quality = 80

# Before generating `cover.webp`, look for `cover.png` (etc.) and convert it.
legacy_extensions = ["png"]

# ---------------------------------------------------------------------------
# Image generation
# ---------------------------------------------------------------------------
[generation]
endpoint = "https://generativelanguage.googleapis.com"
model = "gemini-2.5-flash-image"

# Environment variable holding the API key. Missing key = fatal error.
api_key_env = "GEMINI_API_KEY"

# Per-request timeout in seconds.
timeout_secs = 120

# ---------------------------------------------------------------------------
# Retry / pacing (milliseconds)
# ---------------------------------------------------------------------------
[retry]
max_attempts = 10

# Pause after every successful generation except the last one.
inter_request_ms = 15000

# Rate-limited or overloaded upstream: base + attempt * step.
rate_limit_base_ms = 60000
rate_limit_step_ms = 10000

# Any other failure: base * 2^(attempt - 1).
backoff_base_ms = 2000

# ---------------------------------------------------------------------------
# HTTP server
# ---------------------------------------------------------------------------
[server]
host = "0.0.0.0"
port = 3000
body_limit_mb = 50

# ---------------------------------------------------------------------------
# Export
# ---------------------------------------------------------------------------
[export]
file_stem = "bartender-survival-guide"

# ---------------------------------------------------------------------------
# Colors
# ---------------------------------------------------------------------------
[colors]
background = "#050505"
surface = "#111827"
text = "#d1d5db"
text_muted = "#6b7280"     # Captions, secondary text
accent = "#10b981"
accent_strong = "#059669"  # Borders, hover

# ---------------------------------------------------------------------------
# Illustration catalog
# ---------------------------------------------------------------------------
# Uncomment to replace the stock catalog. Order = processing order.
# [[assets]]
# filename = "cover.webp"
# prompt = "A cinematic, dark, moody shot of an exhausted bartender..."
"##
}

/// Generate CSS custom properties from the color scheme.
pub fn generate_color_css(colors: &ColorScheme) -> String {
    format!(
        r#":root {{
    --color-bg: {background};
    --color-surface: {surface};
    --color-text: {text};
    --color-text-muted: {text_muted};
    --color-accent: {accent};
    --color-accent-strong: {accent_strong};
}}"#,
        background = colors.background,
        surface = colors.surface,
        text = colors.text,
        text_muted = colors.text_muted,
        accent = colors.accent,
        accent_strong = colors.accent_strong,
    )
}

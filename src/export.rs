//! Export jobs: turn the rendered guide into a downloadable document.
//!
//! ## Output Structure
//!
//! ```text
//! exports/
//! ├── bartender-survival-guide.html   # Linked bundle (default)
//! ├── bartender-survival-guide.pdf    # --pdf (feature "pdf")
//! └── images/                         # Only the images the chosen chapters show
//!     ├── cover.webp
//!     └── bar_scheme.webp
//! ```
//!
//! With `--inline` the HTML embeds every image as a data URI and no
//! `images/` directory is written. The `render` command uses the same job
//! with `index.html` as the document name.
//!
//! Missing images are not an error: the page shows its "Generating…" card
//! in their place and the summary lists them.

use crate::assets::{AssetError, AssetStore, write_atomic};
use crate::config::GuideConfig;
use crate::guide::{Chapter, Guide, GuideError};
use crate::render::{RenderOptions, render_guide};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Guide(#[from] GuideError),
    #[error("{0}")]
    Asset(#[from] AssetError),
    #[cfg(feature = "pdf")]
    #[error("PDF rendering failed: {0}")]
    Browser(String),
}

/// What to export and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    /// Document file name, e.g. `bartender-survival-guide.html`.
    pub file_name: String,
    /// Embed images instead of copying them next to the document.
    pub inline: bool,
    /// Chapter numbers or slugs; empty means the whole guide.
    pub chapters: Vec<String>,
}

impl ExportOptions {
    /// Whole-guide linked bundle named after the configured file stem.
    pub fn for_config(config: &GuideConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_name: format!("{}.html", config.export.file_stem),
            inline: false,
            chapters: Vec::new(),
        }
    }
}

/// Result of an export job, for CLI output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub document: PathBuf,
    pub chapters: Vec<String>,
    pub images_copied: Vec<String>,
    /// Referenced but not (yet) in the asset store.
    pub images_missing: Vec<String>,
    pub inline: bool,
}

/// Write the guide as HTML, copying referenced images unless inlined.
pub fn export_html(
    guide: &Guide,
    config: &GuideConfig,
    store: &AssetStore,
    options: &ExportOptions,
) -> Result<ExportSummary, ExportError> {
    let chapters = guide.select(&options.chapters)?;
    let referenced = images_for(guide, &chapters);

    let render_options = if options.inline {
        RenderOptions::inline()
    } else {
        RenderOptions::bundled()
    };
    let page = render_guide(guide, &chapters, config, store, &render_options);

    fs::create_dir_all(&options.output_dir)?;
    let document = options.output_dir.join(&options.file_name);
    write_atomic(&document, page.into_string().as_bytes())?;

    let mut images_copied = Vec::new();
    let mut images_missing = Vec::new();
    let images_dir = options.output_dir.join("images");
    for name in referenced {
        if !store.exists(&name) {
            images_missing.push(name);
            continue;
        }
        if !options.inline {
            fs::create_dir_all(&images_dir)?;
            fs::copy(store.path(&name)?, images_dir.join(&name))?;
            images_copied.push(name);
        }
    }

    Ok(ExportSummary {
        document,
        chapters: chapters.iter().map(|c| c.title.clone()).collect(),
        images_copied,
        images_missing,
        inline: options.inline,
    })
}

/// Cover image plus the images of the selected chapters, in reading order.
fn images_for(guide: &Guide, chapters: &[&Chapter]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let cover = guide.cover.image.iter().cloned();
    for name in cover.chain(chapters.iter().flat_map(|c| c.image_references())) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Print the guide to an A4 PDF with a headless Chrome.
///
/// Renders a self-contained HTML file first so the browser needs no access
/// to the asset store, then removes it.
#[cfg(feature = "pdf")]
pub fn export_pdf(
    guide: &Guide,
    config: &GuideConfig,
    store: &AssetStore,
    options: &ExportOptions,
) -> Result<ExportSummary, ExportError> {
    let stem = options
        .file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(&options.file_name)
        .to_string();
    let print_options = ExportOptions {
        file_name: format!(".{stem}.print.html"),
        inline: true,
        ..options.clone()
    };
    let mut summary = export_html(guide, config, store, &print_options)?;
    let html_path = fs::canonicalize(&summary.document)?;

    let pdf = print_to_pdf(&html_path);
    let _ = fs::remove_file(&html_path);

    let document = options.output_dir.join(format!("{stem}.pdf"));
    write_atomic(&document, &pdf?)?;
    summary.document = document;
    Ok(summary)
}

#[cfg(feature = "pdf")]
fn browser_error(e: impl std::fmt::Display) -> ExportError {
    ExportError::Browser(e.to_string())
}

#[cfg(feature = "pdf")]
fn print_to_pdf(html_path: &std::path::Path) -> Result<Vec<u8>, ExportError> {
    use headless_chrome::types::PrintToPdfOptions;
    use headless_chrome::{Browser, LaunchOptions};

    let browser = Browser::new(LaunchOptions {
        window_size: Some((1240, 1754)),
        ..Default::default()
    })
    .map_err(browser_error)?;
    let tab = browser.new_tab().map_err(browser_error)?;
    tab.navigate_to(&format!("file://{}", html_path.display()))
        .map_err(browser_error)?
        .wait_until_navigated()
        .map_err(browser_error)?;
    tab.print_to_pdf(Some(PrintToPdfOptions {
        print_background: Some(true),
        prefer_css_page_size: Some(true),
        paper_width: Some(8.27),
        paper_height: Some(11.69),
        margin_top: Some(0.0),
        margin_bottom: Some(0.0),
        margin_left: Some(0.0),
        margin_right: Some(0.0),
        ..Default::default()
    }))
    .map_err(browser_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guide::load_guide;
    use crate::test_helpers::{tiny_png, write_guide_fixture};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Guide, AssetStore) {
        let tmp = TempDir::new().unwrap();
        let content = tmp.path().join("content");
        write_guide_fixture(&content);
        let guide = load_guide(&content).unwrap();
        let store = AssetStore::new(tmp.path().join("images"));
        (tmp, guide, store)
    }

    #[test]
    fn bundle_writes_document_and_copies_images() {
        let (tmp, guide, store) = setup();
        store.write("cover.webp", &tiny_png()).unwrap();
        store.write("bar_scheme.webp", &tiny_png()).unwrap();
        store.write("unrelated.webp", &tiny_png()).unwrap();
        let config = GuideConfig::default();
        let options = ExportOptions::for_config(&config, tmp.path().join("exports"));

        let summary = export_html(&guide, &config, &store, &options).unwrap();

        assert_eq!(
            summary.document,
            tmp.path().join("exports/bartender-survival-guide.html")
        );
        assert!(summary.document.exists());
        assert_eq!(summary.images_copied, vec!["cover.webp", "bar_scheme.webp"]);
        assert_eq!(summary.images_missing, vec!["fake_smile.webp"]);
        assert!(tmp.path().join("exports/images/bar_scheme.webp").exists());
        assert!(!tmp.path().join("exports/images/unrelated.webp").exists());
        assert_eq!(summary.chapters.len(), 3);
    }

    #[test]
    fn inline_export_has_no_image_dir() {
        let (tmp, guide, store) = setup();
        store.write("cover.webp", &tiny_png()).unwrap();
        let config = GuideConfig::default();
        let mut options = ExportOptions::for_config(&config, tmp.path().join("exports"));
        options.inline = true;

        let summary = export_html(&guide, &config, &store, &options).unwrap();

        assert!(summary.images_copied.is_empty());
        assert!(!tmp.path().join("exports/images").exists());
        let html = fs::read_to_string(&summary.document).unwrap();
        assert!(html.contains("data:image/webp;base64,"));
    }

    #[test]
    fn chapter_subset_only_copies_its_images() {
        let (tmp, guide, store) = setup();
        store.write("bar_scheme.webp", &tiny_png()).unwrap();
        store.write("fake_smile.webp", &tiny_png()).unwrap();
        let config = GuideConfig::default();
        let mut options = ExportOptions::for_config(&config, tmp.path().join("exports"));
        options.chapters = vec!["20".to_string()];

        let summary = export_html(&guide, &config, &store, &options).unwrap();

        assert_eq!(summary.chapters, vec!["FAQ"]);
        assert_eq!(summary.images_copied, vec!["fake_smile.webp"]);
        let html = fs::read_to_string(&summary.document).unwrap();
        assert!(!html.contains("bar_scheme.webp"));
    }

    #[test]
    fn unknown_chapter_is_error() {
        let (tmp, guide, store) = setup();
        let config = GuideConfig::default();
        let mut options = ExportOptions::for_config(&config, tmp.path().join("exports"));
        options.chapters = vec!["999".to_string()];
        assert!(matches!(
            export_html(&guide, &config, &store, &options),
            Err(ExportError::Guide(GuideError::UnknownChapter(_)))
        ));
        assert!(!tmp.path().join("exports").exists());
    }

    #[test]
    fn custom_file_name() {
        let (tmp, guide, store) = setup();
        let config = GuideConfig::default();
        let mut options = ExportOptions::for_config(&config, tmp.path().join("dist"));
        options.file_name = "index.html".to_string();
        let summary = export_html(&guide, &config, &store, &options).unwrap();
        assert_eq!(summary.document, tmp.path().join("dist/index.html"));
    }
}

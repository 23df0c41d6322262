//! Guide content loading.
//!
//! The content directory is the data source for the page:
//!
//! ```text
//! content/
//! ├── config.toml          # Optional, see config module
//! ├── guide.toml           # Optional cover text and cover image
//! ├── 000-intro.md         # Chapter 0, slug "intro"
//! ├── 010-rule-1.md        # Chapter 10, slug "rule-1"
//! ├── 020-rule-2.md
//! └── notes.md             # No number prefix = draft, not rendered
//! ```
//!
//! Chapters are ordered by their numeric prefix. The chapter title is the
//! first `# heading` in the file (the heading is removed from the body so the
//! renderer can place it); without one, the slug with dashes turned into
//! spaces is used. Two chapters with the same number are an error.
//!
//! Images are referenced from markdown by bare asset filename,
//! `![alt](bar_scheme.webp "Fig. 1: caption")`, and resolved against the
//! asset store at render time.

use pulldown_cmark::{Event, Parser, Tag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuideError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("guide.toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("content directory not found: {0}")]
    MissingSource(PathBuf),
    #[error("chapters {first} and {second} share number {number}")]
    DuplicateChapter {
        number: u32,
        first: String,
        second: String,
    },
    #[error("no chapter matches '{0}'")]
    UnknownChapter(String),
}

/// Cover page text, from `guide.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Cover {
    /// Small uppercase line above the title.
    pub kicker: String,
    pub title: String,
    /// Second title line, set in italics.
    pub subtitle: String,
    /// Quote under the title.
    pub tagline: String,
    /// Asset filename of the cover illustration.
    pub image: Option<String>,
    pub image_alt: String,
    /// Heading of the table of contents.
    pub contents_title: String,
    /// Document language (`<html lang>`).
    pub lang: String,
}

impl Default for Cover {
    fn default() -> Self {
        Self {
            kicker: "The unofficial survival manual".to_string(),
            title: "The Bartender's Handbook".to_string(),
            subtitle: "for naive rookies".to_string(),
            tagline: "\"Or why you should have, for heaven's sake, taken an office job\""
                .to_string(),
            image: Some("cover.webp".to_string()),
            image_alt: "A wrecked bartender".to_string(),
            contents_title: "Contents".to_string(),
            lang: "en".to_string(),
        }
    }
}

/// One numbered chapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chapter {
    pub number: u32,
    /// Name part of the filename, used as the HTML anchor.
    pub slug: String,
    pub title: String,
    /// Markdown body without the title heading.
    pub body: String,
}

impl Chapter {
    /// Asset filenames referenced by image tags in the body.
    pub fn image_references(&self) -> Vec<String> {
        image_references(&self.body)
    }
}

/// The whole guide: cover plus chapters in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Guide {
    pub cover: Cover,
    pub chapters: Vec<Chapter>,
}

impl Guide {
    /// Resolve chapter selectors (number or slug) to chapters in guide order.
    ///
    /// An empty selector list selects every chapter.
    pub fn select(&self, selectors: &[String]) -> Result<Vec<&Chapter>, GuideError> {
        if selectors.is_empty() {
            return Ok(self.chapters.iter().collect());
        }
        let mut picked = Vec::new();
        for selector in selectors {
            let found = self.chapters.iter().position(|c| {
                c.slug == *selector || selector.parse::<u32>().is_ok_and(|n| n == c.number)
            });
            match found {
                Some(index) => picked.push(index),
                None => return Err(GuideError::UnknownChapter(selector.clone())),
            }
        }
        picked.sort_unstable();
        picked.dedup();
        Ok(picked.into_iter().map(|i| &self.chapters[i]).collect())
    }

    /// Every asset filename the guide shows: cover first, then chapter
    /// images in reading order, without duplicates.
    pub fn referenced_images(&self) -> Vec<String> {
        let mut seen = Vec::new();
        let cover = self.cover.image.iter().cloned();
        let chapters = self.chapters.iter().flat_map(|c| c.image_references());
        for name in cover.chain(chapters) {
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }
}

/// Load `guide.toml` and all numbered chapters from `dir`.
pub fn load_guide(dir: &Path) -> Result<Guide, GuideError> {
    if !dir.is_dir() {
        return Err(GuideError::MissingSource(dir.to_path_buf()));
    }

    let cover_path = dir.join("guide.toml");
    let cover = if cover_path.exists() {
        toml::from_str(&fs::read_to_string(&cover_path)?)?
    } else {
        Cover::default()
    };

    let mut md_files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|e| e.eq_ignore_ascii_case("md"))
                    .unwrap_or(false)
        })
        .collect();
    md_files.sort();

    let mut by_number: BTreeMap<u32, Chapter> = BTreeMap::new();
    for md_path in &md_files {
        let stem = md_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let Some((number, slug)) = parse_chapter_name(&stem) else {
            continue;
        };
        let content = fs::read_to_string(md_path)?;
        let (title, body) = split_title(&content);
        let title = title.unwrap_or_else(|| slug.replace('-', " "));

        if let Some(existing) = by_number.get(&number) {
            return Err(GuideError::DuplicateChapter {
                number,
                first: existing.slug.clone(),
                second: slug,
            });
        }
        by_number.insert(
            number,
            Chapter {
                number,
                slug,
                title,
                body,
            },
        );
    }

    Ok(Guide {
        cover,
        chapters: by_number.into_values().collect(),
    })
}

/// Parse `NNN-slug` into its number and slug.
///
/// Returns `None` for unnumbered names and for a number with no slug.
pub fn parse_chapter_name(stem: &str) -> Option<(u32, String)> {
    let (prefix, slug) = stem.split_once('-')?;
    let number = prefix.parse::<u32>().ok()?;
    if slug.is_empty() {
        return None;
    }
    Some((number, slug.to_string()))
}

/// Split the first `# heading` off a markdown document.
fn split_title(content: &str) -> (Option<String>, String) {
    let mut title = None;
    let mut body = String::with_capacity(content.len());
    for line in content.lines() {
        if title.is_none()
            && let Some(heading) = line.strip_prefix("# ")
        {
            title = Some(heading.trim().to_string());
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }
    (title, body.trim().to_string())
}

/// Whether an image destination names an asset in the store (a bare
/// filename, not a URL or a path).
pub fn is_asset_reference(dest: &str) -> bool {
    !dest.is_empty()
        && !dest.contains('/')
        && !dest.contains('\\')
        && !dest.contains(':')
        && !dest.starts_with('.')
        && !dest.starts_with('#')
}

/// Asset filenames used as image destinations in `markdown`, in order.
pub fn image_references(markdown: &str) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    for event in Parser::new(markdown) {
        if let Event::Start(Tag::Image { dest_url, .. }) = event
            && is_asset_reference(&dest_url)
            && !refs.iter().any(|r| r.as_str() == &*dest_url)
        {
            refs.push(dest_url.to_string());
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_guide_fixture;
    use tempfile::TempDir;

    #[test]
    fn parse_numbered_chapter_names() {
        assert_eq!(
            parse_chapter_name("010-rule-1"),
            Some((10, "rule-1".to_string()))
        );
        assert_eq!(parse_chapter_name("000-intro"), Some((0, "intro".into())));
        assert_eq!(parse_chapter_name("notes"), None);
        assert_eq!(parse_chapter_name("wip-drafts"), None);
        assert_eq!(parse_chapter_name("010-"), None);
        assert_eq!(parse_chapter_name("010"), None);
    }

    #[test]
    fn loads_chapters_in_number_order() {
        let tmp = TempDir::new().unwrap();
        write_guide_fixture(tmp.path());
        let guide = load_guide(tmp.path()).unwrap();

        let slugs: Vec<&str> = guide.chapters.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs, vec!["intro", "rule-1", "faq"]);
        assert_eq!(guide.chapters[1].title, "Rule #1: Surviving Behind the Bar");
    }

    #[test]
    fn title_heading_removed_from_body() {
        let tmp = TempDir::new().unwrap();
        write_guide_fixture(tmp.path());
        let guide = load_guide(tmp.path()).unwrap();
        let intro = &guide.chapters[0];
        assert!(!intro.body.contains("# Welcome"));
        assert!(intro.body.starts_with("So you want"));
    }

    #[test]
    fn chapter_without_heading_uses_slug() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("005-last-call.md"), "No heading here.").unwrap();
        let guide = load_guide(tmp.path()).unwrap();
        assert_eq!(guide.chapters[0].title, "last call");
    }

    #[test]
    fn drafts_are_skipped() {
        let tmp = TempDir::new().unwrap();
        write_guide_fixture(tmp.path());
        let guide = load_guide(tmp.path()).unwrap();
        assert!(guide.chapters.iter().all(|c| c.slug != "notes"));
    }

    #[test]
    fn duplicate_numbers_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("010-a.md"), "# A").unwrap();
        fs::write(tmp.path().join("010-b.md"), "# B").unwrap();
        assert!(matches!(
            load_guide(tmp.path()),
            Err(GuideError::DuplicateChapter { number: 10, .. })
        ));
    }

    #[test]
    fn missing_guide_toml_uses_default_cover() {
        let tmp = TempDir::new().unwrap();
        let guide = load_guide(tmp.path()).unwrap();
        assert_eq!(guide.cover, Cover::default());
        assert!(guide.chapters.is_empty());
    }

    #[test]
    fn missing_source_dir_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            load_guide(&tmp.path().join("nope")),
            Err(GuideError::MissingSource(_))
        ));
    }

    #[test]
    fn cover_partial_override() {
        let tmp = TempDir::new().unwrap();
        write_guide_fixture(tmp.path());
        let guide = load_guide(tmp.path()).unwrap();
        assert_eq!(guide.cover.title, "Test Handbook");
        assert_eq!(guide.cover.contents_title, "Contents");
    }

    #[test]
    fn select_by_number_and_slug() {
        let tmp = TempDir::new().unwrap();
        write_guide_fixture(tmp.path());
        let guide = load_guide(tmp.path()).unwrap();

        let picked = guide
            .select(&["faq".to_string(), "0".to_string()])
            .unwrap();
        let slugs: Vec<&str> = picked.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs, vec!["intro", "faq"]);

        assert_eq!(guide.select(&[]).unwrap().len(), 3);
        assert!(matches!(
            guide.select(&["nope".to_string()]),
            Err(GuideError::UnknownChapter(_))
        ));
    }

    #[test]
    fn image_references_only_bare_filenames() {
        let md = "![a](bar_scheme.webp \"Fig\")\n\n![b](https://x.test/a.png)\n\n![c](dir/x.png)\n\n![d](bar_scheme.webp)";
        assert_eq!(image_references(md), vec!["bar_scheme.webp"]);
    }

    #[test]
    fn referenced_images_include_cover_first() {
        let tmp = TempDir::new().unwrap();
        write_guide_fixture(tmp.path());
        let guide = load_guide(tmp.path()).unwrap();
        assert_eq!(
            guide.referenced_images(),
            vec!["cover.webp", "bar_scheme.webp", "fake_smile.webp"]
        );
    }
}

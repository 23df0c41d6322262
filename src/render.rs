//! Guide page rendering.
//!
//! Produces the single-page guide: cover, table of contents, then one
//! `<section class="chapter">` per chapter. The same markup serves three
//! audiences:
//!
//! - **Served** (`serve`): images load from `/images/…`, and a small script
//!   polls `/api/status` so illustrations swap in as the pipeline saves them.
//! - **Bundled** (`render`, `export`): images load from a relative `images/`
//!   directory copied next to the HTML file.
//! - **Self-contained** (`export --inline`): images are embedded as data URIs.
//!
//! ## Images
//!
//! Chapter markdown references illustrations by bare asset filename. Each
//! reference becomes a figure whose `src` carries a content fingerprint
//! (`cover.webp?v=3f2a…`), so a regenerated image is never served from a
//! stale browser cache. Every image gets an `onerror` fallback to an inline
//! "Generating…" card, so a missing asset never shows as a broken image.
//!
//! ## CSS and JavaScript
//!
//! Embedded at compile time:
//! - `static/style.css`: Base styles plus print rules (colors injected from config)
//! - `static/live.js`: Status polling for the served page

use crate::assets::AssetStore;
use crate::config::{self, GuideConfig};
use crate::guide::{Chapter, Cover, Guide, is_asset_reference};
use crate::imaging::TargetFormat;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, html as md_html};
use std::path::Path;

const CSS_STATIC: &str = include_str!("../static/style.css");
const LIVE_JS: &str = include_str!("../static/live.js");

/// How image URLs are built and whether the live status script is included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// URL prefix for assets (`/images` when served, `images` in a bundle).
    pub image_base: String,
    /// Embed image bytes as data URIs instead of linking them.
    pub inline_images: bool,
    /// Include the status-polling script.
    pub live: bool,
}

impl RenderOptions {
    pub fn served() -> Self {
        Self {
            image_base: "/images".to_string(),
            inline_images: false,
            live: true,
        }
    }

    pub fn bundled() -> Self {
        Self {
            image_base: "images".to_string(),
            inline_images: false,
            live: false,
        }
    }

    pub fn inline() -> Self {
        Self {
            image_base: String::new(),
            inline_images: true,
            live: false,
        }
    }
}

/// Resolves asset filenames to `src` attribute values.
struct ImageResolver<'a> {
    store: &'a AssetStore,
    options: &'a RenderOptions,
}

impl ImageResolver<'_> {
    fn src(&self, filename: &str) -> String {
        if self.options.inline_images {
            return self
                .data_uri(filename)
                .unwrap_or_else(generating_placeholder_uri);
        }
        let base = self.options.image_base.trim_end_matches('/');
        let url = if base.is_empty() {
            filename.to_string()
        } else {
            format!("{base}/{filename}")
        };
        if !self.store.exists(filename) {
            return url;
        }
        match self.store.fingerprint(filename) {
            Ok(v) => format!("{url}?v={v}"),
            Err(_) => url,
        }
    }

    fn data_uri(&self, filename: &str) -> Option<String> {
        if !self.store.exists(filename) {
            return None;
        }
        let bytes = self.store.read(filename).ok()?;
        let mime = TargetFormat::from_path(Path::new(filename))
            .map(|f| f.mime_type())
            .unwrap_or("application/octet-stream");
        Some(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
    }
}

/// "Generating…" card shown while an image is missing.
pub fn generating_placeholder_uri() -> String {
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="600" height="400" viewBox="0 0 600 400"><rect width="600" height="400" fill="#1f2937"/><text x="300" y="200" font-family="sans-serif" font-size="32" fill="#10b981" text-anchor="middle" dominant-baseline="middle">Generating…</text></svg>"##;
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg))
}

/// Render the full guide page for the chosen chapters.
pub fn render_guide(
    guide: &Guide,
    chapters: &[&Chapter],
    config: &GuideConfig,
    store: &AssetStore,
    options: &RenderOptions,
) -> Markup {
    let css = format!(
        "{}\n\n{}",
        config::generate_color_css(&config.colors),
        CSS_STATIC
    );
    let images = ImageResolver { store, options };
    let fallback = generating_placeholder_uri();

    let content = html! {
        (render_cover(&guide.cover, &images, &fallback))
        main.guide {
            (render_contents(&guide.cover.contents_title, chapters))
            @for chapter in chapters {
                (render_chapter(chapter, &images, &fallback))
            }
        }
        @if options.live {
            (status_panel())
            script { (PreEscaped(LIVE_JS)) }
        }
    };

    let title = format!("{} {}", guide.cover.title, guide.cover.subtitle);
    base_document(title.trim(), &guide.cover.lang, &css, content)
}

// ============================================================================
// HTML Components
// ============================================================================

fn base_document(title: &str, lang: &str, css: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang=(lang) {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
                style { (PreEscaped(css)) }
            }
            body {
                (content)
            }
        }
    }
}

fn render_cover(cover: &Cover, images: &ImageResolver, fallback: &str) -> Markup {
    html! {
        header.cover-page {
            p.kicker { (cover.kicker) }
            h1 {
                (cover.title)
                @if !cover.subtitle.is_empty() {
                    br;
                    span.subtitle { (cover.subtitle) }
                }
            }
            @if !cover.tagline.is_empty() {
                p.tagline { (cover.tagline) }
            }
            @if let Some(image) = &cover.image {
                div.cover-frame {
                    (image_tag(image, &cover.image_alt, images, fallback))
                }
            }
        }
    }
}

fn render_contents(heading: &str, chapters: &[&Chapter]) -> Markup {
    html! {
        section.chapter.contents {
            h2.chapter-title { (heading) }
            ul.toc {
                @for chapter in chapters {
                    li { a href={ "#" (chapter.slug) } { (chapter.title) } }
                }
            }
        }
    }
}

fn render_chapter(chapter: &Chapter, images: &ImageResolver, fallback: &str) -> Markup {
    html! {
        section.chapter id=(chapter.slug) {
            h2.chapter-title { (chapter.title) }
            div.chapter-body {
                (PreEscaped(markdown_to_html(&chapter.body, images, fallback)))
            }
        }
    }
}

fn status_panel() -> Markup {
    html! {
        aside id="status-panel" class="no-print" hidden {
            div.progress {}
            ul id="status-list" {}
        }
    }
}

fn image_tag(filename: &str, alt: &str, images: &ImageResolver, fallback: &str) -> Markup {
    let onerror = format!("this.onerror=null;this.src='{fallback}'");
    html! {
        img src=(images.src(filename)) alt=(alt) loading="lazy"
            data-asset=(filename) onerror=(onerror);
    }
}

fn figure(filename: &str, alt: &str, caption: &str, images: &ImageResolver, fallback: &str) -> Markup {
    html! {
        span.figure {
            (image_tag(filename, alt, images, fallback))
            @if !caption.is_empty() {
                span.caption { (caption) }
            }
        }
    }
}

/// Convert chapter markdown to HTML, turning asset images into figures.
fn markdown_to_html(markdown: &str, images: &ImageResolver, fallback: &str) -> String {
    let mut events: Vec<Event> = Vec::new();
    let mut pending: Option<(CowStr, CowStr, String)> = None;

    for event in Parser::new_ext(markdown, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH)
    {
        match event {
            Event::Start(Tag::Image {
                dest_url, title, ..
            }) if is_asset_reference(&dest_url) => {
                pending = Some((dest_url, title, String::new()));
            }
            Event::End(TagEnd::Image) if pending.is_some() => {
                if let Some((dest, title, alt)) = pending.take() {
                    let markup = figure(&dest, &alt, &title, images, fallback);
                    events.push(Event::InlineHtml(markup.into_string().into()));
                }
            }
            Event::Text(text) | Event::Code(text) if pending.is_some() => {
                if let Some((_, _, alt)) = pending.as_mut() {
                    alt.push_str(&text);
                }
            }
            other if pending.is_some() => drop(other),
            other => events.push(other),
        }
    }

    let mut out = String::new();
    md_html::push_html(&mut out, events.into_iter());
    out
}

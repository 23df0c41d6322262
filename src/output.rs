//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Each line leads with the thing it is about (an asset filename, a chapter)
//! and pushes paths and error details onto indented context lines, so the
//! output reads as an inventory of the guide rather than a file log.
//!
//! # Output Format
//!
//! ## Generate images
//!
//! ```text
//! [   0.0s] cover.webp: checking
//! [   0.0s] cover.webp: generating (attempt 1/10)
//! [   0.0s] cover.webp: rate limited, retrying in 70s
//!               Reason: HTTP 429 (RESOURCE_EXHAUSTED): Quota exceeded
//! [  70.0s] cover.webp: generating (attempt 2/10)
//! [  70.0s] cover.webp: saved
//! [  70.0s] cover.webp: waiting 15s before the next request
//! [  85.0s] bar_scheme.webp: checking
//! [  85.0s] bar_scheme.webp: exists, skipped
//!
//! Images: 1 saved, 1 existing, 0 failed
//! ```
//!
//! ## Check
//!
//! ```text
//! Images (2/3 present)
//! 001 cover.webp: present (3f2a9c0d11be)
//! 002 bar_scheme.webp: missing, will convert bar_scheme.png
//! 003 fake_smile.webp: placeholder
//!
//! Chapters
//! 000 Welcome to Hell
//! 010 Rule #1: Surviving Behind the Bar
//!     Images: bar_scheme.webp
//! ```
//!
//! ## Export
//!
//! ```text
//! Exported 3 chapters → exports/bartender-survival-guide.html
//!     Images: 2 copied
//!     Missing: fake_smile.webp
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::acquire::{EventKind, PipelineEvent, RunState};
use crate::check::{AssetState, Inventory};
use crate::export::ExportSummary;
use crate::guide::Guide;
use crate::types::AssetStatus;
use std::time::Duration;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a chapter number or 1-based position as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Whole seconds when exact, one decimal otherwise.
fn format_secs(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

fn timestamp(elapsed: Duration) -> String {
    format!("[{:>6.1}s]", elapsed.as_secs_f64())
}

// ============================================================================
// generate-images
// ============================================================================

fn status_phrase(status: AssetStatus) -> &'static str {
    match status {
        AssetStatus::Unknown => "unknown",
        AssetStatus::Checking => "checking",
        AssetStatus::Generating => "generating",
        AssetStatus::Saved => "saved",
        AssetStatus::Exists => "exists, skipped",
        AssetStatus::Error => "failed",
    }
}

/// Format a single pipeline event as display lines.
///
/// Status changes into `generating` are folded into the attempt line, so
/// they produce no output of their own.
pub fn format_acquire_event(event: &PipelineEvent) -> Vec<String> {
    let head = format!("{} {}:", timestamp(event.elapsed), event.filename);
    let detail = format!("{}      ", indent(2));
    match &event.kind {
        EventKind::Status { to, .. } if *to == AssetStatus::Generating => Vec::new(),
        EventKind::Status { to, .. } => vec![format!("{head} {}", status_phrase(*to))],
        EventKind::Attempt { number, max } => {
            vec![format!("{head} generating (attempt {number}/{max})")]
        }
        EventKind::Converted { source } => vec![format!("{head} converted from {source}")],
        EventKind::ConversionFailed { source, reason } => vec![
            format!("{head} conversion from {source} failed"),
            format!("{detail}Reason: {reason}"),
        ],
        EventKind::Backoff {
            class,
            delay,
            reason,
            ..
        } => vec![
            format!("{head} {class}, retrying in {}", format_secs(*delay)),
            format!("{detail}Reason: {reason}"),
        ],
        EventKind::Paced { delay } => vec![format!(
            "{head} waiting {} before the next request",
            format_secs(*delay)
        )],
        EventKind::Placeholder { reason } => vec![
            format!("{head} generation failed, placeholder written"),
            format!("{detail}Reason: {reason}"),
        ],
        EventKind::PlaceholderFailed { reason } => vec![
            format!("{head} placeholder could not be written"),
            format!("{detail}Reason: {reason}"),
        ],
    }
}

/// Final tally of a pipeline run.
pub fn format_run_summary(state: &RunState) -> Vec<String> {
    let saved = state.with_status(AssetStatus::Saved).len();
    let existing = state.with_status(AssetStatus::Exists).len();
    let failed = state.with_status(AssetStatus::Error);
    let mut lines = vec![
        String::new(),
        format!(
            "Images: {} saved, {} existing, {} failed",
            saved,
            existing,
            failed.len()
        ),
    ];
    for name in failed {
        lines.push(format!("{}{}", indent(1), name));
    }
    lines
}

pub fn print_run_summary(state: &RunState) {
    for line in format_run_summary(state) {
        println!("{}", line);
    }
}

// ============================================================================
// check
// ============================================================================

/// Format the asset inventory and the chapter list.
pub fn format_check_output(inventory: &Inventory, guide: &Guide) -> Vec<String> {
    let mut lines = Vec::new();
    let present = inventory.count(|s| {
        matches!(s, AssetState::Present { .. } | AssetState::Placeholder)
    });
    lines.push(format!(
        "Images ({}/{} present)",
        present,
        inventory.assets.len()
    ));
    for (i, asset) in inventory.assets.iter().enumerate() {
        let state = match &asset.state {
            AssetState::Present { fingerprint } => format!("present ({fingerprint})"),
            AssetState::Placeholder => "placeholder".to_string(),
            AssetState::Legacy { source } => format!("missing, will convert {source}"),
            AssetState::Missing => "missing".to_string(),
        };
        lines.push(format!("{} {}: {}", format_index(i + 1), asset.filename, state));
    }

    if !inventory.orphans.is_empty() {
        lines.push(String::new());
        lines.push("Unused files".to_string());
        for name in &inventory.orphans {
            lines.push(format!("{}{}", indent(1), name));
        }
    }
    if !inventory.uncatalogued.is_empty() {
        lines.push(String::new());
        lines.push("Not in catalog".to_string());
        for name in &inventory.uncatalogued {
            lines.push(format!("{}{}", indent(1), name));
        }
    }

    lines.push(String::new());
    lines.push("Chapters".to_string());
    for chapter in &guide.chapters {
        lines.push(format!(
            "{} {}",
            format_index(chapter.number as usize),
            chapter.title
        ));
        let images = chapter.image_references();
        if !images.is_empty() {
            lines.push(format!("{}Images: {}", indent(1), images.join(", ")));
        }
    }
    lines
}

pub fn print_check_output(inventory: &Inventory, guide: &Guide) {
    for line in format_check_output(inventory, guide) {
        println!("{}", line);
    }
}

// ============================================================================
// render / export
// ============================================================================

pub fn format_export_output(summary: &ExportSummary) -> Vec<String> {
    let chapters = match summary.chapters.len() {
        1 => "1 chapter".to_string(),
        n => format!("{} chapters", n),
    };
    let mut lines = vec![format!(
        "Exported {} \u{2192} {}",
        chapters,
        summary.document.display()
    )];
    if summary.inline {
        lines.push(format!("{}Images: inlined", indent(1)));
    } else {
        lines.push(format!(
            "{}Images: {} copied",
            indent(1),
            summary.images_copied.len()
        ));
    }
    if !summary.images_missing.is_empty() {
        lines.push(format!(
            "{}Missing: {}",
            indent(1),
            summary.images_missing.join(", ")
        ));
    }
    lines
}

pub fn print_export_output(summary: &ExportSummary) {
    for line in format_export_output(summary) {
        println!("{}", line);
    }
}

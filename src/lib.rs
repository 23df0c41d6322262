//! # Last Call
//!
//! The bartender's survival guide as a program: a single-page guide rendered
//! from markdown chapters, illustrated by a generative image API, served live
//! and exported as HTML or PDF.
//!
//! # Architecture: Acquire, Then Present
//!
//! ```text
//! 1. Acquire   catalog  →  images/          (reuse → convert → generate → placeholder)
//! 2. Present   content/ + images/  →  page  (render, export, serve)
//! ```
//!
//! The two halves share nothing but the asset store. Presentation never waits
//! for acquisition: a missing illustration renders as a "Generating…" card
//! and is swapped in by the live page once the pipeline saves it.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`acquire`] | The acquisition pipeline: explicit run state, retry decisions, event stream |
//! | [`assets`] | Filesystem asset store keyed by flat filename, atomic writes, fingerprints |
//! | [`imaging`] | Codec adapter (convert, re-encode) and the failure placeholder |
//! | [`generation`] | Generation client seam and the Gemini implementation, failure classification |
//! | [`guide`] | Chapter and cover loading from the content directory |
//! | [`render`] | Maud page rendering for served, bundled and self-contained output |
//! | [`export`] | HTML bundles, inline HTML and PDF export |
//! | [`server`] | axum routes: live page, image API, status board |
//! | [`check`] | Read-only inventory of the store against catalog and guide |
//! | [`config`] | `config.toml` loading, merging over stock defaults, validation, CSS colors |
//! | [`types`] | Asset descriptors, statuses and the stock catalog |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Filename as cache key
//!
//! An asset is "done" when a non-empty file with its name exists. There is no
//! manifest and no content-addressed cache: deleting a file is how you ask
//! for it to be generated again.
//!
//! ## Sequential acquisition
//!
//! Generation quotas are per minute, so the pipeline handles one descriptor at
//! a time, pauses between successful requests and backs off hard on rate
//! limits. Everything that waits goes through a clock trait so tests run
//! instantly.
//!
//! ## Always something on the page
//!
//! After retries run out the pipeline stores a drawn placeholder card under
//! the asset's name. The page never shows a broken image, and `check` can
//! still tell placeholders apart from real illustrations.

pub mod acquire;
pub mod assets;
pub mod check;
pub mod config;
pub mod export;
pub mod generation;
pub mod guide;
pub mod imaging;
pub mod output;
pub mod render;
pub mod server;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
